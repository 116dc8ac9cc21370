//! Immutable record of one request/response interaction.
//!
//! Exchanges are produced by the transport layer as they complete and are
//! consumed read-only by the check tree. Bodies are kept raw; parsed views
//! are derived on demand so a malformed body never poisons the record.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub uuid: Uuid,
    pub source_party: String,
    pub source_role: String,
    pub target_party: String,
    pub target_role: String,
    pub method: String,
    pub path: String,
    pub query_params: BTreeMap<String, String>,
    pub request_headers: BTreeMap<String, String>,
    pub request_body: String,
    pub request_timestamp: DateTime<Utc>,
    pub response_status: u16,
    pub response_headers: BTreeMap<String, String>,
    pub response_body: String,
    pub response_timestamp: DateTime<Utc>,
}

impl Exchange {
    /// Parsed request body, or `Value::Null` if it is not valid JSON.
    pub fn request_json(&self) -> Value {
        serde_json::from_str(&self.request_body).unwrap_or(Value::Null)
    }

    /// Parsed response body, or `Value::Null` if it is not valid JSON.
    pub fn response_json(&self) -> Value {
        serde_json::from_str(&self.response_body).unwrap_or(Value::Null)
    }

    /// Text attribute of the request body, if present.
    pub fn request_attribute(&self, name: &str) -> Option<String> {
        self.request_json()
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}
