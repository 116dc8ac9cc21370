//! Shared helpers for tests, gated behind the `test-support` feature.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::exchange::Exchange;

/// Build a completed JSON POST exchange between two parties.
///
/// Roles are derived from party names by stripping the trailing instance
/// digits, mirroring the `Requester1`/`Requester` convention used throughout
/// the tests.
pub fn exchange(
    source_party: &str,
    target_party: &str,
    path: &str,
    request_body: Value,
    response_status: u16,
) -> Exchange {
    let now = Utc::now();
    Exchange {
        uuid: Uuid::new_v4(),
        source_party: source_party.to_string(),
        source_role: role_of(source_party),
        target_party: target_party.to_string(),
        target_role: role_of(target_party),
        method: "POST".to_string(),
        path: path.to_string(),
        query_params: BTreeMap::new(),
        request_headers: BTreeMap::from([(
            "content-type".to_string(),
            "application/json".to_string(),
        )]),
        request_body: request_body.to_string(),
        request_timestamp: now,
        response_status,
        response_headers: BTreeMap::new(),
        response_body: "{}".to_string(),
        response_timestamp: now,
    }
}

fn role_of(party: &str) -> String {
    party.trim_end_matches(|c: char| c.is_ascii_digit()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_drop_instance_digits() {
        let ex = exchange("Requester1", "Custodian12", "/x", serde_json::json!({}), 200);
        assert_eq!(ex.source_role, "Requester");
        assert_eq!(ex.target_role, "Custodian");
    }
}
