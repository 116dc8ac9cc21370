//! JSON Schema validation of exchange payloads.
//!
//! Standards ship the schemas their message bodies must satisfy; check
//! nodes use a compiled validator to turn schema violations into
//! conformance error messages.

use anyhow::{Context, Result};
use jsonschema::{Draft, Validator};
use serde_json::Value;

/// A schema compiled once and applied to many payloads.
#[derive(Debug)]
pub struct SchemaValidator {
    compiled: Validator,
}

impl SchemaValidator {
    /// Compile `schema` as JSON Schema Draft 2020-12.
    pub fn new(schema: &Value) -> Result<Self> {
        let compiled = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(schema)
            .context("compile json schema")?;
        Ok(Self { compiled })
    }

    /// Every violation of `instance` against the schema, empty when valid.
    pub fn validate(&self, instance: &Value) -> Vec<String> {
        self.compiled
            .iter_errors(instance)
            .map(|err| format!("{} at {}", err, err.instance_path()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn release_request_schema() -> Value {
        json!({
            "type": "object",
            "required": ["documentReference"],
            "properties": {
                "documentReference": { "type": "string", "pattern": "^[A-Z]{3}-[0-9]{4}$" },
                "releaseMode": { "enum": ["DELIVERY", "AMENDMENT"] },
            },
        })
    }

    /// A valid payload produces no violations.
    #[test]
    fn valid_payload_passes() {
        let validator = SchemaValidator::new(&release_request_schema()).expect("compile");
        let violations = validator.validate(&json!({
            "documentReference": "DOC-0001",
            "releaseMode": "DELIVERY",
        }));
        assert!(violations.is_empty());
    }

    /// Multiple violations are all reported with their instance paths.
    #[test]
    fn all_violations_are_reported() {
        let validator = SchemaValidator::new(&release_request_schema()).expect("compile");
        let violations = validator.validate(&json!({
            "documentReference": "nope",
            "releaseMode": "TELEPATHY",
        }));
        assert_eq!(violations.len(), 2);
        assert!(violations.iter().any(|v| v.contains("/documentReference")));
        assert!(violations.iter().any(|v| v.contains("/releaseMode")));
    }

    /// A broken schema fails compilation instead of validating nothing.
    #[test]
    fn broken_schema_fails_to_compile() {
        let err = SchemaValidator::new(&json!({"type": "no-such-type"})).expect_err("bad schema");
        assert!(format!("{err:#}").contains("compile json schema"));
    }
}
