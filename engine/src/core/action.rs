//! Per-scenario-step state nodes with persisted, replayable state.
//!
//! An [`Action`] is one conversation step, assigned to a source party and
//! (usually) a target party. Structure is fixed at tree-build time; runtime
//! state is limited to the derived-parameter bag, the received-input flag
//! and the matched-exchange reference, all of which round-trip through
//! [`Action::export_state`] / [`Action::import_state`].

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::core::params::{ParamSpec, validate_input};
use crate::exchange::Exchange;

/// User-facing error raised for malformed party input.
///
/// Carries every violation found in a single validation pass. This is always
/// recoverable: the operator corrects the input and retries.
#[derive(Debug, Error)]
#[error("invalid party input:\n- {}", .violations.join("\n- "))]
pub struct PartyInputError {
    pub violations: Vec<String>,
}

/// One step of a scenario, with its persisted runtime state.
#[derive(Debug, Clone)]
pub struct Action {
    id: Uuid,
    kind: String,
    title: String,
    path: String,
    source_party: String,
    target_party: Option<String>,
    expected_status: Option<u16>,
    instruction: String,
    input_specs: Vec<ParamSpec>,
    /// Request-body attributes that must equal an already-resolved parameter
    /// for an exchange to match this action: `(attribute, parameter)`.
    match_attributes: Vec<(String, String)>,
    /// Request-body attributes captured into the parameter bag when an
    /// exchange matches: `(attribute, parameter)`.
    capture_attributes: Vec<(String, String)>,

    params: BTreeMap<String, Value>,
    input_received: bool,
    matched_exchange: Option<Uuid>,
}

impl Action {
    /// Create an action, chaining its path onto `previous`.
    pub fn new(kind: &str, title: &str, source_party: &str, previous: Option<&Action>) -> Self {
        let path = match previous {
            Some(prev) => format!("{} - {}", prev.path, title),
            None => title.to_string(),
        };
        Self {
            id: Uuid::new_v4(),
            kind: kind.to_string(),
            title: title.to_string(),
            path,
            source_party: source_party.to_string(),
            target_party: None,
            expected_status: None,
            instruction: String::new(),
            input_specs: Vec::new(),
            match_attributes: Vec::new(),
            capture_attributes: Vec::new(),
            params: BTreeMap::new(),
            input_received: false,
            matched_exchange: None,
        }
    }

    pub fn with_target(mut self, target_party: &str) -> Self {
        self.target_party = Some(target_party.to_string());
        self
    }

    pub fn with_expected_status(mut self, status: u16) -> Self {
        self.expected_status = Some(status);
        self
    }

    /// Instruction template rendered into the party prompt; may reference
    /// resolved parameters as `{{ params.name }}`.
    pub fn with_instruction(mut self, instruction: &str) -> Self {
        self.instruction = instruction.to_string();
        self
    }

    pub fn with_input_specs(mut self, specs: Vec<ParamSpec>) -> Self {
        self.input_specs = specs;
        self
    }

    pub fn with_match_attribute(mut self, attribute: &str, parameter: &str) -> Self {
        self.match_attributes
            .push((attribute.to_string(), parameter.to_string()));
        self
    }

    pub fn with_capture_attribute(mut self, attribute: &str, parameter: &str) -> Self {
        self.capture_attributes
            .push((attribute.to_string(), parameter.to_string()));
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Cumulative `"<previous path> - <title>"` path from the chain root.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn source_party(&self) -> &str {
        &self.source_party
    }

    pub fn target_party(&self) -> Option<&str> {
        self.target_party.as_deref()
    }

    pub fn expected_status(&self) -> Option<u16> {
        self.expected_status
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn input_specs(&self) -> &[ParamSpec] {
        &self.input_specs
    }

    pub fn requires_input(&self) -> bool {
        !self.input_specs.is_empty()
    }

    pub fn input_received(&self) -> bool {
        self.input_received
    }

    pub fn params(&self) -> &BTreeMap<String, Value> {
        &self.params
    }

    pub fn matched_exchange(&self) -> Option<Uuid> {
        self.matched_exchange
    }

    /// Serialize the action's runtime state.
    ///
    /// `import_state` followed by `export_state` reproduces the input
    /// exactly for every reachable state.
    pub fn export_state(&self) -> Value {
        let mut state = Map::new();
        state.insert("id".to_string(), json!(self.id));
        state.insert(
            "params".to_string(),
            Value::Object(self.params.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        );
        state.insert("input_received".to_string(), json!(self.input_received));
        if let Some(uuid) = self.matched_exchange {
            state.insert("matched_exchange".to_string(), json!(uuid));
        }
        Value::Object(state)
    }

    /// Reconstruct runtime state previously produced by `export_state`.
    pub fn import_state(&mut self, state: &Value) -> Result<(), String> {
        let id = state
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| format!("action state for '{}' is missing 'id'", self.title))?;
        self.id = id
            .parse()
            .map_err(|err| format!("action state for '{}' has a bad id: {}", self.title, err))?;
        self.params = state
            .get("params")
            .and_then(Value::as_object)
            .map(|fields| {
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        self.input_received = state
            .get("input_received")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        self.matched_exchange = match state.get("matched_exchange") {
            Some(value) => Some(
                value
                    .as_str()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| {
                        format!(
                            "action state for '{}' has a bad matched_exchange",
                            self.title
                        )
                    })?,
            ),
            None => None,
        };
        Ok(())
    }

    /// Clear runtime state so the same tree can back a fresh run.
    pub fn reset(&mut self) {
        self.id = Uuid::new_v4();
        self.params.clear();
        self.input_received = false;
        self.matched_exchange = None;
    }

    /// Validate and absorb externally supplied parameter values.
    ///
    /// Every violation is collected in one pass; on failure nothing is
    /// stored.
    pub fn handle_party_input(&mut self, input: &Value) -> Result<(), PartyInputError> {
        let violations = validate_input(&self.input_specs, input);
        if !violations.is_empty() {
            return Err(PartyInputError { violations });
        }
        for spec in &self.input_specs {
            if let Some(value) = input.get(&spec.name) {
                self.params.insert(spec.name.clone(), value.clone());
            }
        }
        self.input_received = true;
        debug!(action = %self.path, "party input accepted");
        Ok(())
    }

    /// Absorb `exchange` if it matches this action.
    ///
    /// A match requires the exchange's source party to equal this action's
    /// and every declared match attribute to equal its resolved parameter.
    /// On a match, capture attributes are stored into the parameter bag and
    /// the exchange is recorded as this action's matched exchange.
    pub fn update_from_exchange(
        &mut self,
        exchange: &Exchange,
        resolved: &BTreeMap<String, Value>,
    ) -> bool {
        if exchange.source_party != self.source_party {
            return false;
        }
        for (attribute, parameter) in &self.match_attributes {
            let expected = resolved.get(parameter).and_then(Value::as_str);
            let actual = exchange.request_attribute(attribute);
            match (expected, actual) {
                (Some(expected), Some(actual)) if expected == actual => {}
                _ => return false,
            }
        }
        for (attribute, parameter) in &self.capture_attributes {
            if let Some(value) = exchange.request_attribute(attribute) {
                self.params.insert(parameter.clone(), Value::String(value));
            }
        }
        self.matched_exchange = Some(exchange.uuid);
        debug!(action = %self.path, exchange = %exchange.uuid, "action matched exchange");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::exchange;
    use serde_json::json;

    fn input_action() -> Action {
        Action::new("supply_reference", "Supply reference", "Custodian1", None).with_input_specs(
            vec![
                ParamSpec::pattern("document_reference", "^[A-Z]{3}-[0-9]{4}$"),
                ParamSpec::date("valid_until"),
                ParamSpec::keyword("release_mode", &["DELIVERY", "AMENDMENT"]),
            ],
        )
    }

    /// `import_state(export_state())` reproduces every runtime field.
    #[test]
    fn state_round_trips_exactly() {
        let mut action = input_action();
        action
            .handle_party_input(&json!({
                "document_reference": "DOC-0001",
                "valid_until": "2026-08-29",
                "release_mode": "DELIVERY",
            }))
            .expect("valid input");
        let matched = exchange("Custodian1", "Requester1", "/x", json!({}), 200);
        let resolved = action.params().clone();
        assert!(action.update_from_exchange(&matched, &resolved));

        let state = action.export_state();
        let mut restored = input_action();
        restored.import_state(&state).expect("import");
        assert_eq!(restored.export_state(), state);
        assert_eq!(restored.id(), action.id());
        assert_eq!(restored.params(), action.params());
        assert!(restored.input_received());
        assert_eq!(restored.matched_exchange(), Some(matched.uuid));
    }

    /// `reset` clears derived state and assigns a fresh identity.
    #[test]
    fn reset_clears_derived_state() {
        let mut action = input_action();
        action
            .handle_party_input(&json!({
                "document_reference": "DOC-0001",
                "valid_until": "2026-08-29",
                "release_mode": "DELIVERY",
            }))
            .expect("valid input");
        let old_id = action.id();

        action.reset();
        assert_ne!(action.id(), old_id);
        assert!(action.params().is_empty());
        assert!(!action.input_received());
        assert_eq!(action.matched_exchange(), None);
    }

    /// Two invalid fields yield one error listing both violations.
    #[test]
    fn party_input_error_lists_every_violation() {
        let mut action = input_action();
        let err = action
            .handle_party_input(&json!({
                "document_reference": "DOC-0001",
                "valid_until": "yesterdayish",
                "release_mode": "TELEPATHY",
            }))
            .expect_err("two violations");
        assert_eq!(err.violations.len(), 2);
        let message = err.to_string();
        assert!(message.contains("valid_until"));
        assert!(message.contains("release_mode"));
        assert!(action.params().is_empty());
        assert!(!action.input_received());
    }

    /// Matching requires source party and match attributes to line up, and
    /// captures declared attributes on success.
    #[test]
    fn update_from_exchange_matches_and_captures() {
        let mut action = Action::new("request_release", "Request release", "Requester1", None)
            .with_target("Custodian1")
            .with_expected_status(202)
            .with_match_attribute("documentReference", "document_reference")
            .with_capture_attribute("releaseRequestReference", "release_request_reference");
        let resolved: BTreeMap<String, Value> =
            [("document_reference".to_string(), json!("DOC-0001"))]
                .into_iter()
                .collect();

        let wrong_party = exchange(
            "Custodian1",
            "Requester1",
            "/v1/release-requests",
            json!({"documentReference": "DOC-0001", "releaseRequestReference": "RRR-1"}),
            202,
        );
        assert!(!action.update_from_exchange(&wrong_party, &resolved));

        let wrong_reference = exchange(
            "Requester1",
            "Custodian1",
            "/v1/release-requests",
            json!({"documentReference": "DOC-9999", "releaseRequestReference": "RRR-1"}),
            202,
        );
        assert!(!action.update_from_exchange(&wrong_reference, &resolved));
        assert_eq!(action.matched_exchange(), None);

        let matching = exchange(
            "Requester1",
            "Custodian1",
            "/v1/release-requests",
            json!({"documentReference": "DOC-0001", "releaseRequestReference": "RRR-1"}),
            202,
        );
        assert!(action.update_from_exchange(&matching, &resolved));
        assert_eq!(action.matched_exchange(), Some(matching.uuid));
        assert_eq!(
            action.params().get("release_request_reference"),
            Some(&json!("RRR-1"))
        );
    }

    /// An unresolved match parameter means the exchange cannot match yet.
    #[test]
    fn unresolved_match_parameter_never_matches() {
        let mut action = Action::new("request_release", "Request release", "Requester1", None)
            .with_match_attribute("documentReference", "document_reference");
        let ex = exchange(
            "Requester1",
            "Custodian1",
            "/v1/release-requests",
            json!({"documentReference": "DOC-0001"}),
            202,
        );
        assert!(!action.update_from_exchange(&ex, &BTreeMap::new()));
    }

    /// Action paths accumulate from the chain root.
    #[test]
    fn path_accumulates_from_previous_action() {
        let first = Action::new("a", "First", "P1", None);
        let second = Action::new("b", "Second", "P2", Some(&first));
        assert_eq!(second.path(), "First - Second");
    }
}
