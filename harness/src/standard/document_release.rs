//! Document Release v1: the sample two-party standard.
//!
//! A requester asks the custodian of a document to release it; the
//! custodian accepts or rejects. Rejection lets the requester try again.
//! Conversations are correlated by the `documentReference` the custodian
//! supplies up front and the `releaseRequestReference` the requester mints
//! per request.

use serde_json::{Value, json};

use engine::core::action::Action;
use engine::core::check::{CheckBehavior, CheckTree, CorrelationPredicate};
use engine::core::params::ParamSpec;
use engine::core::scenario::{Scenario, ScenarioNode};
use engine::exchange::Exchange;
use engine::schema::SchemaValidator;

pub const RELEASE_REQUESTS_PATH: &str = "/v1/release-requests";
pub const RELEASE_DECISIONS_PATH: &str = "/v1/release-decisions";

/// Party names threaded through every action factory.
struct ScenarioContext {
    requester: String,
    custodian: String,
}

impl ScenarioContext {
    fn supply_parameters(&self) -> ScenarioNode {
        let custodian = self.custodian.clone();
        ScenarioNode::new(move |previous| {
            Action::new("supply", "Supply scenario parameters", &custodian, previous)
                .with_instruction(
                    "Choose the document this run will exercise and submit its \
                     reference, its validity date, and the release mode.",
                )
                .with_input_specs(vec![
                    ParamSpec::pattern("document_reference", "^[A-Z]{3}-[0-9]{4}$"),
                    ParamSpec::date("valid_until"),
                    ParamSpec::keyword("release_mode", &["DELIVERY", "AMENDMENT"]),
                ])
        })
    }

    fn request_release(&self) -> ScenarioNode {
        let requester = self.requester.clone();
        let custodian = self.custodian.clone();
        ScenarioNode::new(move |previous| {
            Action::new("request", "Request release", &requester, previous)
                .with_target(&custodian)
                .with_expected_status(202)
                .with_instruction(
                    "POST a release request for document \
                     {{ params.document_reference }} to the custodian's \
                     /v1/release-requests endpoint, quoting a fresh \
                     releaseRequestReference of your choice.",
                )
                .with_match_attribute("documentReference", "document_reference")
                .with_capture_attribute("releaseRequestReference", "release_request_reference")
        })
    }

    fn decide(&self, verdict: &'static str, title: &'static str) -> ScenarioNode {
        let custodian = self.custodian.clone();
        let requester = self.requester.clone();
        ScenarioNode::new(move |previous| {
            Action::new(verdict, title, &custodian, previous)
                .with_target(&requester)
                .with_expected_status(204)
                .with_instruction(
                    "POST your decision for release request \
                     {{ params.release_request_reference }} to the requester's \
                     /v1/release-decisions endpoint.",
                )
                .with_match_attribute("releaseRequestReference", "release_request_reference")
        })
    }

    fn accept(&self) -> ScenarioNode {
        self.decide("accept", "Accept release")
    }

    fn reject(&self) -> ScenarioNode {
        self.decide("reject", "Reject release")
    }
}

/// Expand the standard into its scenarios, in declaration order: accept,
/// reject, reject then retry then accept.
pub fn build_scenarios(requester: &str, custodian: &str) -> Vec<Scenario> {
    let ctx = ScenarioContext {
        requester: requester.to_string(),
        custodian: custodian.to_string(),
    };
    let tree = ctx.supply_parameters().then(
        ctx.request_release().then_either(vec![
            ctx.accept(),
            ctx.reject(),
            ctx.reject()
                .then(ctx.request_release().then(ctx.accept())),
        ]),
    );
    tree.build_scenarios(0)
}

pub fn release_request_schema() -> Value {
    json!({
        "type": "object",
        "required": ["documentReference", "releaseRequestReference"],
        "properties": {
            "documentReference": { "type": "string", "pattern": "^[A-Z]{3}-[0-9]{4}$" },
            "releaseRequestReference": { "type": "string", "minLength": 1 },
        },
    })
}

pub fn release_decision_schema() -> Value {
    json!({
        "type": "object",
        "required": ["releaseRequestReference", "decision"],
        "properties": {
            "releaseRequestReference": { "type": "string", "minLength": 1 },
            "decision": { "enum": ["ACCEPT", "REJECT"] },
        },
    })
}

fn same_attribute(name: &'static str) -> CorrelationPredicate {
    Box::new(move |new: &Exchange, tail: &Exchange| {
        match (new.request_attribute(name), tail.request_attribute(name)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    })
}

fn is_release_request(exchange: &Exchange) -> bool {
    exchange.path == RELEASE_REQUESTS_PATH
}

fn is_release_decision(exchange: &Exchange) -> bool {
    exchange.path == RELEASE_DECISIONS_PATH
}

fn request_behavior(restart: Option<CorrelationPredicate>) -> CheckBehavior {
    CheckBehavior {
        responding_role: "Custodian".to_string(),
        relevance: Box::new(is_release_request),
        correlate: Box::new(|_, _| false),
        restart,
        expected_status: Some(202),
        request_schema: Some(
            SchemaValidator::new(&release_request_schema())
                .expect("release request schema should be valid"),
        ),
    }
}

fn decision_behavior() -> CheckBehavior {
    CheckBehavior {
        responding_role: "Requester".to_string(),
        relevance: Box::new(is_release_decision),
        correlate: same_attribute("releaseRequestReference"),
        restart: None,
        expected_status: Some(204),
        request_schema: Some(
            SchemaValidator::new(&release_decision_schema())
                .expect("release decision schema should be valid"),
        ),
    }
}

/// Build the check tree mirroring the scenario tree.
///
/// Release requests start conversations; decisions correlate by
/// `releaseRequestReference`. A renewed request does not correlate with
/// anything by ordinary means, so it carries a restart hook that lets it
/// resume on a rejection with the same `documentReference`.
pub fn build_check_tree() -> CheckTree {
    let mut tree = CheckTree::new("Document Release v1");
    let request = tree.add_check(tree.root(), "release request", request_behavior(None));
    let decision = tree.add_check(request, "release decision", decision_behavior());
    let renewed = tree.add_check(
        decision,
        "renewed release request",
        request_behavior(Some(Box::new(|new: &Exchange, tail: &Exchange| {
            tail.request_attribute("decision").as_deref() == Some("REJECT")
                && match (
                    new.request_attribute("documentReference"),
                    tail.request_attribute("documentReference"),
                ) {
                    (Some(a), Some(b)) => a == b,
                    // Rejections need not echo the document reference; fall
                    // back to matching any rejected conversation.
                    _ => true,
                }
        }))),
    );
    tree.add_check(renewed, "decision after renewal", decision_behavior());
    tree
}
