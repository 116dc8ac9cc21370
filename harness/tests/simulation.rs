//! End-to-end sessions against the document release standard.

use serde_json::json;

use engine::core::status::ConformanceStatus;
use engine::state::PersistenceProvider;
use engine::test_support::exchange;
use harness::orchestrator::{InstanceStatus, Orchestrator};
use harness::simulate::run_conformant_session;
use harness::standard::document_release;

fn orchestrator(session_id: &str) -> Orchestrator {
    Orchestrator::new(
        session_id,
        document_release::build_scenarios("Requester1", "Custodian1"),
        document_release::build_check_tree(),
        PersistenceProvider::in_memory(128 * 1024),
        4,
    )
    .expect("orchestrator")
}

/// Playing every scenario with correct traffic completes all instances and
/// yields CONFORMANT for both roles.
#[test]
fn conformant_session_reports_conformant_for_both_roles() {
    let mut orchestrator = orchestrator("full-run");
    run_conformant_session(&mut orchestrator).expect("simulation");

    for index in 0..orchestrator.scenarios().len() {
        assert_eq!(
            orchestrator.instance_status(index),
            Some(InstanceStatus::Completed),
            "instance {index}"
        );
    }
    for role in ["Requester", "Custodian"] {
        let report = orchestrator.report(role);
        assert_eq!(report.status, ConformanceStatus::Conformant, "role {role}");
        assert!(report.error_messages.is_empty());
    }
}

/// A custodian answering with the wrong status is reported NON_CONFORMANT
/// with the status mismatch spelled out.
#[test]
fn wrong_response_status_is_non_conformant() {
    let mut orchestrator = orchestrator("wrong-status");
    orchestrator
        .handle_party_input(
            0,
            &json!({
                "document_reference": "DOC-0001",
                "valid_until": "2027-01-01",
                "release_mode": "DELIVERY",
            }),
        )
        .expect("input");
    orchestrator
        .handle_exchange(&exchange(
            "Requester1",
            "Custodian1",
            document_release::RELEASE_REQUESTS_PATH,
            json!({"documentReference": "DOC-0001", "releaseRequestReference": "RRR-1"}),
            500,
        ))
        .expect("handle");

    let report = orchestrator.report("Custodian");
    assert_eq!(report.status, ConformanceStatus::NonConformant);

    let mut reports = vec![&report];
    let mut found = false;
    while let Some(current) = reports.pop() {
        if current
            .error_messages
            .iter()
            .any(|message| message.contains("'500'") && message.contains("'202'"))
        {
            found = true;
            break;
        }
        reports.extend(current.sub_reports.iter());
    }
    assert!(found, "status mismatch message should surface in the report");
}

/// Exercising only the accept scenario leaves the renewal checks without
/// traffic, which reduces the overall verdict to PARTIALLY_CONFORMANT.
#[test]
fn incomplete_coverage_is_partially_conformant() {
    let mut orchestrator = orchestrator("stranded");
    orchestrator.cancel_instance(1).expect("cancel");
    orchestrator.cancel_instance(2).expect("cancel");

    orchestrator
        .handle_party_input(
            0,
            &json!({
                "document_reference": "DOC-0001",
                "valid_until": "2027-01-01",
                "release_mode": "DELIVERY",
            }),
        )
        .expect("input");
    orchestrator
        .handle_exchange(&exchange(
            "Requester1",
            "Custodian1",
            document_release::RELEASE_REQUESTS_PATH,
            json!({"documentReference": "DOC-0001", "releaseRequestReference": "RRR-1"}),
            202,
        ))
        .expect("request");
    orchestrator
        .handle_exchange(&exchange(
            "Custodian1",
            "Requester1",
            document_release::RELEASE_DECISIONS_PATH,
            json!({"releaseRequestReference": "RRR-1", "decision": "ACCEPT"}),
            204,
        ))
        .expect("decision");

    assert_eq!(
        orchestrator.instance_status(0),
        Some(InstanceStatus::Completed)
    );
    for role in ["Requester", "Custodian"] {
        assert_eq!(
            orchestrator.report(role).status,
            ConformanceStatus::PartiallyConformant,
            "role {role}"
        );
    }
}

/// A session with no traffic at all reports NO_TRAFFIC.
#[test]
fn untouched_session_reports_no_traffic() {
    let orchestrator = orchestrator("untouched");
    for role in ["Requester", "Custodian"] {
        assert_eq!(
            orchestrator.report(role).status,
            ConformanceStatus::NoTraffic,
            "role {role}"
        );
    }
}
