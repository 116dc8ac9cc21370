//! Scripted session driver behind the `simulate` command.
//!
//! Plays both parties of the document release standard against a live
//! orchestrator: supplies parameters, mints requests, and answers each
//! scenario's decisions, so a full session can be exercised without any
//! transport. The driver only looks at each instance's current action kind;
//! everything else flows through the ordinary orchestrator surface.

use std::collections::BTreeMap;

use anyhow::{Context, Result, bail, ensure};
use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use engine::exchange::Exchange;

use crate::orchestrator::Orchestrator;
use crate::standard::document_release::{RELEASE_DECISIONS_PATH, RELEASE_REQUESTS_PATH};

/// Drive every scenario instance to completion with conformant traffic.
pub fn run_conformant_session(orchestrator: &mut Orchestrator) -> Result<()> {
    let mut rounds = 0;
    loop {
        let active = orchestrator.active_instances();
        if active.is_empty() {
            return Ok(());
        }
        rounds += 1;
        ensure!(rounds <= 100, "simulation did not converge");
        for index in active {
            step_instance(orchestrator, index)?;
        }
    }
}

fn step_instance(orchestrator: &mut Orchestrator, index: usize) -> Result<()> {
    let Some(action) = orchestrator.current_action(index) else {
        return Ok(());
    };
    let kind = action.kind().to_string();
    let source = action.source_party().to_string();
    let target = action.target_party().map(str::to_string);

    match kind.as_str() {
        "supply" => {
            orchestrator.handle_party_input(
                index,
                &json!({
                    "document_reference": format!("DOC-{:04}", index + 1),
                    "valid_until": "2027-01-01",
                    "release_mode": "DELIVERY",
                }),
            )?;
        }
        "request" => {
            let document_reference = orchestrator.lookup_param(index, "document_reference")?;
            let target = target.context("request action has a counterparty")?;
            let body = json!({
                "documentReference": document_reference,
                "releaseRequestReference": format!("RRR-{}", Uuid::new_v4().simple()),
            });
            orchestrator.handle_exchange(&build_exchange(
                &source,
                &target,
                RELEASE_REQUESTS_PATH,
                body,
                202,
            ))?;
        }
        "accept" | "reject" => {
            let reference = orchestrator.lookup_param(index, "release_request_reference")?;
            let document_reference = orchestrator.lookup_param(index, "document_reference")?;
            let target = target.context("decision action has a counterparty")?;
            let body = json!({
                "releaseRequestReference": reference,
                "documentReference": document_reference,
                "decision": if kind == "accept" { "ACCEPT" } else { "REJECT" },
            });
            orchestrator.handle_exchange(&build_exchange(
                &source,
                &target,
                RELEASE_DECISIONS_PATH,
                body,
                204,
            ))?;
        }
        other => bail!("simulation cannot play action kind '{other}'"),
    }
    Ok(())
}

fn build_exchange(
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
    party
        .trim_end_matches(|c: char| c.is_ascii_digit())
        .to_string()
}
