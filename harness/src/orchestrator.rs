//! Session orchestration across concurrent scenario instances.
//!
//! One orchestrator owns one test session: the expanded scenarios of a
//! standard, the check tree judging their traffic, and the persistence
//! provider recording both. At most `max_active_instances` scenarios run at
//! a time; the rest wait in declaration order and are activated as earlier
//! instances complete or are cancelled. Every exchange is written to the
//! durable traffic log before any analysis, so a crashed session can be
//! rebuilt by [`Orchestrator::resume`].

use anyhow::{Context, Result, ensure};
use serde_json::{Value, json};
use tracing::{debug, info};

use engine::core::action::Action;
use engine::core::check::CheckTree;
use engine::core::report::ConformanceReport;
use engine::core::scenario::Scenario;
use engine::exchange::Exchange;
use engine::prompt::render_prompt;
use engine::state::PersistenceProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
}

impl InstanceStatus {
    fn as_str(self) -> &'static str {
        match self {
            InstanceStatus::Pending => "PENDING",
            InstanceStatus::Active => "ACTIVE",
            InstanceStatus::Completed => "COMPLETED",
            InstanceStatus::Cancelled => "CANCELLED",
        }
    }

    fn parse(text: &str) -> Option<Self> {
        match text {
            "PENDING" => Some(InstanceStatus::Pending),
            "ACTIVE" => Some(InstanceStatus::Active),
            "COMPLETED" => Some(InstanceStatus::Completed),
            "CANCELLED" => Some(InstanceStatus::Cancelled),
            _ => None,
        }
    }
}

struct Instance {
    current_action: usize,
    status: InstanceStatus,
}

pub struct Orchestrator {
    session_id: String,
    scenarios: Vec<Scenario>,
    check_tree: CheckTree,
    persistence: PersistenceProvider,
    max_active_instances: usize,
    instances: Vec<Instance>,
}

impl Orchestrator {
    /// Start a fresh session.
    pub fn new(
        session_id: &str,
        scenarios: Vec<Scenario>,
        check_tree: CheckTree,
        persistence: PersistenceProvider,
        max_active_instances: usize,
    ) -> Result<Self> {
        let mut orchestrator = Self::build(
            session_id,
            scenarios,
            check_tree,
            persistence,
            max_active_instances,
        )?;
        orchestrator.activate_up_to_limit()?;
        Ok(orchestrator)
    }

    /// Rebuild a session from persistence: instance progress, per-action
    /// state, and the recorded traffic re-fed through the check tree.
    pub fn resume(
        session_id: &str,
        scenarios: Vec<Scenario>,
        check_tree: CheckTree,
        persistence: PersistenceProvider,
        max_active_instances: usize,
    ) -> Result<Self> {
        let mut orchestrator = Self::build(
            session_id,
            scenarios,
            check_tree,
            persistence,
            max_active_instances,
        )?;
        orchestrator.replay()?;
        orchestrator.activate_up_to_limit()?;
        Ok(orchestrator)
    }

    fn build(
        session_id: &str,
        scenarios: Vec<Scenario>,
        check_tree: CheckTree,
        persistence: PersistenceProvider,
        max_active_instances: usize,
    ) -> Result<Self> {
        ensure!(max_active_instances > 0, "max_active_instances must be > 0");
        let instances = scenarios
            .iter()
            .map(|_| Instance {
                current_action: 0,
                status: InstanceStatus::Pending,
            })
            .collect();
        Ok(Self {
            session_id: session_id.to_string(),
            scenarios,
            check_tree,
            persistence,
            max_active_instances,
            instances,
        })
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub fn instance_status(&self, instance_index: usize) -> Option<InstanceStatus> {
        self.instances.get(instance_index).map(|i| i.status)
    }

    pub fn active_instances(&self) -> Vec<usize> {
        (0..self.instances.len())
            .filter(|&i| self.instances[i].status == InstanceStatus::Active)
            .collect()
    }

    /// The action an active instance is currently waiting on.
    pub fn current_action(&self, instance_index: usize) -> Option<&Action> {
        let instance = self.instances.get(instance_index)?;
        if instance.status != InstanceStatus::Active {
            return None;
        }
        self.scenarios[instance_index]
            .actions
            .get(instance.current_action)
    }

    /// Resolve a derived parameter visible to an instance's current action.
    pub fn lookup_param(&self, instance_index: usize, name: &str) -> Result<Value> {
        let instance = self
            .instances
            .get(instance_index)
            .with_context(|| format!("no instance {instance_index}"))?;
        self.scenarios[instance_index]
            .lookup_param(instance.current_action, name)
            .map_err(|err| anyhow::anyhow!(err))
    }

    /// Rendered prompts for every action currently waiting on `party`,
    /// keyed by instance index.
    pub fn pending_prompts(&self, party: &str) -> Result<Vec<(usize, String)>> {
        let mut prompts = Vec::new();
        for index in self.active_instances() {
            let action_index = self.instances[index].current_action;
            let action = &self.scenarios[index].actions[action_index];
            if action.source_party() != party {
                continue;
            }
            let resolved = self.scenarios[index].resolved_params(action_index);
            let prompt = render_prompt(action, &resolved)
                .with_context(|| format!("prompt for instance {index}"))?;
            prompts.push((index, prompt));
        }
        Ok(prompts)
    }

    /// Route operator-supplied parameters to an instance's current action.
    ///
    /// Input-only actions (no counterparty) advance immediately on accepted
    /// input; actions that also send a message advance when their exchange
    /// arrives.
    pub fn handle_party_input(&mut self, instance_index: usize, input: &Value) -> Result<()> {
        let instance = self
            .instances
            .get(instance_index)
            .with_context(|| format!("no instance {instance_index}"))?;
        ensure!(
            instance.status == InstanceStatus::Active,
            "instance {} is {}, not ACTIVE",
            instance_index,
            instance.status.as_str()
        );
        let action_index = instance.current_action;
        let action = &mut self.scenarios[instance_index].actions[action_index];
        ensure!(
            action.requires_input(),
            "action '{}' does not accept party input",
            action.path()
        );
        action.handle_party_input(input)?;
        self.persist_action_state(instance_index, action_index)?;
        if self.scenarios[instance_index].actions[action_index]
            .target_party()
            .is_none()
        {
            self.advance(instance_index)?;
        }
        Ok(())
    }

    /// Record one completed exchange, feed it to the check tree, and advance
    /// any instance whose current action it matches.
    pub fn handle_exchange(&mut self, exchange: &Exchange) -> Result<()> {
        // Durable log first; analysis state can always be rebuilt from it.
        // The sort key carries a per-session sequence number so replay sees
        // exchanges in arrival order, not timestamp or uuid order.
        let sequence = self.next_traffic_sequence()?;
        let sk = format!("exchange#{sequence:012}#{}", exchange.uuid);
        self.persistence.non_locking.set(
            &self.session_id,
            &sk,
            serde_json::to_value(exchange).context("serialize exchange")?,
        );
        self.apply_exchange(exchange)
    }

    fn next_traffic_sequence(&self) -> Result<u64> {
        self.persistence
            .executor
            .execute("traffic-sequence", &self.session_id, "traffic-sequence", |value| {
                json!(value.as_u64().unwrap_or(0) + 1)
            })?
            .as_u64()
            .context("traffic sequence is numeric")
    }

    fn apply_exchange(&mut self, exchange: &Exchange) -> Result<()> {
        self.check_tree.handle_exchange(exchange);
        for index in self.active_instances() {
            let action_index = self.instances[index].current_action;
            let resolved = self.scenarios[index].resolved_params(action_index);
            let action = &mut self.scenarios[index].actions[action_index];
            // Input-only actions are satisfied by party input, not traffic.
            if action.target_party().is_none() {
                continue;
            }
            if action.update_from_exchange(exchange, &resolved) {
                self.persist_action_state(index, action_index)?;
                self.advance(index)?;
            }
        }
        Ok(())
    }

    /// Give up on an instance and free its slot for the next pending one.
    pub fn cancel_instance(&mut self, instance_index: usize) -> Result<()> {
        let instance = self
            .instances
            .get_mut(instance_index)
            .with_context(|| format!("no instance {instance_index}"))?;
        ensure!(
            matches!(
                instance.status,
                InstanceStatus::Pending | InstanceStatus::Active
            ),
            "instance {} already finished",
            instance_index
        );
        instance.status = InstanceStatus::Cancelled;
        info!(instance = instance_index, "instance cancelled");
        self.persist_instance(instance_index)?;
        self.activate_up_to_limit()
    }

    /// Clear all run state so the same session shape can start over.
    pub fn reset(&mut self) -> Result<()> {
        for scenario in &mut self.scenarios {
            scenario.reset();
        }
        self.check_tree.reset();
        for instance in &mut self.instances {
            instance.current_action = 0;
            instance.status = InstanceStatus::Pending;
        }
        self.activate_up_to_limit()
    }

    fn replay(&mut self) -> Result<()> {
        for index in 0..self.instances.len() {
            let record = self.load_persisted(&format!("instance#{index:03}"));
            if let Some(record) = record.as_object() {
                let current = record
                    .get("current_action")
                    .and_then(Value::as_u64)
                    .unwrap_or(0) as usize;
                let status = record
                    .get("status")
                    .and_then(Value::as_str)
                    .and_then(InstanceStatus::parse)
                    .unwrap_or(InstanceStatus::Pending);
                self.instances[index].current_action = current;
                self.instances[index].status = status;
            }
            for action_index in 0..self.scenarios[index].actions.len() {
                let sk = format!("state#instance#{index:03}#action#{action_index:03}");
                let state = self.load_persisted(&sk);
                if !state.is_null() {
                    self.scenarios[index].actions[action_index]
                        .import_state(&state)
                        .map_err(|err| anyhow::anyhow!(err))
                        .with_context(|| {
                            format!("restore instance {index} action {action_index}")
                        })?;
                }
            }
        }

        let recorded = self
            .persistence
            .non_locking
            .scan_prefix(&self.session_id, "exchange#");
        info!(exchanges = recorded.len(), "replaying recorded traffic");
        for (_, value) in recorded {
            let exchange: Exchange =
                serde_json::from_value(value).context("deserialize recorded exchange")?;
            self.check_tree.handle_exchange(&exchange);
        }
        Ok(())
    }

    pub fn report(&self, role: &str) -> ConformanceReport {
        ConformanceReport::for_role(&self.check_tree, role)
    }

    fn advance(&mut self, instance_index: usize) -> Result<()> {
        let done = {
            let instance = &mut self.instances[instance_index];
            instance.current_action += 1;
            instance.current_action >= self.scenarios[instance_index].actions.len()
        };
        if done {
            self.instances[instance_index].status = InstanceStatus::Completed;
            info!(
                instance = instance_index,
                scenario = self.scenarios[instance_index].title(),
                "instance completed"
            );
        } else {
            debug!(
                instance = instance_index,
                action = self.instances[instance_index].current_action,
                "instance advanced"
            );
        }
        self.persist_instance(instance_index)?;
        if done {
            self.activate_up_to_limit()?;
        }
        Ok(())
    }

    fn activate_up_to_limit(&mut self) -> Result<()> {
        loop {
            let active = self.active_instances().len();
            if active >= self.max_active_instances {
                return Ok(());
            }
            let Some(next) = self
                .instances
                .iter()
                .position(|i| i.status == InstanceStatus::Pending)
            else {
                return Ok(());
            };
            self.instances[next].status = InstanceStatus::Active;
            info!(
                instance = next,
                scenario = self.scenarios[next].title(),
                "instance activated"
            );
            self.persist_instance(next)?;
        }
    }

    fn persist_instance(&self, instance_index: usize) -> Result<()> {
        let instance = &self.instances[instance_index];
        let record = json!({
            "current_action": instance.current_action,
            "status": instance.status.as_str(),
        });
        self.persistence
            .executor
            .execute(
                "instance-progress",
                &self.session_id,
                &format!("instance#{instance_index:03}"),
                move |_| record.clone(),
            )
            .map(|_| ())
    }

    fn persist_action_state(&self, instance_index: usize, action_index: usize) -> Result<()> {
        let state = self.scenarios[instance_index].actions[action_index].export_state();
        let sk = format!("state#instance#{instance_index:03}#action#{action_index:03}");
        self.persistence
            .executor
            .execute("action-state", &self.session_id, &sk, move |_| {
                state.clone()
            })
            .map(|_| ())
    }

    fn load_persisted(&self, sk: &str) -> Value {
        self.persistence.executor.load(&self.session_id, sk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::standard::document_release;
    use engine::test_support::exchange;
    use serde_json::json;

    fn orchestrator(max_active: usize) -> Orchestrator {
        Orchestrator::new(
            "test-session",
            document_release::build_scenarios("Requester1", "Custodian1"),
            document_release::build_check_tree(),
            PersistenceProvider::in_memory(128 * 1024),
            max_active,
        )
        .expect("orchestrator")
    }

    /// Only `max_active_instances` run at once; the rest wait their turn.
    #[test]
    fn activation_respects_instance_limit() {
        let orchestrator = orchestrator(2);
        assert_eq!(orchestrator.active_instances(), vec![0, 1]);
        assert_eq!(
            orchestrator.instance_status(2),
            Some(InstanceStatus::Pending)
        );
    }

    /// Cancelling an active instance activates the next pending one.
    #[test]
    fn cancellation_frees_a_slot() {
        let mut orchestrator = orchestrator(1);
        orchestrator.cancel_instance(0).expect("cancel");
        assert_eq!(
            orchestrator.instance_status(0),
            Some(InstanceStatus::Cancelled)
        );
        assert_eq!(orchestrator.active_instances(), vec![1]);
    }

    /// Input-only actions advance on accepted input; invalid input leaves
    /// the instance where it was.
    #[test]
    fn party_input_advances_input_only_actions() {
        let mut orchestrator = orchestrator(4);
        let err = orchestrator
            .handle_party_input(0, &json!({"document_reference": "lowercase"}))
            .expect_err("invalid reference");
        assert!(format!("{err:#}").contains("document_reference"));
        assert_eq!(
            orchestrator.current_action(0).expect("active").kind(),
            "supply"
        );

        orchestrator
            .handle_party_input(
                0,
                &json!({
                    "document_reference": "DOC-0001",
                    "valid_until": "2026-12-31",
                    "release_mode": "DELIVERY",
                }),
            )
            .expect("valid input");
        assert_eq!(
            orchestrator.current_action(0).expect("active").kind(),
            "request"
        );
    }

    /// A matching exchange advances exactly the instance it belongs to.
    #[test]
    fn exchange_advances_matching_instance() {
        let mut orchestrator = orchestrator(4);
        for (index, reference) in [(0, "DOC-0001"), (1, "DOC-0002")] {
            orchestrator
                .handle_party_input(
                    index,
                    &json!({
                        "document_reference": reference,
                        "valid_until": "2026-12-31",
                        "release_mode": "DELIVERY",
                    }),
                )
                .expect("valid input");
        }

        orchestrator
            .handle_exchange(&exchange(
                "Requester1",
                "Custodian1",
                "/v1/release-requests",
                json!({"documentReference": "DOC-0002", "releaseRequestReference": "RRR-2"}),
                202,
            ))
            .expect("handle");

        assert_eq!(
            orchestrator.current_action(0).expect("active").kind(),
            "request"
        );
        let advanced = orchestrator.current_action(1).expect("active");
        assert_ne!(advanced.kind(), "request");
    }

    /// Prompts are rendered for whichever party the current actions wait on.
    #[test]
    fn pending_prompts_are_routed_by_party() {
        let orchestrator = orchestrator(4);
        let custodian_prompts = orchestrator.pending_prompts("Custodian1").expect("render");
        assert_eq!(custodian_prompts.len(), orchestrator.active_instances().len());
        assert!(custodian_prompts[0].1.contains("Supply scenario parameters"));

        let requester_prompts = orchestrator.pending_prompts("Requester1").expect("render");
        assert!(requester_prompts.is_empty());
    }

    /// Replay rebuilds instance progress, action state and check tree
    /// results in a fresh orchestrator sharing the same persistence.
    #[test]
    fn replay_restores_a_fresh_orchestrator() {
        let persistence = PersistenceProvider::in_memory(128 * 1024);
        let mut original = Orchestrator::new(
            "session-r",
            document_release::build_scenarios("Requester1", "Custodian1"),
            document_release::build_check_tree(),
            persistence.clone(),
            4,
        )
        .expect("orchestrator");

        original
            .handle_party_input(
                0,
                &json!({
                    "document_reference": "DOC-0001",
                    "valid_until": "2026-12-31",
                    "release_mode": "DELIVERY",
                }),
            )
            .expect("input");
        original
            .handle_exchange(&exchange(
                "Requester1",
                "Custodian1",
                "/v1/release-requests",
                json!({"documentReference": "DOC-0001", "releaseRequestReference": "RRR-1"}),
                202,
            ))
            .expect("handle");

        let restored = Orchestrator::resume(
            "session-r",
            document_release::build_scenarios("Requester1", "Custodian1"),
            document_release::build_check_tree(),
            persistence,
            4,
        )
        .expect("resume");

        assert_eq!(
            restored.current_action(0).expect("active").kind(),
            original.current_action(0).expect("active").kind()
        );
        assert_eq!(
            restored.scenarios()[0].actions[1].params(),
            original.scenarios()[0].actions[1].params()
        );
        assert_eq!(
            serde_json::to_value(restored.report("Custodian")).expect("json"),
            serde_json::to_value(original.report("Custodian")).expect("json")
        );
    }

    /// Replay feeds recorded traffic in arrival order even when exchanges
    /// share a timestamp and their uuids sort against that order.
    #[test]
    fn replay_preserves_arrival_order_of_simultaneous_traffic() {
        let persistence = PersistenceProvider::in_memory(128 * 1024);
        let mut original = Orchestrator::new(
            "session-o",
            document_release::build_scenarios("Requester1", "Custodian1"),
            document_release::build_check_tree(),
            persistence.clone(),
            4,
        )
        .expect("orchestrator");
        original
            .handle_party_input(
                0,
                &json!({
                    "document_reference": "DOC-0001",
                    "valid_until": "2026-12-31",
                    "release_mode": "DELIVERY",
                }),
            )
            .expect("input");

        let mut request = exchange(
            "Requester1",
            "Custodian1",
            "/v1/release-requests",
            json!({"documentReference": "DOC-0001", "releaseRequestReference": "RRR-1"}),
            202,
        );
        let mut decision = exchange(
            "Custodian1",
            "Requester1",
            "/v1/release-decisions",
            json!({"releaseRequestReference": "RRR-1", "decision": "ACCEPT"}),
            204,
        );
        // Same instant, and the later exchange gets the smaller uuid.
        decision.request_timestamp = request.request_timestamp;
        decision.response_timestamp = request.response_timestamp;
        request.uuid = uuid::Uuid::from_u128(u128::MAX);
        decision.uuid = uuid::Uuid::from_u128(1);
        original.handle_exchange(&request).expect("request");
        original.handle_exchange(&decision).expect("decision");
        assert_eq!(
            original.instance_status(0),
            Some(InstanceStatus::Completed)
        );
        // Instances still waiting on party input ignore the traffic.
        assert_eq!(original.current_action(1).expect("active").kind(), "supply");

        let restored = Orchestrator::resume(
            "session-o",
            document_release::build_scenarios("Requester1", "Custodian1"),
            document_release::build_check_tree(),
            persistence,
            4,
        )
        .expect("resume");

        for role in ["Requester", "Custodian"] {
            assert_eq!(
                serde_json::to_value(restored.report(role)).expect("json"),
                serde_json::to_value(original.report(role)).expect("json"),
                "role {role}"
            );
        }
    }

    /// Reset returns every instance to the start with a clean check tree.
    #[test]
    fn reset_restarts_the_session() {
        let mut orchestrator = orchestrator(4);
        orchestrator
            .handle_party_input(
                0,
                &json!({
                    "document_reference": "DOC-0001",
                    "valid_until": "2026-12-31",
                    "release_mode": "DELIVERY",
                }),
            )
            .expect("input");
        orchestrator.reset().expect("reset");
        assert_eq!(
            orchestrator.current_action(0).expect("active").kind(),
            "supply"
        );
        assert_eq!(
            orchestrator.report("Custodian").status,
            engine::core::status::ConformanceStatus::NoTraffic
        );
    }
}
