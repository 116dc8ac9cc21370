//! Check tree matching and correlation.
//!
//! The check tree topologically mirrors the scenario tree. Group nodes
//! organize the report; check nodes attribute incoming exchanges to
//! candidate correlation chains and judge them. Many scenario instances run
//! concurrently against the same endpoints, so attribution works backwards:
//! an exchange extends the parent chain whose tail it correlates with,
//! most-recently-extended chains first, which keeps ambiguous traffic
//! deterministic.
//!
//! The tree is an arena: nodes are addressed by index, children are owned
//! by the arena, and parents are plain back-indices.

use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use crate::exchange::Exchange;
use crate::schema::SchemaValidator;

/// Index of a node within its [`CheckTree`].
pub type NodeId = usize;

/// Node-specific predicate on message shape and status code.
pub type ExchangePredicate = Box<dyn Fn(&Exchange) -> bool + Send + Sync>;

/// Predicate comparing a new exchange against a chain's tail exchange.
pub type CorrelationPredicate = Box<dyn Fn(&Exchange, &Exchange) -> bool + Send + Sync>;

/// Matching behavior of one check node.
pub struct CheckBehavior {
    /// Role whose conformance this check judges; used for report filtering,
    /// never for matching.
    pub responding_role: String,
    /// Is this exchange of the message shape this node checks at all?
    pub relevance: ExchangePredicate,
    /// Does this exchange continue the conversation ending in the tail
    /// exchange?
    pub correlate: CorrelationPredicate,
    /// Standard-specific bootstrap hook: may a conversation legitimately
    /// restart on top of this (otherwise unrelated) chain tail? Consulted
    /// only when ordinary correlation found no chain.
    pub restart: Option<CorrelationPredicate>,
    /// When set, this node is a terminal: every attributed exchange is
    /// judged against this response status and emits a result. Non-terminal
    /// nodes only extend chain state.
    pub expected_status: Option<u16>,
    /// Schema the request body of an attributed exchange must satisfy at a
    /// terminal; violations are added to the result's errors.
    pub request_schema: Option<SchemaValidator>,
}

/// Judgement of one attributed exchange. Immutable, append-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConformanceResult {
    pub party: String,
    pub exchange: Uuid,
    pub conformant: bool,
    pub errors: Vec<String>,
}

/// A tentative, growing list of exchanges believed to belong to one
/// in-progress scenario instance.
struct Chain {
    exchanges: Vec<Uuid>,
    last_extended: u64,
}

pub struct CheckNode {
    pub title: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    behavior: Option<CheckBehavior>,
    chains: Vec<Chain>,
    results: Vec<ConformanceResult>,
}

impl CheckNode {
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn results(&self) -> &[ConformanceResult] {
        &self.results
    }

    /// True for matching check nodes, false for grouping nodes.
    pub fn is_check(&self) -> bool {
        self.behavior.is_some()
    }

    /// Role this node judges, `None` for grouping nodes.
    pub fn responding_role(&self) -> Option<&str> {
        self.behavior
            .as_ref()
            .map(|behavior| behavior.responding_role.as_str())
    }

    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    fn holds_exchange(&self, uuid: Uuid) -> bool {
        self.chains
            .iter()
            .any(|chain| chain.exchanges.contains(&uuid))
    }
}

/// Arena of check nodes plus the exchange log backing correlation.
pub struct CheckTree {
    nodes: Vec<CheckNode>,
    exchanges: HashMap<Uuid, Exchange>,
    next_chain_seq: u64,
}

impl CheckTree {
    /// Create a tree with a grouping root.
    pub fn new(title: &str) -> Self {
        Self {
            nodes: vec![CheckNode {
                title: title.to_string(),
                parent: None,
                children: Vec::new(),
                behavior: None,
                chains: Vec::new(),
                results: Vec::new(),
            }],
            exchanges: HashMap::new(),
            next_chain_seq: 0,
        }
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn node(&self, id: NodeId) -> &CheckNode {
        &self.nodes[id]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Add a grouping node under `parent`.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is a check node; only grouping nodes may have
    /// children. Tree shape is fixed at harness-authoring time, so this is
    /// a fatal configuration error.
    pub fn add_group(&mut self, parent: NodeId, title: &str) -> NodeId {
        self.add_node(parent, title, None)
    }

    /// Add a matching check node under `parent`.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`CheckTree::add_group`].
    pub fn add_check(&mut self, parent: NodeId, title: &str, behavior: CheckBehavior) -> NodeId {
        self.add_node(parent, title, Some(behavior))
    }

    fn add_node(&mut self, parent: NodeId, title: &str, behavior: Option<CheckBehavior>) -> NodeId {
        assert!(
            self.nodes[parent].behavior.is_none() || behavior.is_some(),
            "grouping node '{}' cannot be attached under check node '{}'",
            title,
            self.nodes[parent].title
        );
        let id = self.nodes.len();
        self.nodes.push(CheckNode {
            title: title.to_string(),
            parent: Some(parent),
            children: Vec::new(),
            behavior,
            chains: Vec::new(),
            results: Vec::new(),
        });
        self.nodes[parent].children.push(id);
        id
    }

    /// Attribute and judge one incoming exchange at every check node.
    pub fn handle_exchange(&mut self, exchange: &Exchange) {
        self.exchanges.insert(exchange.uuid, exchange.clone());
        let check_ids: Vec<NodeId> = (0..self.nodes.len())
            .filter(|&id| self.nodes[id].behavior.is_some())
            .collect();
        for id in check_ids {
            self.try_attach(id, exchange);
        }
    }

    fn try_attach(&mut self, id: NodeId, exchange: &Exchange) {
        let (new_chain, expected_status, schema_errors) = {
            let node = &self.nodes[id];
            let Some(behavior) = &node.behavior else {
                return;
            };
            if !(behavior.relevance)(exchange) {
                return;
            }
            // Invariant: at most one candidate chain per node may hold a
            // given exchange.
            if node.holds_exchange(exchange.uuid) {
                return;
            }

            let new_chain = match self.nearest_check_ancestor(id) {
                None => Some(vec![exchange.uuid]),
                Some(parent_id) => {
                    let mut parent_chains: Vec<&Chain> =
                        self.nodes[parent_id].chains.iter().collect();
                    parent_chains.sort_by(|a, b| b.last_extended.cmp(&a.last_extended));

                    let extend_with = |predicate: &CorrelationPredicate| {
                        parent_chains.iter().find_map(|chain| {
                            let tail = chain
                                .exchanges
                                .last()
                                .and_then(|uuid| self.exchanges.get(uuid))?;
                            predicate(exchange, tail).then(|| {
                                let mut extended = chain.exchanges.clone();
                                extended.push(exchange.uuid);
                                extended
                            })
                        })
                    };

                    extend_with(&behavior.correlate).or_else(|| {
                        behavior
                            .restart
                            .as_ref()
                            .and_then(|predicate| extend_with(predicate))
                    })
                }
            };
            let schema_errors = match (&behavior.request_schema, behavior.expected_status) {
                (Some(validator), Some(_)) if new_chain.is_some() => {
                    validator.validate(&exchange.request_json())
                }
                _ => Vec::new(),
            };
            (new_chain, behavior.expected_status, schema_errors)
        };

        let Some(chain) = new_chain else {
            // Unattributed traffic is not an error; it is simply excluded
            // from conformance tallies.
            return;
        };

        let seq = self.next_chain_seq;
        self.next_chain_seq += 1;
        debug!(
            node = %self.nodes[id].title,
            exchange = %exchange.uuid,
            chain_len = chain.len(),
            "exchange attributed to candidate chain"
        );
        let node = &mut self.nodes[id];
        node.chains.push(Chain {
            exchanges: chain,
            last_extended: seq,
        });

        if let Some(expected) = expected_status {
            let mut errors = schema_errors;
            if exchange.response_status != expected {
                errors.push(format!(
                    "Response status '{}' does not match the expected value '{}'",
                    exchange.response_status, expected
                ));
            }
            let conformant = errors.is_empty();
            node.results.push(ConformanceResult {
                party: exchange.target_party.clone(),
                exchange: exchange.uuid,
                conformant,
                errors,
            });
        }
    }

    fn nearest_check_ancestor(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.nodes[id].parent;
        while let Some(ancestor) = current {
            if self.nodes[ancestor].behavior.is_some() {
                return Some(ancestor);
            }
            current = self.nodes[ancestor].parent;
        }
        None
    }

    /// A node is relevant to `role` if it judges that role itself or any
    /// descendant does; intermediate nodes stay visible so deeper checks
    /// keep their place in the report.
    pub fn is_relevant_for_role(&self, id: NodeId, role: &str) -> bool {
        let node = &self.nodes[id];
        if node.responding_role() == Some(role) {
            return true;
        }
        node.children
            .iter()
            .any(|&child| self.is_relevant_for_role(child, role))
    }

    /// Clear chains, results and the exchange log; tree structure survives
    /// so the same tree can back a fresh run.
    pub fn reset(&mut self) {
        for node in &mut self.nodes {
            node.chains.clear();
            node.results.clear();
        }
        self.exchanges.clear();
        self.next_chain_seq = 0;
    }
}
