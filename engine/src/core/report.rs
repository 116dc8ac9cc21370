//! Role-scoped conformance reports.
//!
//! A report is a serializable snapshot of the check tree from one role's
//! point of view. Leaf statuses come from exchange tallies; inner statuses
//! are the reduction of their children, so the reduction algebra (see
//! [`ConformanceStatus::reduce`]) fully determines how local failures
//! propagate to the root.

use serde::Serialize;

use crate::core::check::{CheckTree, NodeId};
use crate::core::status::ConformanceStatus;

#[derive(Debug, Clone, Serialize)]
pub struct ConformanceReport {
    pub title: String,
    pub status: ConformanceStatus,
    pub conformant_count: usize,
    pub non_conformant_count: usize,
    pub error_messages: Vec<String>,
    pub sub_reports: Vec<ConformanceReport>,
}

impl ConformanceReport {
    /// Build the report for `role`, pruning every subtree irrelevant to it.
    pub fn for_role(tree: &CheckTree, role: &str) -> Self {
        Self::for_node(tree, tree.root(), role)
    }

    fn for_node(tree: &CheckTree, id: NodeId, role: &str) -> Self {
        let node = tree.node(id);
        let sub_reports: Vec<ConformanceReport> = node
            .children()
            .iter()
            .filter(|&&child| tree.is_relevant_for_role(child, role))
            .map(|&child| Self::for_node(tree, child, role))
            .collect();

        // A node's own results count only towards the role it judges; a
        // node kept visible for its descendants contributes structure, not
        // tallies.
        let mut conformant_count = 0;
        let mut non_conformant_count = 0;
        // Sorted but not deduplicated: the same violation from two exchanges
        // is two entries, consistent with the counts.
        let mut error_messages = Vec::new();
        if node.responding_role() == Some(role) {
            for result in node.results() {
                if result.conformant {
                    conformant_count += 1;
                } else {
                    non_conformant_count += 1;
                }
                error_messages.extend(result.errors.iter().cloned());
            }
        }
        error_messages.sort();

        let mut statuses: Vec<ConformanceStatus> =
            sub_reports.iter().map(|sub| sub.status).collect();
        if node.responding_role() == Some(role) {
            statuses.push(ConformanceStatus::for_exchange_counts(
                conformant_count,
                non_conformant_count,
            ));
        }
        let status = ConformanceStatus::reduce_all(statuses.iter().copied())
            .unwrap_or(ConformanceStatus::NoTraffic);

        Self {
            title: node.title.clone(),
            status,
            conformant_count,
            non_conformant_count,
            error_messages,
            sub_reports,
        }
    }
}
