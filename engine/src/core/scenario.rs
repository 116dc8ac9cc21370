//! Combinator scenario-tree builder.
//!
//! A standard module describes its conversation variants as a tree of
//! builder nodes, each wrapping a factory from the previous action to the
//! next one. [`ScenarioNode::build_scenarios`] expands the tree into one
//! scenario per root→leaf path, in declaration order, so reports stay
//! reproducible across runs.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::core::action::Action;

/// Factory producing the next action of a chain from the previous one.
pub type ActionFactory = Box<dyn Fn(Option<&Action>) -> Action>;

/// One node of the scenario tree.
///
/// Ownership is strictly downward: a node owns its children and nothing
/// points back up. Branch attachment consumes the node, and attaching twice
/// is a harness-configuration error.
pub struct ScenarioNode {
    factory: ActionFactory,
    children: Vec<ScenarioNode>,
}

impl ScenarioNode {
    pub fn new(factory: impl Fn(Option<&Action>) -> Action + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            children: Vec::new(),
        }
    }

    /// Sequential composition: a single follow-up step.
    ///
    /// # Panics
    ///
    /// Panics if this node already has children; the repertoire of branches
    /// is fixed when the standard is authored, so a second attachment is a
    /// fatal configuration error.
    pub fn then(self, child: ScenarioNode) -> Self {
        self.then_either(vec![child])
    }

    /// Branching composition: mutually exclusive follow-up steps.
    ///
    /// # Panics
    ///
    /// Panics if this node already has children (see [`ScenarioNode::then`]).
    pub fn then_either(mut self, children: Vec<ScenarioNode>) -> Self {
        assert!(
            self.children.is_empty(),
            "scenario node already has children; branches may be attached exactly once"
        );
        debug!(branches = children.len(), "attaching scenario branches");
        self.children = children;
        self
    }

    /// Expand the tree into one scenario per root→leaf path.
    ///
    /// Paths are enumerated in declaration order. Each path instantiates its
    /// actions front to back, feeding every factory the previously created
    /// action so later steps can read values earlier steps will fill at
    /// runtime.
    pub fn build_scenarios(&self, module_index: usize) -> Vec<Scenario> {
        let mut scenarios = Vec::new();
        let mut path = Vec::new();
        self.collect(&mut path, module_index, &mut scenarios);
        debug!(
            module_index,
            scenario_count = scenarios.len(),
            "scenario tree expanded"
        );
        scenarios
    }

    fn collect<'a>(
        &'a self,
        path: &mut Vec<&'a ScenarioNode>,
        module_index: usize,
        out: &mut Vec<Scenario>,
    ) {
        path.push(self);
        if self.children.is_empty() {
            let mut actions: Vec<Action> = Vec::with_capacity(path.len());
            for node in &*path {
                let action = (node.factory)(actions.last());
                actions.push(action);
            }
            out.push(Scenario {
                module_index,
                scenario_index: out.len(),
                actions,
            });
        } else {
            for child in &self.children {
                child.collect(path, module_index, out);
            }
        }
        path.pop();
    }
}

/// One concrete, fully ordered conversation path.
///
/// Structure is immutable after build; per-action state is mutable.
pub struct Scenario {
    pub module_index: usize,
    pub scenario_index: usize,
    pub actions: Vec<Action>,
}

impl Scenario {
    /// Human-readable identity: the full path of the final action.
    pub fn title(&self) -> &str {
        self.actions
            .last()
            .map(|action| action.path())
            .unwrap_or("")
    }

    /// Parameter bags of actions `0..=upto`, merged; later actions win.
    pub fn resolved_params(&self, upto: usize) -> BTreeMap<String, Value> {
        let mut resolved = BTreeMap::new();
        for action in self.actions.iter().take(upto + 1) {
            for (name, value) in action.params() {
                resolved.insert(name.clone(), value.clone());
            }
        }
        resolved
    }

    /// Read a derived parameter visible to action `upto`.
    ///
    /// Failing to find it means the harness asked for a value no earlier
    /// action ever set, which is a configuration error for the caller to
    /// fail fast on.
    pub fn lookup_param(&self, upto: usize, name: &str) -> Result<Value, String> {
        self.resolved_params(upto).remove(name).ok_or_else(|| {
            format!(
                "parameter '{}' was never set by any action up to step {}",
                name, upto
            )
        })
    }

    /// Clear all per-action state so the scenario can back a fresh run.
    pub fn reset(&mut self) {
        for action in &mut self.actions {
            action.reset();
        }
    }
}
