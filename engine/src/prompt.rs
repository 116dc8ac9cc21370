//! Operator prompt rendering.
//!
//! Every pending action is presented to its party's operator as a rendered
//! markdown prompt. The action's instruction text is itself a template over
//! the scenario's resolved parameters, so standards can interpolate values
//! captured by earlier steps; reading a parameter no earlier action set is
//! a configuration error and fails the render instead of printing a blank.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::Utc;
use minijinja::{context, Environment, UndefinedBehavior};
use serde_json::Value;

use crate::core::action::Action;

const ACTION_PROMPT_TEMPLATE: &str = include_str!("templates/action_prompt.md");

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_template("action_prompt", ACTION_PROMPT_TEMPLATE)
            .expect("action prompt template should be valid");
        Self { env }
    }

    fn render_instruction(
        &self,
        instruction: &str,
        params: &BTreeMap<String, Value>,
    ) -> Result<String> {
        self.env
            .render_str(instruction, context! { params => params })
            .context("render action instruction")
    }

    fn render_action(&self, action: &Action, instruction: String) -> Result<String> {
        let input_template = input_template(action)?;
        let template = self.env.get_template("action_prompt")?;
        let rendered = template.render(context! {
            title => action.title(),
            path => action.path(),
            source_party => action.source_party(),
            target_party => action.target_party(),
            instruction => instruction.trim(),
            input_template => input_template,
        })?;
        Ok(rendered)
    }
}

/// Pretty-printed suggested-values object, or `None` for actions without
/// declared input.
fn input_template(action: &Action) -> Result<Option<String>> {
    if !action.requires_input() {
        return Ok(None);
    }
    let today = Utc::now().date_naive();
    let suggested: serde_json::Map<String, Value> = action
        .input_specs()
        .iter()
        .map(|spec| (spec.name.clone(), spec.suggested_value(today)))
        .collect();
    let rendered = serde_json::to_string_pretty(&Value::Object(suggested))
        .context("serialize suggested input template")?;
    Ok(Some(rendered))
}

/// Render the operator prompt for `action` given the parameters resolved up
/// to it.
pub fn render_prompt(action: &Action, resolved_params: &BTreeMap<String, Value>) -> Result<String> {
    let engine = PromptEngine::new();
    let instruction = engine
        .render_instruction(action.instruction(), resolved_params)
        .with_context(|| format!("prompt for action '{}'", action.path()))?;
    engine.render_action(action, instruction)
}
