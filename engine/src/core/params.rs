//! Declared scenario parameters and single-pass input validation.
//!
//! Input-requiring actions declare the parameters their party must supply.
//! Validation inspects the whole input in one pass and reports every
//! violation found, so the operator can fix all of them at once.

use chrono::NaiveDate;
use regex::Regex;
use serde_json::{Map, Value};

/// How a declared parameter value is validated.
#[derive(Debug, Clone)]
pub enum ParamKind {
    /// ISO-8601 calendar date (`YYYY-MM-DD`).
    Date,
    /// One of a fixed keyword set.
    Keyword(Vec<String>),
    /// Matches the given regular expression.
    Pattern(Regex),
    /// Free-form non-empty text.
    Text,
}

/// One parameter an action expects its party to supply.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
}

impl ParamSpec {
    pub fn date(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::Date,
        }
    }

    pub fn keyword(name: &str, options: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::Keyword(options.iter().map(|s| s.to_string()).collect()),
        }
    }

    /// Declare a pattern-validated parameter.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is not a valid regular expression; parameter
    /// specs are authored with the standard module, so this is a harness
    /// configuration error.
    pub fn pattern(name: &str, pattern: &str) -> Self {
        let regex = Regex::new(pattern)
            .unwrap_or_else(|err| panic!("invalid pattern for parameter '{}': {}", name, err));
        Self {
            name: name.to_string(),
            kind: ParamKind::Pattern(regex),
        }
    }

    pub fn text(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::Text,
        }
    }

    /// Placeholder value shown in the prompt's suggested input template.
    pub fn suggested_value(&self, today: NaiveDate) -> Value {
        match &self.kind {
            ParamKind::Date => Value::String(today.format("%Y-%m-%d").to_string()),
            ParamKind::Keyword(options) => {
                Value::String(options.first().cloned().unwrap_or_default())
            }
            ParamKind::Pattern(_) | ParamKind::Text => Value::String("TODO".to_string()),
        }
    }

    /// Violation message for `value`, or `None` if it is acceptable.
    fn violation(&self, value: Option<&Value>) -> Option<String> {
        let Some(value) = value else {
            return Some(format!("missing required parameter '{}'", self.name));
        };
        let Some(text) = value.as_str() else {
            return Some(format!("parameter '{}' must be a JSON string", self.name));
        };
        match &self.kind {
            ParamKind::Date => NaiveDate::parse_from_str(text, "%Y-%m-%d").err().map(|_| {
                format!(
                    "parameter '{}' must be a date in YYYY-MM-DD format, got '{}'",
                    self.name, text
                )
            }),
            ParamKind::Keyword(options) => (!options.iter().any(|option| option == text))
                .then(|| {
                    format!(
                        "parameter '{}' must be one of [{}], got '{}'",
                        self.name,
                        options.join(", "),
                        text
                    )
                }),
            ParamKind::Pattern(regex) => (!regex.is_match(text)).then(|| {
                format!(
                    "parameter '{}' does not match pattern '{}': got '{}'",
                    self.name, regex, text
                )
            }),
            ParamKind::Text => text
                .trim()
                .is_empty()
                .then(|| format!("parameter '{}' must not be empty", self.name)),
        }
    }
}

/// Validate `input` against `specs` in a single pass.
///
/// Returns every violation found, in spec declaration order, so the caller
/// can surface one aggregated message instead of failing at the first error.
pub fn validate_input(specs: &[ParamSpec], input: &Value) -> Vec<String> {
    let empty = Map::new();
    let fields = input.as_object().unwrap_or(&empty);
    if !input.is_object() {
        return vec!["party input must be a JSON object".to_string()];
    }
    specs
        .iter()
        .filter_map(|spec| spec.violation(fields.get(&spec.name)))
        .collect()
}
