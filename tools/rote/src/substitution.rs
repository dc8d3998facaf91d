//! `{{name}}` placeholder substitution for recorded action parameters.
//!
//! Substitution is textual over the serialized parameter blob: every
//! placeholder anywhere in the JSON text is replaced, including inside keys
//! and inside string values unrelated to the variable's intended field.
//! Placeholders with no matching variable are left verbatim.

use crate::errors::RoteError;
use crate::types::Parameters;
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;

pub type Variables = BTreeMap<String, Value>;

// Any brace-free text between double braces, so names like `first-name`,
// `user.email` or ` spaced ` are found as written.
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([^{}]+?)\}\}").expect("placeholder regex"));

pub fn substitute_variables(
    parameters: &Parameters,
    variables: &Variables,
) -> Result<Parameters, RoteError> {
    let serialized = serde_json::to_string(parameters)
        .map_err(|e| RoteError::Validation(format!("parameters not serializable: {e}")))?;
    if variables.is_empty() || !serialized.contains("{{") {
        return Ok(parameters.clone());
    }

    // Names appear JSON-escaped in the serialized blob, so match them that way.
    let bound = variables
        .iter()
        .map(|(name, value)| (escape_for_json_string(name), value))
        .collect::<Vec<_>>();
    let alternation = bound
        .iter()
        .map(|(name, _)| regex::escape(name))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = Regex::new(&format!(r"\{{\{{({alternation})\}}\}}"))
        .map_err(|e| RoteError::Validation(format!("variable names not usable: {e}")))?;
    let lookup = bound.into_iter().collect::<BTreeMap<_, _>>();

    let replaced = pattern.replace_all(&serialized, |caps: &Captures<'_>| {
        match lookup.get(&caps[1]) {
            Some(value) => escape_for_json_string(&value_as_text(value)),
            None => caps[0].to_string(),
        }
    });

    serde_json::from_str::<Parameters>(&replaced).map_err(|e| {
        RoteError::Validation(format!("parameters invalid after substitution: {e}"))
    })
}

/// Names of every placeholder referenced by `parameters`, deduplicated and sorted.
pub fn placeholders(parameters: &Parameters) -> Vec<String> {
    let serialized = serde_json::to_string(parameters).unwrap_or_default();
    let mut names = PLACEHOLDER
        .captures_iter(&serialized)
        .map(|caps| unescape_json_string(&caps[1]))
        .collect::<Vec<_>>();
    names.sort();
    names.dedup();
    names
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn unescape_json_string(escaped: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{escaped}\""))
        .unwrap_or_else(|_| escaped.to_string())
}

// Placeholders can only occur inside JSON string literals, so the replacement
// is escaped as string content.
fn escape_for_json_string(text: &str) -> String {
    let quoted = Value::String(text.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}
