//! Placeholder substitution for template subjects and bodies.
//!
//! A placeholder is `{name}` where `name` is any run of characters other
//! than `}`, trimmed of surrounding whitespace. Rendering is pure: no I/O,
//! and the same input always yields the same output.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;
use thiserror::Error;

/// Values substituted into placeholders, keyed by variable name.
pub type Variables = BTreeMap<String, Value>;

#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^}]+)\}").expect("placeholder pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("missing variable '{name}'")]
    MissingVariable { name: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderRequest {
    pub subject: String,
    pub body: String,
    pub variables: Variables,
}

/// Subject and body ready to hand to a transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedContent {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateRenderer;

impl TemplateRenderer {
    /// Renders subject and body against the request's variables.
    ///
    /// # Errors
    /// Returns `RenderError::MissingVariable` for the first placeholder with
    /// no matching variable.
    pub fn render(&self, request: &RenderRequest) -> Result<RenderedContent, RenderError> {
        Ok(RenderedContent {
            subject: render_text(&request.subject, &request.variables)?,
            body: render_text(&request.body, &request.variables)?,
        })
    }
}

/// Replaces every placeholder in `text` with the string form of its variable.
///
/// # Errors
/// Returns `RenderError::MissingVariable` if a placeholder has no value.
pub fn render_text(text: &str, variables: &Variables) -> Result<String, RenderError> {
    let mut missing = None;
    let rendered = PLACEHOLDER.replace_all(text, |caps: &Captures<'_>| {
        let raw = &caps[0];
        let name = caps[1].trim();
        if name.is_empty() {
            return raw.to_string();
        }
        match variables.get(name) {
            Some(value) => value_to_string(value),
            None => {
                missing.get_or_insert_with(|| name.to_string());
                raw.to_string()
            }
        }
    });

    match missing {
        Some(name) => Err(RenderError::MissingVariable { name }),
        None => Ok(rendered.into_owned()),
    }
}

/// Variable names referenced by `text`, deduplicated in first-seen order.
#[must_use]
pub fn extract_variables(text: &str) -> Vec<String> {
    extract_variables_from(&[text])
}

/// Like [`extract_variables`] across several texts, scanned in order.
#[must_use]
pub fn extract_variables_from(texts: &[&str]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for text in texts {
        for caps in PLACEHOLDER.captures_iter(text) {
            let name = caps[1].trim();
            if !name.is_empty() && seen.insert(name.to_string()) {
                names.push(name.to_string());
            }
        }
    }
    names
}

/// Names from `required` that `variables` does not define.
#[must_use]
pub fn missing_variables(required: &[String], variables: &Variables) -> Vec<String> {
    required.iter().filter(|name| !variables.contains_key(name.as_str())).cloned().collect()
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
