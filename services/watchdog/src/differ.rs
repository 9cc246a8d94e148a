//! Snapshot differ: status transitions and change summaries

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::alert::NoopPhrases;
use crate::model::Snapshot;
use crate::summarizer::Summarizer;

pub const FIRST_SNAPSHOT_SUMMARY: &str = "First snapshot – no previous version.";
pub const NO_SIGNIFICANT_CHANGES: &str = "No significant changes.";
pub const NO_CHANGES: &str = "No changes.";

const MAX_LISTED_CHANGES: usize = 10;
const MAX_VALUE_CHARS: usize = 40;

/// Result of comparing a fresh response with the prior snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOutcome {
    pub change_summary: String,
    pub status_transition: Option<String>,
}

/// `"{old}→{new}"` when the codes differ
pub fn status_transition(old: u16, new: u16) -> Option<String> {
    (old != new).then(|| format!("{}→{}", old, new))
}

/// Compares responses against the immediately prior snapshot
pub struct Differ {
    summarizer: Arc<dyn Summarizer>,
    numeric_drift_tolerance: f64,
    phrases: NoopPhrases,
}

impl std::fmt::Debug for Differ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Differ")
            .field("summarizer", &self.summarizer.name())
            .field("numeric_drift_tolerance", &self.numeric_drift_tolerance)
            .finish()
    }
}

impl Differ {
    pub fn new(
        summarizer: Arc<dyn Summarizer>,
        numeric_drift_tolerance: f64,
        phrases: NoopPhrases,
    ) -> Self {
        Self {
            summarizer,
            numeric_drift_tolerance,
            phrases,
        }
    }

    pub async fn diff(
        &self,
        new_body: &str,
        new_status: u16,
        prior: Option<&Snapshot>,
    ) -> DiffOutcome {
        let Some(prior) = prior else {
            return DiffOutcome {
                change_summary: FIRST_SNAPSHOT_SUMMARY.to_string(),
                status_transition: None,
            };
        };

        let body_summary = self.body_summary(&prior.response_body, new_body).await;
        let transition = status_transition(prior.status_code, new_status);

        let change_summary = if transition.is_some() {
            let lead = format!(
                "Status code changed from {} to {}",
                prior.status_code, new_status
            );
            if self.phrases.matches(&body_summary) {
                format!("{}; response body unchanged.", lead)
            } else {
                format!("{}. {}", lead, body_summary)
            }
        } else {
            body_summary
        };

        DiffOutcome {
            change_summary,
            status_transition: transition,
        }
    }

    async fn body_summary(&self, old: &str, new: &str) -> String {
        match self.summarizer.summarize(old, new).await {
            Ok(summary) if !summary.trim().is_empty() => summary.trim().to_string(),
            Ok(_) => {
                tracing::warn!(
                    "Summarizer '{}' returned an empty summary, using structural diff",
                    self.summarizer.name()
                );
                structural_summary(old, new, self.numeric_drift_tolerance)
            }
            Err(e) => {
                tracing::warn!(
                    "Summarizer '{}' unavailable ({}), using structural diff",
                    self.summarizer.name(),
                    e
                );
                structural_summary(old, new, self.numeric_drift_tolerance)
            }
        }
    }
}

/// Deterministic description of meaningful differences between two bodies
pub fn structural_summary(old: &str, new: &str, numeric_drift_tolerance: f64) -> String {
    match (
        serde_json::from_str::<Value>(old),
        serde_json::from_str::<Value>(new),
    ) {
        (Ok(old), Ok(new)) => {
            let mut changes = Vec::new();
            compare(&JsonPath::root(), &old, &new, numeric_drift_tolerance, &mut changes);
            describe(&changes)
        }
        _ if old == new => NO_CHANGES.to_string(),
        _ => text_summary(old, new),
    }
}

/// Quotes both bodies from the first differing character
fn text_summary(old: &str, new: &str) -> String {
    let offset = old
        .chars()
        .zip(new.chars())
        .take_while(|(a, b)| a == b)
        .count();
    let excerpt = |body: &str| render(&Value::String(body.chars().skip(offset).collect()));
    format!(
        "Response body changed at character {} ({} bytes → {} bytes): {} → {}.",
        offset,
        old.len(),
        new.len(),
        excerpt(old),
        excerpt(new)
    )
}

#[derive(Debug, Clone)]
struct JsonPath(String);

impl JsonPath {
    fn root() -> Self {
        JsonPath(String::new())
    }

    fn key(&self, key: &str) -> Self {
        if self.0.is_empty() {
            JsonPath(key.to_string())
        } else {
            JsonPath(format!("{}.{}", self.0, key))
        }
    }

    fn index(&self, index: usize) -> Self {
        JsonPath(format!("{}[{}]", self.0, index))
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "`(root)`")
        } else {
            write!(f, "`{}`", self.0)
        }
    }
}

#[derive(Debug)]
enum Change {
    Added { path: JsonPath, kind: &'static str },
    Removed { path: JsonPath },
    TypeChanged { path: JsonPath, from: &'static str, to: &'static str },
    LengthChanged { path: JsonPath, from: usize, to: usize },
    ValueChanged { path: JsonPath, from: String, to: String },
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Added { path, kind } => write!(f, "Added key {} ({}).", path, kind),
            Change::Removed { path } => write!(f, "Removed key {}.", path),
            Change::TypeChanged { path, from, to } => {
                write!(f, "Type of {} changed from {} to {}.", path, from, to)
            }
            Change::LengthChanged { path, from, to } => write!(
                f,
                "Array {} length changed from {} to {}.",
                path, from, to
            ),
            Change::ValueChanged { path, from, to } => {
                write!(f, "Changed value of {}: {} → {}.", path, from, to)
            }
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn render(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() > MAX_VALUE_CHARS {
        let truncated: String = text.chars().take(MAX_VALUE_CHARS).collect();
        format!("{}…", truncated)
    } else {
        text
    }
}

/// Relative change beyond the tolerance
fn is_major_numeric_change(old: f64, new: f64, tolerance: f64) -> bool {
    let scale = old.abs().max(new.abs());
    if scale == 0.0 {
        return false;
    }
    (old - new).abs() / scale > tolerance
}

fn compare(
    path: &JsonPath,
    old: &Value,
    new: &Value,
    tolerance: f64,
    changes: &mut Vec<Change>,
) {
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            for (key, old_value) in old_map {
                match new_map.get(key) {
                    Some(new_value) => {
                        compare(&path.key(key), old_value, new_value, tolerance, changes)
                    }
                    None => changes.push(Change::Removed {
                        path: path.key(key),
                    }),
                }
            }
            for (key, new_value) in new_map {
                if !old_map.contains_key(key) {
                    changes.push(Change::Added {
                        path: path.key(key),
                        kind: kind(new_value),
                    });
                }
            }
        }
        (Value::Array(old_items), Value::Array(new_items)) => {
            if old_items.len() != new_items.len() {
                changes.push(Change::LengthChanged {
                    path: path.clone(),
                    from: old_items.len(),
                    to: new_items.len(),
                });
            }
            for (i, (old_item, new_item)) in old_items.iter().zip(new_items).enumerate() {
                compare(&path.index(i), old_item, new_item, tolerance, changes);
            }
        }
        (Value::Number(a), Value::Number(b)) => {
            let (a_f, b_f) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            if is_major_numeric_change(a_f, b_f, tolerance) {
                changes.push(Change::ValueChanged {
                    path: path.clone(),
                    from: render(old),
                    to: render(new),
                });
            }
        }
        (Value::Null, Value::Null) => {}
        (Value::Bool(_), Value::Bool(_)) | (Value::String(_), Value::String(_)) => {
            if old != new {
                changes.push(Change::ValueChanged {
                    path: path.clone(),
                    from: render(old),
                    to: render(new),
                });
            }
        }
        _ => changes.push(Change::TypeChanged {
            path: path.clone(),
            from: kind(old),
            to: kind(new),
        }),
    }
}

fn describe(changes: &[Change]) -> String {
    if changes.is_empty() {
        return NO_SIGNIFICANT_CHANGES.to_string();
    }
    let mut lines: Vec<String> = changes
        .iter()
        .take(MAX_LISTED_CHANGES)
        .map(|c| c.to_string())
        .collect();
    if changes.len() > MAX_LISTED_CHANGES {
        lines.push(format!(
            "…and {} more change(s).",
            changes.len() - MAX_LISTED_CHANGES
        ));
    }
    lines.join(" ")
}
