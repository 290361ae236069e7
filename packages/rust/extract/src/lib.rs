//! Recovery of a single JSON value from free-form model output.
//!
//! Models wrap their JSON in code fences, language tags, or explanatory
//! prose despite every instruction not to. The recovery strategy lives
//! behind [`JsonRecovery`] so a stricter repair strategy can be substituted
//! without touching callers.

use serde_json::Value;
use tracing::debug;

use ticketforge_shared::{Result, TicketForgeError};

/// How many characters of raw model output to carry in error messages.
const PREVIEW_CHARS: usize = 200;

// ---------------------------------------------------------------------------
// Recovery strategy
// ---------------------------------------------------------------------------

/// Locates the substring of `raw` that should contain the JSON value.
pub trait JsonRecovery {
    /// Return the candidate JSON span, or an error when none can be found.
    fn recover<'a>(&self, raw: &'a str) -> Result<&'a str>;
}

/// Best-effort bracket-scanning recovery.
///
/// Strips a fence pair and an optional language tag, then spans from the
/// earliest `[`/`{` to the latest `]`/`}`. Not a balanced-bracket parser:
/// it assumes the output holds exactly one top-level JSON value and no
/// stray brackets in the surrounding prose.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicRecovery;

impl JsonRecovery for HeuristicRecovery {
    fn recover<'a>(&self, raw: &'a str) -> Result<&'a str> {
        let mut text = raw.trim();

        // Case 1: the answer opens with ``` or ```json
        if text.starts_with("```") {
            text = text.trim_start_matches('`');
            if let Some(rest) = strip_language_tag(text) {
                text = rest;
            }
            if let Some(end) = text.rfind("```") {
                text = &text[..end];
            }
        }

        // Case 2: carve out the outermost JSON span
        let start = ["[", "{"]
            .iter()
            .filter_map(|b| text.find(b))
            .min()
            .ok_or_else(|| {
                TicketForgeError::extraction(format!(
                    "no JSON start found in model output: {}",
                    preview(raw)
                ))
            })?;

        let end = ["]", "}"]
            .iter()
            .filter_map(|b| text.rfind(b))
            .max()
            .ok_or_else(|| {
                TicketForgeError::extraction(format!(
                    "no JSON end found in model output: {}",
                    preview(raw)
                ))
            })?;

        if end < start {
            return Err(TicketForgeError::extraction(format!(
                "JSON end precedes start in model output: {}",
                preview(raw)
            )));
        }

        Ok(text[start..=end].trim())
    }
}

/// Strip a `json`-style language tag immediately after an opening fence.
fn strip_language_tag(text: &str) -> Option<&str> {
    let text = text.trim_start();
    match text.get(..4) {
        Some(tag) if tag.eq_ignore_ascii_case("json") => Some(text[4..].trim_start()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Parsing entry points
// ---------------------------------------------------------------------------

/// Recover and parse a single JSON value from raw model output.
///
/// Parsing failure is recoverable at the unit level: the caller decides
/// whether to skip a ticket batch or a KB group.
pub fn extract_value(strategy: &impl JsonRecovery, raw: &str) -> Result<Value> {
    let candidate = strategy.recover(raw)?;
    debug!(candidate_len = candidate.len(), "recovered JSON candidate");

    serde_json::from_str(candidate).map_err(|e| {
        TicketForgeError::extraction(format!(
            "invalid JSON after recovery: {e} (raw: {})",
            preview(raw)
        ))
    })
}

/// Like [`extract_value`], but requires a top-level array.
pub fn extract_array(strategy: &impl JsonRecovery, raw: &str) -> Result<Vec<Value>> {
    match extract_value(strategy, raw)? {
        Value::Array(items) => Ok(items),
        other => Err(TicketForgeError::extraction(format!(
            "expected a JSON array, got {}",
            json_kind(&other)
        ))),
    }
}

/// Like [`extract_value`], but requires a top-level object.
pub fn extract_object(strategy: &impl JsonRecovery, raw: &str) -> Result<Value> {
    let value = extract_value(strategy, raw)?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(TicketForgeError::extraction(format!(
            "expected a JSON object, got {}",
            json_kind(&value)
        )))
    }
}

/// Short name of a JSON value's type, for error messages.
fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Truncated preview of raw output for error messages.
fn preview(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= PREVIEW_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(PREVIEW_CHARS).collect();
    format!("{cut}…")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
