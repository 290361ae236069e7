//! Core domain types for the TicketForge corpus builder.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sentinel used in [`GroupKey`] when a ticket carries no error code, so
/// "no error code" tickets form one group instead of scattering by absence.
pub const NO_ERROR_CODE: &str = "NONE";

// ---------------------------------------------------------------------------
// Priority matrix
// ---------------------------------------------------------------------------

/// Impact × urgency → priority level, both axes ordinal 1–3 (1 = high).
///
/// Row = impact, column = urgency. Values are the ITIL-style priority
/// levels 1 (Critical) through 5 (Planning).
const PRIORITY_MATRIX: [[u8; 3]; 3] = [
    [1, 2, 3], //
    [2, 3, 4],
    [3, 4, 5],
];

/// Coerce a raw impact/urgency value into the 1..=3 range.
///
/// Missing or out-of-range inputs fall back to 3 (the "Low" ordinal).
pub fn coerced_level(raw: Option<i64>) -> u8 {
    match raw {
        Some(v @ 1..=3) => v as u8,
        _ => 3,
    }
}

/// Resolve a coerced (impact, urgency) pair through the priority matrix.
pub fn priority_level(impact: u8, urgency: u8) -> u8 {
    let i = coerced_level(Some(i64::from(impact))) as usize - 1;
    let u = coerced_level(Some(i64::from(urgency))) as usize - 1;
    PRIORITY_MATRIX[i][u]
}

/// Human-readable label for a priority level.
pub fn priority_label(level: u8) -> &'static str {
    match level {
        1 => "Critical",
        2 => "High",
        3 => "Moderate",
        4 => "Low",
        _ => "Planning",
    }
}

// ---------------------------------------------------------------------------
// TicketRecord
// ---------------------------------------------------------------------------

/// One synthetic incident ticket.
///
/// Field order matches the CSV column order of the ticket table; the
/// annotated ticket table shares the schema with `kb_article_id` filled in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketRecord {
    /// Unique ticket identifier (server-generated UUID when the model omits one).
    pub ticket_id: String,
    pub title: String,
    pub description: String,
    /// Creation timestamp, RFC 3339 UTC at second precision.
    pub created_at: String,
    /// Impact ordinal 1–3 (1 = high).
    pub impact: u8,
    /// Urgency ordinal 1–3 (1 = high).
    pub urgency: u8,
    /// Priority level 1–5, always recomputed through the matrix.
    pub priority_level: u8,
    /// Priority label matching `priority_level`.
    pub priority: String,
    pub status: String,
    pub category: String,
    pub service: String,
    pub category_path: String,
    pub ci_id: String,
    pub os: String,
    pub hostname: String,
    pub reporter: String,
    pub assigned_group: String,
    pub assignee: String,
    pub site: String,
    pub conversation_history: String,
    pub comments_count: u32,
    pub error_code: String,
    /// Reference to the KB article that resolves this ticket. Empty until
    /// consolidation attaches it.
    pub kb_article_id: String,
    /// One-sentence resolution produced at generation time.
    pub resolution_note: String,
    pub issue_type: String,
    pub ticket_fulltext: String,
}

// ---------------------------------------------------------------------------
// GroupKey
// ---------------------------------------------------------------------------

/// Derived grouping key: tickets sharing the same observable
/// category/service/issue_type/error_code belong to the same problem cluster.
///
/// The `Ord` derive makes `BTreeMap<GroupKey, _>` iteration deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub category: String,
    pub service: String,
    pub issue_type: String,
    /// Error code or [`NO_ERROR_CODE`] when the ticket has none.
    pub error_code: String,
}

impl GroupKey {
    /// Derive the key for a ticket. Missing parts become empty strings;
    /// an empty error code maps to the [`NO_ERROR_CODE`] sentinel.
    pub fn for_ticket(ticket: &TicketRecord) -> Self {
        let error_code = ticket.error_code.trim();
        Self {
            category: ticket.category.trim().to_string(),
            service: ticket.service.trim().to_string(),
            issue_type: ticket.issue_type.trim().to_string(),
            error_code: if error_code.is_empty() {
                NO_ERROR_CODE.to_string()
            } else {
                error_code.to_string()
            },
        }
    }

    /// The error code for prompting: empty when the sentinel is set.
    pub fn prompt_error_code(&self) -> &str {
        if self.error_code == NO_ERROR_CODE {
            ""
        } else {
            &self.error_code
        }
    }
}

impl std::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}",
            self.category, self.service, self.issue_type, self.error_code
        )
    }
}

// ---------------------------------------------------------------------------
// KbArticle
// ---------------------------------------------------------------------------

/// One consolidated knowledge-base article, created exactly once per group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KbArticle {
    pub kb_id: String,
    pub title: String,
    pub category: String,
    pub service: String,
    pub issue_type: String,
    pub error_codes: Vec<String>,
    pub environment: String,
    pub problem: String,
    pub symptoms: Vec<String>,
    pub root_causes: Vec<String>,
    pub resolution_steps: Vec<String>,
    pub validation: String,
    /// Ticket ids resolved by this article. The consolidator clamps these
    /// to the ids of the group that produced it.
    pub related_ticket_ids: Vec<String>,
    pub kb_fulltext: String,
}

impl KbArticle {
    /// Build an article from the model's JSON object, tolerating the
    /// inconsistent shapes models produce for the list fields.
    ///
    /// Does not assign a fallback id or clamp `related_ticket_ids`; the
    /// consolidator owns both steps.
    pub fn from_model_json(data: &Value) -> Self {
        let mut article = Self {
            kb_id: string_field(data, "kb_id"),
            title: string_field(data, "title"),
            category: string_field(data, "category"),
            service: string_field(data, "service"),
            issue_type: string_field(data, "issue_type"),
            error_codes: normalize_string_list(data.get("error_codes")),
            environment: join_free_text(data.get("environment")),
            problem: string_field(data, "problem"),
            symptoms: normalize_string_list(data.get("symptoms")),
            root_causes: normalize_string_list(data.get("root_cause")),
            resolution_steps: normalize_string_list(data.get("resolution_steps")),
            validation: string_field(data, "validation"),
            related_ticket_ids: normalize_string_list(data.get("related_ticket_ids")),
            kb_fulltext: string_field(data, "kb_fulltext"),
        };

        if article.kb_fulltext.is_empty() {
            article.kb_fulltext = article.build_fulltext();
        }

        article
    }

    /// Assemble the full-text rendering from the structured fields.
    ///
    /// Fixed section order: identifier, title, category/service, issue
    /// type, error codes, problem, symptoms, root cause, resolution steps,
    /// validation. Empty sections are omitted; sections join by newlines.
    pub fn build_fulltext(&self) -> String {
        let mut parts: Vec<String> = Vec::new();

        if !self.kb_id.is_empty() {
            parts.push(format!("KB-ID: {}", self.kb_id));
        }
        if !self.title.is_empty() {
            parts.push(format!("Title: {}", self.title));
        }
        if !self.category.is_empty() || !self.service.is_empty() {
            parts.push(format!("Category/Service: {} / {}", self.category, self.service));
        }
        if !self.issue_type.is_empty() {
            parts.push(format!("Issue type: {}", self.issue_type));
        }
        if !self.error_codes.is_empty() {
            parts.push(format!("Error codes: {}", self.error_codes.join(", ")));
        }
        if !self.problem.is_empty() {
            parts.push(format!("Problem: {}", self.problem));
        }
        if !self.symptoms.is_empty() {
            parts.push(format!("Symptoms: {}", self.symptoms.join(" | ")));
        }
        if !self.root_causes.is_empty() {
            parts.push(format!("Root cause: {}", self.root_causes.join(" | ")));
        }
        if !self.resolution_steps.is_empty() {
            parts.push(format!("Resolution steps: {}", self.resolution_steps.join(" | ")));
        }
        if !self.validation.is_empty() {
            parts.push(format!("Validation: {}", self.validation));
        }

        parts.join("\n")
    }
}

/// Read a string field, treating anything non-string as absent.
fn string_field(data: &Value, key: &str) -> String {
    data.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Flatten an arbitrary JSON value into free text (environment is sometimes
/// returned as an object instead of a string).
fn join_free_text(value: Option<&Value>) -> String {
    let items = normalize_string_list(value);
    items.join(", ")
}

/// Normalize an arbitrary JSON value into a list of meaningful strings.
///
/// Strings pass through, objects flatten to `k=v` pairs, lists recurse,
/// blanks are dropped. Models routinely return objects where the prompt
/// asked for plain strings.
fn normalize_string_list(value: Option<&Value>) -> Vec<String> {
    let Some(value) = value else {
        return Vec::new();
    };

    match value {
        Value::Null => Vec::new(),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                Vec::new()
            } else {
                vec![s.to_string()]
            }
        }
        Value::Object(map) => {
            if map.is_empty() {
                return Vec::new();
            }
            let joined = map
                .iter()
                .map(|(k, v)| format!("{k}={}", scalar_to_string(v)))
                .collect::<Vec<_>>()
                .join(", ");
            let joined = joined.trim().to_string();
            if joined.is_empty() {
                Vec::new()
            } else {
                vec![joined]
            }
        }
        Value::Array(items) => items
            .iter()
            .flat_map(|item| normalize_string_list(Some(item)))
            .collect(),
        other => {
            let s = scalar_to_string(other);
            if s.trim().is_empty() {
                Vec::new()
            } else {
                vec![s]
            }
        }
    }
}

/// Render a scalar JSON value without quoting strings.
fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn priority_matrix_resolves_all_cells() {
        assert_eq!(priority_level(1, 1), 1);
        assert_eq!(priority_level(1, 2), 2);
        assert_eq!(priority_level(1, 3), 3);
        assert_eq!(priority_level(2, 1), 2);
        assert_eq!(priority_level(2, 2), 3);
        assert_eq!(priority_level(2, 3), 4);
        assert_eq!(priority_level(3, 1), 3);
        assert_eq!(priority_level(3, 2), 4);
        assert_eq!(priority_level(3, 3), 5);
    }

    #[test]
    fn out_of_range_levels_coerce_to_low() {
        assert_eq!(coerced_level(None), 3);
        assert_eq!(coerced_level(Some(0)), 3);
        assert_eq!(coerced_level(Some(7)), 3);
        assert_eq!(coerced_level(Some(-2)), 3);
        assert_eq!(coerced_level(Some(2)), 2);
        // Out-of-range inputs land on the lowest-severity corner.
        assert_eq!(priority_level(0, 99), 5);
    }

    #[test]
    fn priority_labels() {
        assert_eq!(priority_label(1), "Critical");
        assert_eq!(priority_label(3), "Moderate");
        assert_eq!(priority_label(5), "Planning");
    }

    #[test]
    fn group_key_uses_none_sentinel() {
        let ticket = TicketRecord {
            category: "Network".into(),
            service: "VPN".into(),
            issue_type: "Timeout".into(),
            error_code: "".into(),
            ..Default::default()
        };
        let key = GroupKey::for_ticket(&ticket);
        assert_eq!(key.error_code, NO_ERROR_CODE);
        assert_eq!(key.to_string(), "Network|VPN|Timeout|NONE");
        assert_eq!(key.prompt_error_code(), "");
    }

    #[test]
    fn group_key_trims_fields() {
        let ticket = TicketRecord {
            category: " Network ".into(),
            service: "VPN".into(),
            issue_type: "".into(),
            error_code: " 503 ".into(),
            ..Default::default()
        };
        let key = GroupKey::for_ticket(&ticket);
        assert_eq!(key.category, "Network");
        assert_eq!(key.issue_type, "");
        assert_eq!(key.error_code, "503");
        assert_eq!(key.prompt_error_code(), "503");
    }

    #[test]
    fn same_observable_fields_same_key() {
        let a = TicketRecord {
            category: "Access".into(),
            service: "SSO".into(),
            issue_type: "AuthenticationError".into(),
            error_code: "0x80070005".into(),
            title: "first".into(),
            ..Default::default()
        };
        let b = TicketRecord {
            title: "second".into(),
            ..a.clone()
        };
        assert_eq!(GroupKey::for_ticket(&a), GroupKey::for_ticket(&b));
    }

    #[test]
    fn article_from_model_json_normalizes_lists() {
        let data = json!({
            "kb_id": "KB-1234ABCD",
            "title": "VPN tunnel drops",
            "category": "Network",
            "service": "VPN",
            "issue_type": "ConnectivityIssue",
            "error_codes": "ERR_SSL_VERSION",
            "environment": {"os": "Windows 11", "client": "AnyConnect"},
            "problem": "Tunnel drops after rekey.",
            "symptoms": [{"first": "disconnects"}, "login loop", ""],
            "root_cause": ["stale session", null],
            "resolution_steps": [["restart service", "update client"]],
            "validation": "Tunnel stays up for 24h.",
            "related_ticket_ids": ["T-1", "T-2"]
        });

        let article = KbArticle::from_model_json(&data);
        assert_eq!(article.error_codes, vec!["ERR_SSL_VERSION"]);
        assert_eq!(article.symptoms, vec!["first=disconnects", "login loop"]);
        assert_eq!(article.root_causes, vec!["stale session"]);
        assert_eq!(article.resolution_steps, vec!["restart service", "update client"]);
        assert!(article.environment.contains("os=Windows 11"));
        assert_eq!(article.related_ticket_ids, vec!["T-1", "T-2"]);
    }

    #[test]
    fn article_fulltext_built_when_missing() {
        let data = json!({
            "kb_id": "KB-00000001",
            "title": "Printer offline",
            "category": "Hardware",
            "service": "Printer",
            "problem": "Spooler hangs.",
            "resolution_steps": ["Restart spooler"],
        });

        let article = KbArticle::from_model_json(&data);
        let lines: Vec<&str> = article.kb_fulltext.lines().collect();
        assert_eq!(lines[0], "KB-ID: KB-00000001");
        assert_eq!(lines[1], "Title: Printer offline");
        assert_eq!(lines[2], "Category/Service: Hardware / Printer");
        assert_eq!(lines[3], "Problem: Spooler hangs.");
        assert_eq!(lines[4], "Resolution steps: Restart spooler");
        // Empty sections (issue type, error codes, symptoms, ...) are omitted.
        assert!(!article.kb_fulltext.contains("Issue type:"));
        assert!(!article.kb_fulltext.contains("Symptoms:"));
    }

    #[test]
    fn article_fulltext_from_model_kept() {
        let data = json!({
            "kb_id": "KB-1",
            "kb_fulltext": "model-provided text",
        });
        let article = KbArticle::from_model_json(&data);
        assert_eq!(article.kb_fulltext, "model-provided text");
    }

}
