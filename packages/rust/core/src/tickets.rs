//! Batch ticket generation: N sequential model calls, each producing a
//! bounded batch of ticket records appended incrementally to the ticket
//! table.
//!
//! Recovery policy: a transport/HTTP failure aborts the whole run (already
//! written rows are preserved); an extraction failure only skips the
//! current batch; shape mismatches are tolerated through field defaulting.

use chrono::Utc;
use rand::Rng;
use rand::seq::SliceRandom;
use serde_json::{Value, json};
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use ticketforge_extract::{HeuristicRecovery, extract_array};
use ticketforge_ollama::{GenerationOptions, TextGeneration};
use ticketforge_shared::{Result, TicketForgeError, TicketRecord, coerced_level, priority_label, priority_level};
use ticketforge_storage::TicketTable;

use crate::ProgressReporter;
use crate::catalog::{self, UserSeed};
use crate::metrics::{MetricsLedger, RunSummary};

/// System instruction for every ticket-generation call.
const SYSTEM_PROMPT: &str =
    "You are an assistant that produces structured IT incident tickets in JSON format.";

// ---------------------------------------------------------------------------
// Config & report
// ---------------------------------------------------------------------------

/// Runtime configuration for one generation run.
#[derive(Debug, Clone)]
pub struct TicketGenConfig {
    /// Model name sent with every request.
    pub model: String,
    /// Total number of tickets this run should produce.
    pub total_tickets: u32,
    /// Tickets requested per model call.
    pub tickets_per_call: u32,
    /// Sampling options forwarded to the endpoint.
    pub options: GenerationOptions,
}

/// Outcome of a generation run.
#[derive(Debug)]
pub struct GenerationReport {
    /// Tickets the run was asked to produce.
    pub requested: u32,
    /// Tickets actually written to the table.
    pub generated: usize,
    /// Batches that ran to completion (including extraction failures).
    pub batches_completed: usize,
    /// Batches the plan called for.
    pub batches_total: usize,
    /// True when a call failure terminated the run early.
    pub aborted: bool,
    /// Metrics summary for the run.
    pub metrics: Option<RunSummary>,
}

/// The per-call request sizes for a run: `ceil(total/per_call)` entries,
/// each `min(per_call, remaining)`, summing to `total`.
pub fn batch_plan(total: u32, per_call: u32) -> Vec<usize> {
    assert!(per_call > 0, "per_call must be positive");
    let mut plan = Vec::with_capacity(total.div_ceil(per_call) as usize);
    let mut remaining = total;
    while remaining > 0 {
        let size = remaining.min(per_call);
        plan.push(size as usize);
        remaining -= size;
    }
    plan
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// Drives sequential batched ticket generation against a text-generation
/// client.
pub struct TicketGenerator<'a, G> {
    client: &'a G,
    config: TicketGenConfig,
}

impl<'a, G: TextGeneration> TicketGenerator<'a, G> {
    /// Create a generator; `tickets_per_call` must be positive.
    pub fn new(client: &'a G, config: TicketGenConfig) -> Result<Self> {
        if config.tickets_per_call == 0 {
            return Err(TicketForgeError::validation(
                "tickets_per_call must be greater than zero",
            ));
        }
        Ok(Self { client, config })
    }

    /// Generate all tickets, appending each batch to `table` as it lands.
    #[instrument(skip_all, fields(model = %self.config.model, total = self.config.total_tickets))]
    pub async fn run(
        &self,
        table: &mut TicketTable,
        ledger: &mut MetricsLedger,
        rng: &mut impl Rng,
        progress: &dyn ProgressReporter,
    ) -> Result<GenerationReport> {
        let plan = batch_plan(self.config.total_tickets, self.config.tickets_per_call);

        ledger.start_run(
            &self.config.model,
            self.config.total_tickets,
            self.config.tickets_per_call,
            &self.config.options,
        );

        progress.phase("Generating tickets");

        let mut generated = 0usize;
        let mut batches_completed = 0usize;
        let mut aborted = false;

        for (index, &batch_size) in plan.iter().enumerate() {
            let context = BatchContext::pick(rng, batch_size);
            let prompt = build_batch_prompt(batch_size, &context);
            debug!(batch = index + 1, batch_size, prompt_len = prompt.len(), "built batch prompt");

            let generation = match self
                .client
                .generate(&prompt, Some(SYSTEM_PROMPT), &self.config.options)
                .await
            {
                Ok(generation) => generation,
                Err(e) => {
                    // Sole recovery boundary: keep everything written so far,
                    // stop issuing further batches.
                    error!(
                        batch = index + 1,
                        batches = plan.len(),
                        error = %e,
                        "generation call failed, terminating run early"
                    );
                    aborted = true;
                    break;
                }
            };

            ledger.log_call(
                batch_size,
                generation.duration,
                generation.eval_tokens,
                generation.prompt_tokens,
            );

            let items = match extract_array(&HeuristicRecovery, &generation.text) {
                Ok(items) => items,
                Err(e) => {
                    warn!(batch = index + 1, error = %e, "no ticket batch recovered from response");
                    Vec::new()
                }
            };

            if items.len() != batch_size {
                warn!(
                    batch = index + 1,
                    requested = batch_size,
                    returned = items.len(),
                    "batch size mismatch, accepting what was returned"
                );
            }

            let created_at = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
            for (position, item) in items.iter().enumerate() {
                if !item.is_object() {
                    warn!(batch = index + 1, position, "batch element is not an object, skipping");
                    continue;
                }
                let (ticket, defaulted) = coerce_ticket(item, &created_at);
                if !defaulted.is_empty() {
                    debug!(ticket_id = %ticket.ticket_id, ?defaulted, "defaulted missing ticket fields");
                }
                table.append(&ticket)?;
                generated += 1;
            }
            table.flush()?;

            batches_completed += 1;
            progress.batch_completed(batches_completed, plan.len(), generated);
        }

        let metrics = ledger.end_run();

        Ok(GenerationReport {
            requested: self.config.total_tickets,
            generated,
            batches_completed,
            batches_total: plan.len(),
            aborted,
            metrics,
        })
    }
}

// ---------------------------------------------------------------------------
// Batch context & prompt
// ---------------------------------------------------------------------------

/// Fixed context one batch is generated under.
struct BatchContext {
    os: &'static str,
    category: &'static str,
    service: &'static str,
    assignee: &'static str,
    assigned_group: &'static str,
    reporters: Vec<&'static UserSeed>,
}

impl BatchContext {
    /// Pick a random OS and (category, service) pair, resolve the assignee
    /// routing, and sample `batch_size` distinct reporter identities.
    fn pick(rng: &mut impl Rng, batch_size: usize) -> Self {
        let os = *catalog::OSES.choose(rng).unwrap_or(&catalog::OSES[0]);
        let (category, service) = *catalog::CATEGORY_SERVICES
            .choose(rng)
            .unwrap_or(&catalog::CATEGORY_SERVICES[0]);
        let assignee = catalog::assignee_for(category, service);
        let assigned_group = catalog::group_for(assignee);
        let reporters: Vec<&'static UserSeed> = catalog::USER_DIRECTORY
            .choose_multiple(rng, batch_size)
            .collect();

        Self {
            os,
            category,
            service,
            assignee,
            assigned_group,
            reporters,
        }
    }
}

/// Build the prompt for exactly `batch_size` tickets.
fn build_batch_prompt(batch_size: usize, context: &BatchContext) -> String {
    let count_phrase = if batch_size == 1 {
        "EXACTLY 1 realistic IT incident ticket as a JSON array with EXACTLY ONE object".to_string()
    } else {
        format!("EXACTLY {batch_size} realistic IT incident tickets as a JSON array")
    };

    let variance = if batch_size == 1 {
        "Vary the reporter's technical skill level (novice, average, power user).".to_string()
    } else {
        format!(
            "Variance requirements (IMPORTANT):\n\
             - All {batch_size} tickets must clearly differ from each other.\n\
             - Vary situation, cause, symptoms, tone, user skill level and wording.\n\
             - All titles must differ in wording AND structure.\n\
             - Descriptions must describe different situations (error codes, symptoms, user actions).\n\
             - resolution_note MUST differ in substance per ticket (different cause, different fix).\n\
             - error_code must NOT be identical across all tickets.\n\
             - Avoid generic phrasing such as \"an update for the tool is required\".\n\
             - No identical sentences between tickets."
        )
    };

    // Compact reporter list: r = reporter, h = hostname, s = site.
    let reporter_list: Vec<Value> = context
        .reporters
        .iter()
        .map(|u| json!({"r": u.reporter, "h": u.hostname, "s": u.site}))
        .collect();
    let reporters_json = serde_json::to_string(&reporter_list).unwrap_or_default();

    let issue_types = catalog::ISSUE_TYPES.join("\", \"");
    let error_codes = catalog::ERROR_CODES.join("\", \"");

    format!(
        r#"You produce realistic IT incident tickets for an ITSM system.

Produce {count_phrase}. No explanations, no text outside the JSON array.
The answer MUST begin with "[" and end with "]".

Fixed values for EVERY ticket:
- category: "{category}"
- service: "{service}"
- os: "{os}"
- impact: one of ["1", "2", "3"] (1 = high) -> only the number
- urgency: one of ["1", "2", "3"] (1 = high) -> only the number
- status: always "Resolved"
- assignee: "{assignee}"
- assigned_group: "{assigned_group}"

Use EXACTLY ONE element of the following list per ticket and assign the
fields accordingly: reporter = "r", hostname = "h", site = "s". Every
choice MUST come from this list; elements may be reused:
{reporters_json}

Content / style:
- title: 3-6 words, distinct per ticket
- description: 1-2 short realistic sentences, at most ~20 words each
- conversation_history: always "" (leave empty)
- ticket_fulltext: always "" (leave empty)
- comments_count: always "" (leave empty)
- resolution_note: EXACTLY 1 short sentence (max 20 words) naming the
  concrete fix, e.g. configuration changes, registry edits, service
  restarts, patch numbers, permissions
- issue_type: one of ["{issue_types}"]
- error_code: one of ["{error_codes}"]

{variance}

Output format:
Return ONLY a JSON array, without a ```-code block, without commentary.
Use EXACTLY these keys per ticket object:

"title", "description", "impact", "urgency", "status", "category",
"service", "category_path", "ci_id", "os", "hostname", "reporter",
"assigned_group", "assignee", "site", "conversation_history",
"comments_count", "error_code", "resolution_note", "issue_type",
"ticket_fulltext""#,
        category = context.category,
        service = context.service,
        os = context.os,
        assignee = context.assignee,
        assigned_group = context.assigned_group,
    )
}

// ---------------------------------------------------------------------------
// Field coercion
// ---------------------------------------------------------------------------

/// Coerce one JSON object into a [`TicketRecord`], returning the names of
/// the fields that fell back to a default. Absent fields never error:
/// strings become empty, counts become zero, and the priority pair is
/// always recomputed through the matrix.
pub fn coerce_ticket(item: &Value, created_at_default: &str) -> (TicketRecord, Vec<&'static str>) {
    let mut defaulted: Vec<&'static str> = Vec::new();

    let ticket_id = match non_empty_str(item, "ticket_id") {
        Some(id) => id.to_string(),
        None => {
            defaulted.push("ticket_id");
            Uuid::new_v4().to_string()
        }
    };

    let created_at = match non_empty_str(item, "created_at") {
        Some(ts) => ts.to_string(),
        None => {
            defaulted.push("created_at");
            created_at_default.to_string()
        }
    };

    let impact = level_field(item, "impact", &mut defaulted);
    let urgency = level_field(item, "urgency", &mut defaulted);
    let level = priority_level(impact, urgency);

    let status = match non_empty_str(item, "status") {
        Some(s) => s.to_string(),
        None => {
            defaulted.push("status");
            "New".to_string()
        }
    };

    let ticket = TicketRecord {
        ticket_id,
        title: text_field(item, "title", &mut defaulted),
        description: text_field(item, "description", &mut defaulted),
        created_at,
        impact,
        urgency,
        priority_level: level,
        priority: priority_label(level).to_string(),
        status,
        category: text_field(item, "category", &mut defaulted),
        service: text_field(item, "service", &mut defaulted),
        category_path: text_field(item, "category_path", &mut defaulted),
        ci_id: text_field(item, "ci_id", &mut defaulted),
        os: text_field(item, "os", &mut defaulted),
        hostname: text_field(item, "hostname", &mut defaulted),
        reporter: text_field(item, "reporter", &mut defaulted),
        assigned_group: text_field(item, "assigned_group", &mut defaulted),
        assignee: text_field(item, "assignee", &mut defaulted),
        site: text_field(item, "site", &mut defaulted),
        conversation_history: text_field(item, "conversation_history", &mut defaulted),
        comments_count: count_field(item, "comments_count"),
        error_code: text_field(item, "error_code", &mut defaulted),
        kb_article_id: String::new(),
        resolution_note: text_field(item, "resolution_note", &mut defaulted),
        issue_type: text_field(item, "issue_type", &mut defaulted),
        ticket_fulltext: text_field(item, "ticket_fulltext", &mut defaulted),
    };

    (ticket, defaulted)
}

/// String field; absent or non-string values default to `""` and are
/// recorded as defaulted.
fn text_field(item: &Value, key: &'static str, defaulted: &mut Vec<&'static str>) -> String {
    match item.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => {
            defaulted.push(key);
            String::new()
        }
        Some(other) => {
            // Numbers and booleans are still usable as text.
            match other {
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => {
                    defaulted.push(key);
                    String::new()
                }
            }
        }
    }
}

/// Non-empty string value of `key`, if any.
fn non_empty_str<'v>(item: &'v Value, key: &str) -> Option<&'v str> {
    item.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Ordinal 1–3 field; anything else coerces to 3 and is recorded.
fn level_field(item: &Value, key: &'static str, defaulted: &mut Vec<&'static str>) -> u8 {
    let raw = match item.get(key) {
        Some(Value::Number(n)) => n.as_i64(),
        // "2" and "2-Medium" both parse as 2.
        Some(Value::String(s)) => leading_digits(s),
        _ => None,
    };

    if !matches!(raw, Some(1..=3)) {
        defaulted.push(key);
    }
    coerced_level(raw)
}

/// Count field; unparsable values become 0.
fn count_field(item: &Value, key: &str) -> u32 {
    match item.get(key) {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0).min(u64::from(u32::MAX)) as u32,
        Some(Value::String(s)) => leading_digits(s).and_then(|v| u32::try_from(v).ok()).unwrap_or(0),
        _ => 0,
    }
}

/// Parse the leading decimal digits of a string, if any.
fn leading_digits(s: &str) -> Option<i64> {
    let digits: String = s.trim().chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
