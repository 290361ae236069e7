//! KB consolidation: one model call per problem cluster, producing one
//! knowledge-base article and an annotated copy of every ticket.
//!
//! Pipeline per group: sample representatives, build the prompt, call the
//! model, recover one JSON object, clamp the article to the group, write
//! the KB row and one annotated ticket row per group member. A failed
//! group is skipped (its tickets keep an empty article reference) and
//! the run continues.

use rand::Rng;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use ticketforge_extract::{HeuristicRecovery, extract_object};
use ticketforge_ollama::{GenerationOptions, TextGeneration};
use ticketforge_shared::{GroupKey, KbArticle, Result, TicketRecord};
use ticketforge_storage::{KbTable, TicketTable};

use crate::ProgressReporter;
use crate::grouping::group_by_key;
use crate::metrics::{MetricsLedger, RunSummary};
use crate::sampling::representative_subset;

// ---------------------------------------------------------------------------
// Config & report
// ---------------------------------------------------------------------------

/// Runtime configuration for one consolidation run.
#[derive(Debug, Clone)]
pub struct ConsolidateConfig {
    /// Model name sent with every request.
    pub model: String,
    /// Cap on representative tickets embedded in one prompt.
    pub max_tickets_per_prompt: usize,
    /// Sampling options forwarded to the endpoint.
    pub options: GenerationOptions,
}

/// Outcome of a consolidation run.
#[derive(Debug)]
pub struct ConsolidationReport {
    /// Tickets loaded from the input table.
    pub tickets: usize,
    /// Problem clusters found.
    pub groups: usize,
    /// Articles written to the KB table.
    pub articles_written: usize,
    /// Groups skipped after a call or extraction failure.
    pub groups_skipped: usize,
    /// Rows written to the annotated ticket table.
    pub tickets_annotated: usize,
    /// Metrics summary for the run.
    pub metrics: Option<RunSummary>,
}

// ---------------------------------------------------------------------------
// Consolidator
// ---------------------------------------------------------------------------

/// Drives per-group KB article generation against a text-generation client.
pub struct KbConsolidator<'a, G> {
    client: &'a G,
    config: ConsolidateConfig,
}

impl<'a, G: TextGeneration> KbConsolidator<'a, G> {
    pub fn new(client: &'a G, config: ConsolidateConfig) -> Self {
        Self { client, config }
    }

    /// Consolidate `tickets` into KB articles, writing both output tables
    /// incrementally.
    #[instrument(skip_all, fields(model = %self.config.model, tickets = tickets.len()))]
    pub async fn run(
        &self,
        tickets: Vec<TicketRecord>,
        kb_table: &mut KbTable,
        annotated: &mut TicketTable,
        ledger: &mut MetricsLedger,
        rng: &mut impl Rng,
        progress: &dyn ProgressReporter,
    ) -> Result<ConsolidationReport> {
        let ticket_count = tickets.len();
        if ticket_count == 0 {
            warn!("no tickets loaded, nothing to consolidate");
            return Ok(ConsolidationReport {
                tickets: 0,
                groups: 0,
                articles_written: 0,
                groups_skipped: 0,
                tickets_annotated: 0,
                metrics: None,
            });
        }

        ledger.start_run(&self.config.model, 0, 0, &self.config.options);

        progress.phase("Grouping tickets");
        let groups = group_by_key(tickets);
        let group_count = groups.len();
        info!(tickets = ticket_count, groups = group_count, "grouped tickets into problem clusters");

        progress.phase("Consolidating groups");

        let mut articles_written = 0usize;
        let mut groups_skipped = 0usize;
        let mut tickets_annotated = 0usize;

        for (index, (key, group)) in groups.iter().enumerate() {
            debug!(group = %key, size = group.len(), "consolidating group");

            let subset = representative_subset(group, self.config.max_tickets_per_prompt, rng);
            let kb_id = fallback_kb_id();
            let prompt = build_group_prompt(&kb_id, key, &subset);

            let generation = match self
                .client
                .generate(&prompt, None, &self.config.options)
                .await
            {
                Ok(generation) => generation,
                Err(e) => {
                    warn!(group = %key, error = %e, "consolidation call failed, skipping group");
                    tickets_annotated += write_group_rows(annotated, group, "")?;
                    groups_skipped += 1;
                    progress.group_consolidated(index + 1, group_count, &key.to_string());
                    continue;
                }
            };

            ledger.log_call(
                subset.len(),
                generation.duration,
                generation.eval_tokens,
                generation.prompt_tokens,
            );

            let data = match extract_object(&HeuristicRecovery, &generation.text) {
                Ok(data) => data,
                Err(e) => {
                    warn!(group = %key, error = %e, "no KB article recovered, skipping group");
                    tickets_annotated += write_group_rows(annotated, group, "")?;
                    groups_skipped += 1;
                    progress.group_consolidated(index + 1, group_count, &key.to_string());
                    continue;
                }
            };

            let mut article = KbArticle::from_model_json(&data);
            if article.kb_id.is_empty() {
                article.kb_id = kb_id;
            }
            // The model's raw output must not reference tickets outside the group.
            article.related_ticket_ids = clamp_related_ids(article.related_ticket_ids, group);
            if article.kb_fulltext.is_empty() {
                article.kb_fulltext = article.build_fulltext();
            }

            kb_table.append(&article)?;
            kb_table.flush()?;
            articles_written += 1;

            // Every ticket in the group resolves to this article, not just
            // the representative subset.
            tickets_annotated += write_group_rows(annotated, group, &article.kb_id)?;

            debug!(group = %key, kb_id = %article.kb_id, "article written");
            progress.group_consolidated(index + 1, group_count, &key.to_string());
        }

        let metrics = ledger.end_run();

        info!(
            groups = group_count,
            articles = articles_written,
            skipped = groups_skipped,
            "consolidation finished"
        );

        Ok(ConsolidationReport {
            tickets: ticket_count,
            groups: group_count,
            articles_written,
            groups_skipped,
            tickets_annotated,
            metrics,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Server-side article id used when the model omits one.
fn fallback_kb_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("KB-{}", hex[..8].to_uppercase())
}

/// Restrict `model_ids` to ids that actually occur in the group,
/// preserving order and dropping duplicates.
fn clamp_related_ids(model_ids: Vec<String>, group: &[TicketRecord]) -> Vec<String> {
    let mut clamped = Vec::with_capacity(model_ids.len());
    for id in model_ids {
        let in_group = group.iter().any(|t| t.ticket_id == id);
        if in_group && !clamped.contains(&id) {
            clamped.push(id);
        }
    }
    clamped
}

/// Write one annotated row per group ticket carrying `kb_id` (possibly
/// empty for failed groups). Returns the number of rows written.
fn write_group_rows(
    annotated: &mut TicketTable,
    group: &[TicketRecord],
    kb_id: &str,
) -> Result<usize> {
    for ticket in group {
        let mut row = ticket.clone();
        row.kb_article_id = kb_id.to_string();
        annotated.append(&row)?;
    }
    annotated.flush()?;
    Ok(group.len())
}

/// Build the consolidation prompt for one group.
fn build_group_prompt(kb_id: &str, key: &GroupKey, subset: &[&TicketRecord]) -> String {
    // Compact representation of the representative tickets.
    let tickets_for_prompt: Vec<Value> = subset
        .iter()
        .map(|t| {
            json!({
                "id": t.ticket_id,
                "title": t.title,
                "description": t.description,
                "impact": t.impact,
                "urgency": t.urgency,
                "priority": t.priority,
                "status": t.status,
                "os": t.os,
                "site": t.site,
                "error_code": t.error_code,
                "resolution_note": t.resolution_note,
            })
        })
        .collect();
    let tickets_json =
        serde_json::to_string_pretty(&tickets_for_prompt).unwrap_or_else(|_| "[]".into());

    // The exact ids the model is permitted to reference.
    let mut related_ids: Vec<&str> = Vec::new();
    for t in subset {
        if !t.ticket_id.is_empty() && !related_ids.contains(&t.ticket_id.as_str()) {
            related_ids.push(&t.ticket_id);
        }
    }
    let related_ids_json = serde_json::to_string(&related_ids).unwrap_or_else(|_| "[]".into());

    format!(
        r#"You are an experienced ITSM knowledge-base author.

You receive several incident tickets that belong to the same technical
problem (same category, service, issue_type and, if set, error_code).

Problem class:
- category: "{category}"
- service: "{service}"
- issue_type: "{issue_type}"
- error_code: "{error_code}"

Example tickets for this problem (context only, do NOT return them):
{tickets_json}

Your task:
1. Analyze the tickets and derive ONE overarching technical problem.
2. Write a reusable knowledge article for the ITSM knowledge base.
3. Cover the general problem, typical symptoms, probable causes,
   recommended resolution steps, and how to verify the fix.

Return EXACTLY ONE JSON object with these keys:

- "kb_id": string. Preferably use the given id: "{kb_id}"
- "title": string. Concise title describing the problem.
- "category": string. Use the given category: "{category}"
- "service": string. Use the given service: "{service}"
- "issue_type": string. Use the given issue_type: "{issue_type}"
- "error_codes": list of strings. Either ["{error_code}"] if meaningful,
  or [] when no specific code matters.
- "environment": string. Short description of the affected environment
  (operating systems, application type, typical contexts).
- "problem": string. Summary of the core technical problem in 2-4 sentences.
- "symptoms": list of strings. 3-6 general symptoms (error messages,
  observed behavior). NO ticket ids, NO ticket titles, NO objects.
- "root_cause": list of strings. 1-4 probable causes as bullet points.
- "resolution_steps": list of strings. Concrete ordered steps
  (3-7 entries, 1-2 sentences each).
- "validation": string. How to verify the problem is really fixed (1-3 sentences).
- "related_ticket_ids": list of strings. ONLY ids of tickets belonging to
  this problem class. Use EXACTLY these ids: {related_ids_json}
- "kb_fulltext": do NOT set this field. It is generated later.

Format rules (VERY IMPORTANT):
- Answer with EXACTLY ONE JSON object.
- NO JSON array, NO extra nesting level.
- NO Markdown formatting, NO ```json code block.
- NO prose outside the JSON object.
- "symptoms", "root_cause" and "resolution_steps" must contain only
  plain strings. NO dictionaries/objects, NO ticket metadata.
- "related_ticket_ids" must contain ticket ids as strings only.

ANSWER:
Return ONLY the JSON object."#,
        category = key.category,
        service = key.service,
        issue_type = key.issue_type,
        error_code = key.prompt_error_code(),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SilentProgress;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::time::Duration;
    use ticketforge_ollama::Generation;
    use ticketforge_shared::TicketForgeError;
    use ticketforge_storage::read_tickets;

    struct StubGenerator {
        responses: RefCell<VecDeque<Result<String>>>,
        prompts: RefCell<Vec<String>>,
    }

    impl StubGenerator {
        fn new(responses: Vec<Result<String>>) -> Self {
            Self {
                responses: RefCell::new(responses.into()),
                prompts: RefCell::new(Vec::new()),
            }
        }
    }

    impl TextGeneration for StubGenerator {
        async fn generate(
            &self,
            prompt: &str,
            _system: Option<&str>,
            _options: &GenerationOptions,
        ) -> Result<Generation> {
            self.prompts.borrow_mut().push(prompt.to_string());
            let next = self
                .responses
                .borrow_mut()
                .pop_front()
                .expect("unexpected extra call");
            next.map(|text| Generation {
                text,
                eval_tokens: 50,
                prompt_tokens: 500,
                duration: Duration::from_secs(2),
            })
        }
    }

    fn options() -> GenerationOptions {
        GenerationOptions {
            temperature: 0.5,
            top_p: 0.9,
            num_ctx: 4096,
            repeat_penalty: 1.1,
            seed: None,
            num_predict: Some(1500),
        }
    }

    fn config(max_per_prompt: usize) -> ConsolidateConfig {
        ConsolidateConfig {
            model: "test-model".into(),
            max_tickets_per_prompt: max_per_prompt,
            options: options(),
        }
    }

    fn vpn_ticket(id: &str) -> TicketRecord {
        TicketRecord {
            ticket_id: id.into(),
            title: format!("TLS handshake fails for {id}"),
            description: "VPN client cannot complete the TLS handshake.".into(),
            impact: 2,
            urgency: 2,
            priority_level: 3,
            priority: "Moderate".into(),
            status: "Resolved".into(),
            category: "Network".into(),
            service: "VPN".into(),
            os: "Windows 11".into(),
            error_code: "TLS_HANDSHAKE_FAILED".into(),
            issue_type: "vpn_tls_handshake_failed".into(),
            resolution_note: "Renewed the gateway certificate.".into(),
            ..Default::default()
        }
    }

    fn temp_tables(name: &str) -> (KbTable, TicketTable, PathBuf, PathBuf) {
        let dir = std::env::temp_dir();
        let kb_path = dir.join(format!("tf_kb_{}_{name}.csv", Uuid::new_v4().simple()));
        let annotated_path =
            dir.join(format!("tf_annotated_{}_{name}.csv", Uuid::new_v4().simple()));
        (
            KbTable::create(&kb_path).unwrap(),
            TicketTable::create(&annotated_path).unwrap(),
            kb_path,
            annotated_path,
        )
    }

    fn article_json(related: &[&str]) -> String {
        serde_json::to_string(&json!({
            "kb_id": "KB-TEST0001",
            "title": "VPN TLS handshake failures",
            "category": "Network",
            "service": "VPN",
            "issue_type": "vpn_tls_handshake_failed",
            "error_codes": ["TLS_HANDSHAKE_FAILED"],
            "environment": "Windows clients with AnyConnect",
            "problem": "Clients fail the TLS handshake against the VPN gateway.",
            "symptoms": ["handshake timeout", "certificate warning"],
            "root_cause": ["expired gateway certificate"],
            "resolution_steps": ["Renew the certificate", "Restart the gateway"],
            "validation": "Clients connect without certificate warnings.",
            "related_ticket_ids": related,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn seven_ticket_group_yields_one_clamped_article() {
        let tickets: Vec<TicketRecord> = (1..=7).map(|i| vpn_ticket(&format!("T-{i}"))).collect();

        // The model lists two real ids, one foreign id, and a duplicate.
        let stub = StubGenerator::new(vec![Ok(article_json(&[
            "T-3", "T-9999", "T-5", "T-3",
        ]))]);
        let consolidator = KbConsolidator::new(&stub, config(4));
        let (mut kb_table, mut annotated, kb_path, annotated_path) = temp_tables("e2e");
        let mut ledger = MetricsLedger::new();
        let mut rng = StdRng::seed_from_u64(42);

        let report = consolidator
            .run(
                tickets,
                &mut kb_table,
                &mut annotated,
                &mut ledger,
                &mut rng,
                &SilentProgress,
            )
            .await
            .unwrap();

        assert_eq!(report.tickets, 7);
        assert_eq!(report.groups, 1);
        assert_eq!(report.articles_written, 1);
        assert_eq!(report.groups_skipped, 0);
        assert_eq!(report.tickets_annotated, 7);
        let metrics = report.metrics.expect("metrics summary");
        assert_eq!(metrics.num_calls, 1);

        // Article row exists and the foreign id was dropped.
        let kb_content = std::fs::read_to_string(&kb_path).unwrap();
        assert!(kb_content.contains("KB-TEST0001"));
        assert!(kb_content.contains("T-3 | T-5"));
        assert!(!kb_content.contains("T-9999"));

        // All 7 annotated rows carry the article id.
        let rows = read_tickets(&annotated_path).unwrap();
        assert_eq!(rows.len(), 7);
        assert!(rows.iter().all(|t| t.kb_article_id == "KB-TEST0001"));

        let _ = std::fs::remove_file(&kb_path);
        let _ = std::fs::remove_file(&annotated_path);
    }

    #[tokio::test]
    async fn failed_group_is_skipped_with_empty_references() {
        let mut tickets: Vec<TicketRecord> =
            (1..=3).map(|i| vpn_ticket(&format!("T-{i}"))).collect();
        let mut dns = vpn_ticket("T-9");
        dns.service = "DNS".into();
        dns.error_code = "".into();
        tickets.push(dns);

        // BTreeMap order: Network|DNS|... before Network|VPN|...; the DNS
        // group's call fails, the VPN group succeeds.
        let stub = StubGenerator::new(vec![
            Err(TicketForgeError::Network("timed out".into())),
            Ok(article_json(&["T-1", "T-2", "T-3"])),
        ]);
        let consolidator = KbConsolidator::new(&stub, config(10));
        let (mut kb_table, mut annotated, kb_path, annotated_path) = temp_tables("skip");
        let mut ledger = MetricsLedger::new();
        let mut rng = StdRng::seed_from_u64(7);

        let report = consolidator
            .run(
                tickets,
                &mut kb_table,
                &mut annotated,
                &mut ledger,
                &mut rng,
                &SilentProgress,
            )
            .await
            .unwrap();

        assert_eq!(report.groups, 2);
        assert_eq!(report.articles_written, 1);
        assert_eq!(report.groups_skipped, 1);
        assert_eq!(report.tickets_annotated, 4);

        let rows = read_tickets(&annotated_path).unwrap();
        assert_eq!(rows.len(), 4);
        let dns_row = rows.iter().find(|t| t.ticket_id == "T-9").unwrap();
        assert!(dns_row.kb_article_id.is_empty());
        let vpn_rows: Vec<_> = rows.iter().filter(|t| t.service == "VPN").collect();
        assert_eq!(vpn_rows.len(), 3);
        assert!(vpn_rows.iter().all(|t| t.kb_article_id == "KB-TEST0001"));

        let _ = std::fs::remove_file(&kb_path);
        let _ = std::fs::remove_file(&annotated_path);
    }

    #[tokio::test]
    async fn malformed_model_output_skips_group() {
        let tickets = vec![vpn_ticket("T-1"), vpn_ticket("T-2")];
        let stub = StubGenerator::new(vec![Ok("I'm sorry, I can't produce JSON today.".into())]);
        let consolidator = KbConsolidator::new(&stub, config(10));
        let (mut kb_table, mut annotated, kb_path, annotated_path) = temp_tables("malformed");
        let mut ledger = MetricsLedger::new();
        let mut rng = StdRng::seed_from_u64(11);

        let report = consolidator
            .run(
                tickets,
                &mut kb_table,
                &mut annotated,
                &mut ledger,
                &mut rng,
                &SilentProgress,
            )
            .await
            .unwrap();

        assert_eq!(report.articles_written, 0);
        assert_eq!(report.groups_skipped, 1);
        let rows = read_tickets(&annotated_path).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|t| t.kb_article_id.is_empty()));

        let _ = std::fs::remove_file(&kb_path);
        let _ = std::fs::remove_file(&annotated_path);
    }

    #[tokio::test]
    async fn missing_kb_id_gets_a_generated_one() {
        let tickets = vec![vpn_ticket("T-1")];
        let response = serde_json::to_string(&json!({
            "title": "VPN TLS handshake failures",
            "problem": "Handshake fails.",
            "related_ticket_ids": ["T-1"],
        }))
        .unwrap();
        let stub = StubGenerator::new(vec![Ok(response)]);
        let consolidator = KbConsolidator::new(&stub, config(10));
        let (mut kb_table, mut annotated, kb_path, annotated_path) = temp_tables("fallback");
        let mut ledger = MetricsLedger::new();
        let mut rng = StdRng::seed_from_u64(13);

        let report = consolidator
            .run(
                tickets,
                &mut kb_table,
                &mut annotated,
                &mut ledger,
                &mut rng,
                &SilentProgress,
            )
            .await
            .unwrap();

        assert_eq!(report.articles_written, 1);
        let rows = read_tickets(&annotated_path).unwrap();
        assert_eq!(rows.len(), 1);
        let kb_id = &rows[0].kb_article_id;
        assert!(kb_id.starts_with("KB-"), "got {kb_id}");
        assert_eq!(kb_id.len(), 11);

        let _ = std::fs::remove_file(&kb_path);
        let _ = std::fs::remove_file(&annotated_path);
    }

    #[tokio::test]
    async fn empty_input_short_circuits() {
        let stub = StubGenerator::new(vec![]);
        let consolidator = KbConsolidator::new(&stub, config(10));
        let (mut kb_table, mut annotated, kb_path, annotated_path) = temp_tables("empty");
        let mut ledger = MetricsLedger::new();
        let mut rng = StdRng::seed_from_u64(17);

        let report = consolidator
            .run(
                Vec::new(),
                &mut kb_table,
                &mut annotated,
                &mut ledger,
                &mut rng,
                &SilentProgress,
            )
            .await
            .unwrap();

        assert_eq!(report.groups, 0);
        assert!(report.metrics.is_none());

        let _ = std::fs::remove_file(&kb_path);
        let _ = std::fs::remove_file(&annotated_path);
    }

    #[test]
    fn clamp_preserves_order_and_drops_foreign_ids() {
        let group = vec![vpn_ticket("T-1"), vpn_ticket("T-2"), vpn_ticket("T-3")];
        let clamped = clamp_related_ids(
            vec![
                "T-3".into(),
                "T-404".into(),
                "T-1".into(),
                "T-3".into(),
            ],
            &group,
        );
        assert_eq!(clamped, vec!["T-3".to_string(), "T-1".to_string()]);
    }

    #[test]
    fn fallback_kb_id_shape() {
        let id = fallback_kb_id();
        assert!(id.starts_with("KB-"));
        assert_eq!(id.len(), 11);
        assert!(id[3..].chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn group_prompt_embeds_key_and_permitted_ids() {
        let tickets = vec![vpn_ticket("T-1"), vpn_ticket("T-2")];
        let group: Vec<&TicketRecord> = tickets.iter().collect();
        let key = GroupKey::for_ticket(&tickets[0]);
        let prompt = build_group_prompt("KB-ABCD1234", &key, &group);

        assert!(prompt.contains("category: \"Network\""));
        assert!(prompt.contains("service: \"VPN\""));
        assert!(prompt.contains("issue_type: \"vpn_tls_handshake_failed\""));
        assert!(prompt.contains("error_code: \"TLS_HANDSHAKE_FAILED\""));
        assert!(prompt.contains("KB-ABCD1234"));
        assert!(prompt.contains(r#"["T-1","T-2"]"#));
        assert!(prompt.contains("Renewed the gateway certificate."));
    }
}
