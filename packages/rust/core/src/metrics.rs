//! Run-scoped metrics ledger for model calls.
//!
//! One [`MetricsLedger`] covers one generation session and is passed by
//! reference into the pipelines. There is no process-global state, so
//! concurrent runs each carry their own ledger. State machine:
//! idle -> running -> idle.

use std::time::{Duration, Instant};

use tracing::{info, warn};
use uuid::Uuid;

use ticketforge_ollama::GenerationOptions;

/// Accumulated counters for one active run.
#[derive(Debug, Clone)]
struct RunMetrics {
    run_id: Uuid,
    model: String,
    target_records: u32,
    records_per_call: u32,
    started: Instant,
    num_calls: u64,
    total_eval_tokens: u64,
    total_prompt_tokens: u64,
    /// Time spent inside model calls (sum of per-call durations).
    total_call_time: Duration,
    options: GenerationOptions,
}

/// Final figures emitted by [`MetricsLedger::end_run`].
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub model: String,
    pub num_calls: u64,
    pub total_eval_tokens: u64,
    pub total_prompt_tokens: u64,
    /// Sum of per-call durations.
    pub call_time: Duration,
    /// Elapsed time from `start_run` to `end_run`.
    pub wall_time: Duration,
    pub avg_eval_tokens_per_call: f64,
    pub avg_tokens_per_second: f64,
}

/// Metrics ledger covering a single run at a time.
#[derive(Debug, Default)]
pub struct MetricsLedger {
    active: Option<RunMetrics>,
}

impl MetricsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new run, returning its id.
    ///
    /// Starting while a run is already active silently discards the
    /// previous record; runs never stack.
    pub fn start_run(
        &mut self,
        model: &str,
        target_records: u32,
        records_per_call: u32,
        options: &GenerationOptions,
    ) -> Uuid {
        let run_id = Uuid::new_v4();
        self.active = Some(RunMetrics {
            run_id,
            model: model.to_string(),
            target_records,
            records_per_call,
            started: Instant::now(),
            num_calls: 0,
            total_eval_tokens: 0,
            total_prompt_tokens: 0,
            total_call_time: Duration::ZERO,
            options: options.clone(),
        });

        info!(
            %run_id,
            model,
            target_records,
            records_per_call,
            "metrics run started"
        );
        run_id
    }

    /// Record one model call. Without an active run this is a reported
    /// no-op, not an error.
    pub fn log_call(
        &mut self,
        batch_size: usize,
        duration: Duration,
        eval_tokens: u64,
        prompt_tokens: u64,
    ) {
        let Some(run) = self.active.as_mut() else {
            warn!("log_call without an active metrics run; call start_run first");
            return;
        };

        run.num_calls += 1;
        run.total_eval_tokens += eval_tokens;
        run.total_prompt_tokens += prompt_tokens;
        run.total_call_time += duration;

        let tokens_per_second = throughput(eval_tokens, duration);
        info!(
            call = run.num_calls,
            batch_size,
            duration_s = duration.as_secs_f64(),
            eval_tokens,
            prompt_tokens,
            tokens_per_second,
            "model call recorded"
        );
    }

    /// Whether a run is currently active.
    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Finish the active run, log the summary, and return it.
    /// A no-op returning `None` when idle.
    pub fn end_run(&mut self) -> Option<RunSummary> {
        let run = self.active.take()?;

        let call_secs = run.total_call_time.as_secs_f64();
        let avg_eval_tokens_per_call = if run.num_calls > 0 {
            run.total_eval_tokens as f64 / run.num_calls as f64
        } else {
            0.0
        };
        let avg_tokens_per_second = if call_secs > 0.0 {
            run.total_eval_tokens as f64 / call_secs
        } else {
            0.0
        };

        let summary = RunSummary {
            run_id: run.run_id,
            model: run.model,
            num_calls: run.num_calls,
            total_eval_tokens: run.total_eval_tokens,
            total_prompt_tokens: run.total_prompt_tokens,
            call_time: run.total_call_time,
            wall_time: run.started.elapsed(),
            avg_eval_tokens_per_call,
            avg_tokens_per_second,
        };

        info!(
            run_id = %summary.run_id,
            model = %summary.model,
            calls = summary.num_calls,
            total_eval_tokens = summary.total_eval_tokens,
            total_prompt_tokens = summary.total_prompt_tokens,
            call_time_s = summary.call_time.as_secs_f64(),
            wall_time_s = summary.wall_time.as_secs_f64(),
            avg_eval_tokens_per_call = summary.avg_eval_tokens_per_call,
            avg_tokens_per_second = summary.avg_tokens_per_second,
            target_records = run.target_records,
            records_per_call = run.records_per_call,
            temperature = run.options.temperature,
            top_p = run.options.top_p,
            num_ctx = run.options.num_ctx,
            repeat_penalty = run.options.repeat_penalty,
            seed = ?run.options.seed,
            num_predict = ?run.options.num_predict,
            "metrics run summary"
        );

        Some(summary)
    }
}

/// Per-call throughput; zero when duration or token count is zero.
fn throughput(eval_tokens: u64, duration: Duration) -> f64 {
    let secs = duration.as_secs_f64();
    if secs > 0.0 && eval_tokens > 0 {
        eval_tokens as f64 / secs
    } else {
        0.0
    }
}
