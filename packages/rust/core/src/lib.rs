//! TicketForge pipelines: batch ticket generation, problem-cluster grouping,
//! representative sampling, and KB consolidation, with a run-scoped metrics
//! ledger observing every model call.

pub mod catalog;
pub mod consolidate;
pub mod grouping;
pub mod metrics;
pub mod sampling;
pub mod tickets;

pub use consolidate::{ConsolidateConfig, ConsolidationReport, KbConsolidator};
pub use grouping::group_by_key;
pub use metrics::{MetricsLedger, RunSummary};
pub use sampling::representative_subset;
pub use tickets::{GenerationReport, TicketGenConfig, TicketGenerator, batch_plan};

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each generation batch lands in the ticket table.
    fn batch_completed(&self, current: usize, total: usize, generated: usize);
    /// Called after each group is consolidated (or skipped).
    fn group_consolidated(&self, current: usize, total: usize, key: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn batch_completed(&self, _current: usize, _total: usize, _generated: usize) {}
    fn group_consolidated(&self, _current: usize, _total: usize, _key: &str) {}
}
