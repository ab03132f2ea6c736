use crate::transfer::{TransferCounters, TransferOutcome};

/// Trait for reporting pipeline progress.
///
/// CLI implements with indicatif progress bars. All methods have default
/// no-op implementations. Within one pipeline call the methods are invoked
/// from a single consumer, in the order the ordering rules of each pipeline
/// describe.
pub trait ProgressReporter: Send + Sync {
    fn on_ingest_start(&self, _total_entries: usize) {}
    fn on_ingest_progress(&self, _attempted: usize, _total: usize) {}
    fn on_ingest_complete(&self, _loaded: usize, _excluded: usize, _duration_secs: f64) {}
    fn on_backup_progress(&self, _done: usize, _total: usize) {}
    fn on_update_progress(&self, _done: usize, _total: usize) {}
    fn on_edit_complete(&self, _committed: usize, _requested: usize) {}
    fn on_transfer_start(&self, _total: usize) {}
    fn on_transfer_outcome(&self, _outcome: &TransferOutcome, _counters: &TransferCounters) {}
    fn on_transfer_complete(&self, _counters: &TransferCounters, _cancelled: bool) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
