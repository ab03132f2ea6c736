use dicom_sync_core::transfer::{TransferCounters, TransferOutcome};
use dicom_sync_core::ProgressReporter;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

const TICKS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars.
///
/// One bar is live at a time: ingest, then backup and update during an
/// edit, then the transfer bar.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn bar_with(template: &str) -> ProgressBar {
        let style = ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("━╸─")
            .tick_chars(TICKS);
        let pb = ProgressBar::new(0);
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    fn set_bar(&self, pb: ProgressBar) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(old) = guard.take() {
                old.finish_and_clear();
            }
            *guard = Some(pb);
        }
    }

    fn finish_bar(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }

    /// Move the live bar; the first step of a phase replaces it.
    fn advance(&self, template: &str, done: usize, total: usize) {
        if done <= 1 {
            let pb = Self::bar_with(template);
            pb.set_length(total as u64);
            self.set_bar(pb);
        }
        if let Ok(guard) = self.bar.lock() {
            if let Some(pb) = guard.as_ref() {
                pb.set_position(done as u64);
            }
        }
    }
}

impl ProgressReporter for CliReporter {
    fn on_ingest_start(&self, total_entries: usize) {
        let pb = Self::bar_with(
            "  {spinner:.cyan} Loading [{bar:30.cyan/dim}] {pos}/{len} files ({eta} remaining)",
        );
        pb.set_length(total_entries as u64);
        self.set_bar(pb);
    }

    fn on_ingest_progress(&self, attempted: usize, total: usize) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(pb) = guard.as_ref() {
                pb.set_length(total as u64);
                pb.set_position(attempted as u64);
            }
        }
    }

    fn on_ingest_complete(&self, loaded: usize, excluded: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Load complete: {} records, {} excluded in {:.2}s",
            loaded, excluded, duration_secs
        );
    }

    fn on_backup_progress(&self, done: usize, total: usize) {
        self.advance(
            "  {spinner:.cyan} Backing up [{bar:30.cyan/dim}] {pos}/{len} files",
            done,
            total,
        );
        if done == total {
            self.finish_bar();
            eprintln!("  \x1b[32m✓\x1b[0m Backup complete: {} files", total);
        }
    }

    fn on_update_progress(&self, done: usize, total: usize) {
        self.advance(
            "  {spinner:.cyan} Updating [{bar:30.cyan/dim}] {pos}/{len} files",
            done,
            total,
        );
    }

    fn on_edit_complete(&self, committed: usize, requested: usize) {
        self.finish_bar();
        let mark = if committed == requested {
            "\x1b[32m✓\x1b[0m"
        } else {
            "\x1b[31m✗\x1b[0m"
        };
        eprintln!("  {} Edit saved {}/{} files", mark, committed, requested);
    }

    fn on_transfer_start(&self, total: usize) {
        let pb = Self::bar_with(
            "  {spinner:.cyan} Sending [{bar:30.cyan/dim}] {pos}/{len} images {msg}",
        );
        pb.set_length(total as u64);
        self.set_bar(pb);
    }

    fn on_transfer_outcome(&self, outcome: &TransferOutcome, counters: &TransferCounters) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(pb) = guard.as_ref() {
                pb.set_position(counters.settled() as u64);
                pb.set_message(format!("({} failed)", counters.failed));
                if let Some(cause) = &outcome.cause {
                    pb.println(format!(
                        "  \x1b[31m✗\x1b[0m {}: {}",
                        outcome.path.display(),
                        cause
                    ));
                }
            }
        }
    }

    fn on_transfer_complete(&self, counters: &TransferCounters, cancelled: bool) {
        self.finish_bar();
        let verb = if cancelled { "cancelled" } else { "complete" };
        eprintln!(
            "  \x1b[32m✓\x1b[0m Transfer {}: {} sent, {} failed of {} submitted",
            verb, counters.succeeded, counters.failed, counters.submitted
        );
    }
}
