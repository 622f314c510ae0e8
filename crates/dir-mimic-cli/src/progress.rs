use dir_mimic_core::{Operation, ProgressReporter};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif.
///
/// - Scan phase: spinner (unknown total files upfront)
/// - Apply phase: progress bar over the plan's operations
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn guard(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.guard();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        if let Some(pb) = self.guard().take() {
            pb.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliReporter {
    fn on_scan_start(&self, root: &str) {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            pb.set_style(style.tick_chars(TICK_CHARS));
        }
        pb.set_message(format!("Scanning {}...", root));
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_scan_progress(&self, files_found: usize, _current_path: &str) {
        if let Some(pb) = self.guard().as_ref() {
            pb.set_message(format!("Scanning... {} files found", files_found));
        }
    }

    fn on_scan_complete(&self, total_files: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Scan complete: {} files in {:.2}s",
            total_files, duration_secs
        );
    }

    fn on_apply_start(&self, total_ops: usize) {
        let pb = ProgressBar::new(total_ops as u64);
        if let Ok(style) =
            ProgressStyle::with_template("  {spinner:.cyan} Applying [{bar:30.cyan/dim}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("━╸─").tick_chars(TICK_CHARS));
        }
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_operation(&self, index: usize, op: &Operation, error: Option<&str>) {
        if let Some(pb) = self.guard().as_ref() {
            pb.set_position(index as u64 + 1);
            match error {
                Some(message) => pb.println(format!(
                    "  \x1b[31m✗\x1b[0m {} {}: {}",
                    op.kind(),
                    op.from_path(),
                    message
                )),
                None => pb.set_message(op.from_path().to_string()),
            }
        }
    }

    fn on_apply_complete(&self, applied: usize, errors: usize, duration_secs: f64) {
        self.finish_bar();
        if errors == 0 {
            eprintln!(
                "  \x1b[32m✓\x1b[0m Applied {} operations in {:.2}s",
                applied, duration_secs
            );
        } else {
            eprintln!(
                "  \x1b[33m!\x1b[0m Applied {} operations, {} failed in {:.2}s",
                applied, errors, duration_secs
            );
        }
    }
}
