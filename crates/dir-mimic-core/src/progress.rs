use crate::model::Operation;

/// Trait for reporting scan and apply progress.
///
/// CLI implements with indicatif spinners and bars. All methods have default
/// no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_scan_start(&self, _root: &str) {}
    fn on_scan_progress(&self, _files_found: usize, _current_path: &str) {}
    fn on_scan_complete(&self, _total_files: usize, _duration_secs: f64) {}
    fn on_apply_start(&self, _total_ops: usize) {}
    fn on_operation(&self, _index: usize, _op: &Operation, _error: Option<&str>) {}
    fn on_apply_complete(&self, _applied: usize, _errors: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
