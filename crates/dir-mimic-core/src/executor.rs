use crate::error::Error;
use crate::integrity::SealedPlan;
use crate::model::Operation;
use crate::progress::ProgressReporter;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Counts per operation kind, as shown next to a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub moves: usize,
    pub copies: usize,
    pub deletes: usize,
    pub missing: usize,
}

impl PlanSummary {
    pub fn of(ops: &[Operation]) -> Self {
        let mut summary = Self::default();
        for op in ops {
            match op {
                Operation::Move { .. } => summary.moves += 1,
                Operation::Copy { .. } => summary.copies += 1,
                Operation::Delete { .. } => summary.deletes += 1,
                Operation::Missing { .. } => summary.missing += 1,
            }
        }
        summary
    }

    /// Operations that touch the target tree.
    pub fn mutating(&self) -> usize {
        self.moves + self.copies + self.deletes
    }
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} moves, {} copies, {} deletes, {} missing",
            self.moves, self.copies, self.deletes, self.missing
        )
    }
}

/// Everything the approver sees before deciding.
pub struct PlanReview<'a> {
    pub operations: &'a [Operation],
    pub digest: &'a str,
    pub summary: PlanSummary,
}

impl<'a> PlanReview<'a> {
    pub fn new(plan: &'a SealedPlan) -> Self {
        Self {
            operations: plan.operations(),
            digest: plan.digest(),
            summary: PlanSummary::of(plan.operations()),
        }
    }

    /// Human-readable lines for every operation that mutates the target.
    pub fn lines(&self) -> Vec<String> {
        render_plan(self.operations)
    }
}

/// Approval step run after the plan is displayed and before any mutation.
pub trait Confirm: Send + Sync {
    fn confirm(&self, review: &PlanReview<'_>) -> io::Result<bool>;
}

pub fn render_plan(ops: &[Operation]) -> Vec<String> {
    ops.iter()
        .filter(|op| !matches!(op, Operation::Missing { .. }))
        .map(|op| op.to_string())
        .collect()
}

/// One failed operation. Displays as `<type> <from>: <reason>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationError {
    pub operation: Operation,
    pub message: String,
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {}",
            self.operation.kind(),
            self.operation.from_path(),
            self.message
        )
    }
}

#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub applied: usize,
    pub skipped: usize,
    pub errors: Vec<OperationError>,
}

impl ExecutionReport {
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.to_string()).collect()
    }
}

#[derive(Debug)]
pub enum ApplyOutcome {
    Aborted,
    Completed(ExecutionReport),
}

/// Ask for approval, then apply every operation in order.
///
/// The digest shown to the approver was computed by [`SealedPlan::seal`] over
/// the bytes as received, and the operations applied are the ones decoded from
/// those same bytes.
pub fn execute(
    root: &Path,
    plan: &SealedPlan,
    confirm: &dyn Confirm,
    reporter: &dyn ProgressReporter,
) -> Result<ApplyOutcome, Error> {
    let review = PlanReview::new(plan);
    info!("Plan {} ({})", plan.digest(), review.summary);

    if !confirm.confirm(&review)? {
        info!("Plan {} declined", plan.digest());
        return Ok(ApplyOutcome::Aborted);
    }

    Ok(ApplyOutcome::Completed(apply_operations(
        root,
        plan.operations(),
        reporter,
    )))
}

/// Apply operations strictly in order. A failed operation is recorded and
/// the batch continues. Paths must already have passed [`SealedPlan::seal`].
pub fn apply_operations(
    root: &Path,
    ops: &[Operation],
    reporter: &dyn ProgressReporter,
) -> ExecutionReport {
    let mut report = ExecutionReport::default();
    let start = Instant::now();
    reporter.on_apply_start(ops.len());

    for (index, op) in ops.iter().enumerate() {
        let result = match op {
            Operation::Move { from, to } => move_file(root, from, to),
            Operation::Copy { from, to } => copy_file(root, from, to),
            Operation::Delete { from } => delete_file(root, from),
            Operation::Missing { .. } => {
                report.skipped += 1;
                reporter.on_operation(index, op, None);
                continue;
            }
        };

        match result {
            Ok(()) => {
                debug!("OK: {} {}", op.kind(), op.from_path());
                report.applied += 1;
                reporter.on_operation(index, op, None);
            }
            Err(e) => {
                let failure = OperationError {
                    operation: op.clone(),
                    message: e.to_string(),
                };
                error!("{}", failure);
                reporter.on_operation(index, op, Some(&failure.message));
                report.errors.push(failure);
            }
        }
    }

    let duration = start.elapsed();
    reporter.on_apply_complete(report.applied, report.errors.len(), duration.as_secs_f64());
    info!(
        "Plan executed: {} applied, {} failed, {} skipped",
        report.applied,
        report.errors.len(),
        report.skipped
    );
    report
}

fn resolve(root: &Path, rel: &str) -> PathBuf {
    rel.split('/').fold(root.to_path_buf(), |path, part| path.join(part))
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent),
        None => Ok(()),
    }
}

fn refuse_existing(path: &Path) -> io::Result<()> {
    if fs::symlink_metadata(path).is_ok() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("destination {} already exists", path.display()),
        ));
    }
    Ok(())
}

// Nothing is created on disk until both ends of the operation check out.
fn move_file(root: &Path, from: &str, to: &str) -> io::Result<()> {
    let from_path = resolve(root, from);
    let to_path = resolve(root, to);

    fs::symlink_metadata(&from_path)?;
    refuse_existing(&to_path)?;
    ensure_parent(&to_path)?;
    fs::rename(&from_path, &to_path)
}

fn copy_file(root: &Path, from: &str, to: &str) -> io::Result<()> {
    let from_path = resolve(root, from);
    let to_path = resolve(root, to);

    let mut src = File::open(&from_path)?;
    refuse_existing(&to_path)?;
    ensure_parent(&to_path)?;

    let mut dst = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&to_path)?;
    if let Err(e) = io::copy(&mut src, &mut dst) {
        drop(dst);
        if let Err(cleanup) = fs::remove_file(&to_path) {
            warn!("Could not remove partial copy {}: {}", to, cleanup);
        }
        return Err(e);
    }

    match src.metadata() {
        Ok(metadata) => {
            if let Err(e) = fs::set_permissions(&to_path, metadata.permissions()) {
                warn!("Could not copy permissions to {}: {}", to, e);
            }
        }
        Err(e) => warn!("Could not read permissions of {}: {}", from, e),
    }

    Ok(())
}

fn delete_file(root: &Path, from: &str) -> io::Result<()> {
    fs::remove_file(resolve(root, from))
}
