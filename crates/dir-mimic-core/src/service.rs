use crate::error::Error;
use crate::executor::{self, ApplyOutcome, Confirm};
use crate::integrity::SealedPlan;
use crate::model::Catalog;
use crate::progress::ProgressReporter;
use crate::scanner::{self, ScanOptions};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};
use tracing::{error, info, warn};

/// Result of a plan submission, in the shape returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SubmitOutcome {
    Aborted,
    Completed { errors: Vec<String> },
}

/// Owns the target root and its current catalog.
///
/// The catalog is replaced wholesale after every submission. `apply_lock` is
/// held from confirmation through rescan, so only one plan is ever in flight;
/// readers take the catalog lock only briefly and never see a partial state.
pub struct CatalogService {
    root: PathBuf,
    options: ScanOptions,
    catalog: RwLock<Catalog>,
    apply_lock: Mutex<()>,
    reporter: Box<dyn ProgressReporter>,
}

impl CatalogService {
    /// Validate `root` and perform the initial scan.
    pub fn open(
        root: &Path,
        options: ScanOptions,
        reporter: Box<dyn ProgressReporter>,
    ) -> Result<Self, Error> {
        let metadata = fs::metadata(root)?;
        if !metadata.is_dir() {
            return Err(Error::NotADirectory(root.to_path_buf()));
        }
        let root = fs::canonicalize(root)?;

        info!("Scanning directory: {}", root.display());
        let catalog = scanner::scan(&root, &options, reporter.as_ref())?;

        Ok(Self {
            root,
            options,
            catalog: RwLock::new(catalog),
            apply_lock: Mutex::new(()),
            reporter,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Snapshot of the current catalog.
    pub fn catalog(&self) -> Catalog {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Rescan the root and replace the catalog.
    pub fn rescan(&self) -> Result<(), Error> {
        let fresh = scanner::scan(&self.root, &self.options, self.reporter.as_ref())?;
        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = fresh;
        Ok(())
    }

    /// Seal `payload`, ask `confirm` for approval, apply, then rescan.
    ///
    /// Malformed payloads, unsafe paths and a mismatching `expected_digest`
    /// are rejected before the approver is asked anything. Per-operation
    /// failures are reported in the outcome, never as an `Err`.
    pub fn submit(
        &self,
        payload: Vec<u8>,
        expected_digest: Option<&str>,
        confirm: &dyn Confirm,
    ) -> Result<SubmitOutcome, Error> {
        let plan = SealedPlan::seal(payload)?;
        plan.check_expected(expected_digest)?;

        let _guard = self.apply_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let outcome = executor::execute(&self.root, &plan, confirm, self.reporter.as_ref())?;
        match outcome {
            ApplyOutcome::Aborted => Ok(SubmitOutcome::Aborted),
            ApplyOutcome::Completed(report) => {
                info!("Rescanning directory...");
                if let Err(e) = self.rescan() {
                    error!("Could not rescan {}: {}", self.root.display(), e);
                }
                if !report.errors.is_empty() {
                    warn!("{} operation(s) failed", report.errors.len());
                }
                Ok(SubmitOutcome::Completed {
                    errors: report.error_messages(),
                })
            }
        }
    }
}
