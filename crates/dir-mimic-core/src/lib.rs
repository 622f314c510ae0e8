pub mod analysis;
pub mod config;
pub mod error;
pub mod executor;
pub mod hasher;
pub mod integrity;
pub mod inventory;
pub mod model;
pub mod progress;
pub mod scanner;
pub mod service;

pub use analysis::identity::identity_key;
pub use analysis::reconcile::{plan, retain_extras, unchanged_count};
pub use config::AppConfig;
pub use error::Error;
pub use executor::{Confirm, ExecutionReport, PlanReview, PlanSummary};
pub use integrity::SealedPlan;
pub use model::{Catalog, FileRecord, HashMode, Operation};
pub use progress::{ProgressReporter, SilentReporter};
pub use scanner::ScanOptions;
pub use service::{CatalogService, SubmitOutcome};
