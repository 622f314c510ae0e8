pub mod walk;

pub use walk::{relative_slash_path, scan};

use crate::config::AppConfig;
use crate::model::HashMode;

/// Policy shared by every scan that will later be compared. Source and
/// target catalogs must be produced with the same options.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub hash_mode: HashMode,
    pub ignore_patterns: Vec<String>,
}

impl ScanOptions {
    pub fn new(hash_mode: HashMode) -> Self {
        Self {
            hash_mode,
            ignore_patterns: Vec::new(),
        }
    }

    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }
}

impl From<&AppConfig> for ScanOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            hash_mode: config.hash_mode,
            ignore_patterns: config.ignore_patterns.clone(),
        }
    }
}
