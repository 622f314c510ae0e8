use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("Duplicate path in catalog: {0}")]
    DuplicatePath(String),

    #[error("Unsafe path in plan: '{0}'")]
    UnsafePath(String),

    #[error("Checksum mismatch: expected {expected}, computed {actual}")]
    IntegrityMismatch { expected: String, actual: String },
}

impl Error {
    /// Errors caused by the submitted payload rather than by this host.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::Json(_)
                | Error::DuplicatePath(_)
                | Error::UnsafePath(_)
                | Error::IntegrityMismatch { .. }
        )
    }
}
