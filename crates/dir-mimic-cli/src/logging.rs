use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Console output goes to stderr so the plan and prompt own stdout. A file
/// log is kept only when `LOG_FILE_PATH` names one; the returned guard must
/// live until exit so buffered lines are flushed.
pub fn init_logger() -> Option<WorkerGuard> {
    let filter = env::var("TRACING_LEVEL").unwrap_or_else(|_| "info".to_string());

    let log_file = env::var("LOG_FILE_PATH")
        .ok()
        .filter(|path| !path.trim().is_empty());

    let (file_layer, guard) = match log_file.as_deref() {
        Some(path) => {
            let (dir, name) = log_file_target(path);
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time()
                .with_ansi(true),
        )
        .with(file_layer)
        .with(EnvFilter::new(filter))
        .init();

    match log_file {
        Some(path) => debug!("Logging to stderr and {}", path),
        None => debug!("Logging to stderr"),
    }

    guard
}

/// Splits a log path into the directory the appender creates and the file
/// name inside it. A bare file name lands in the working directory.
fn log_file_target(path: &str) -> (PathBuf, OsString) {
    let path = Path::new(path);
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| OsString::from("dir-mimic.log"));
    (dir, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_target_splits_directory_and_name() {
        assert_eq!(
            log_file_target("./logs/dir-mimic.log"),
            (PathBuf::from("./logs"), OsString::from("dir-mimic.log"))
        );
        assert_eq!(
            log_file_target("run.log"),
            (PathBuf::from("."), OsString::from("run.log"))
        );
        assert_eq!(
            log_file_target("/var/log/mimic/"),
            (PathBuf::from("/var/log"), OsString::from("mimic"))
        );
    }
}
