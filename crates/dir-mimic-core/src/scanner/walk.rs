use super::ScanOptions;
use crate::error::Error;
use crate::hasher;
use crate::model::{Catalog, FileRecord};
use crate::progress::ProgressReporter;
use glob::Pattern;
use std::io;
use std::path::{Component, Path};
use std::time::{Instant, UNIX_EPOCH};
use tracing::{debug, error, info, warn};
use walkdir::{DirEntry, WalkDir};

const PROGRESS_INTERVAL: usize = 256;

/// Walk every regular file under `root` and build a catalog.
///
/// Symlinks are never followed or cataloged, so two scans of equivalent trees
/// agree regardless of where links point. A file that cannot be hashed is
/// still cataloged with size-only identity.
pub fn scan(
    root: &Path,
    options: &ScanOptions,
    reporter: &dyn ProgressReporter,
) -> Result<Catalog, Error> {
    if !root.is_dir() {
        return Err(Error::NotADirectory(root.to_path_buf()));
    }

    let root_display = root.to_string_lossy().into_owned();
    let ignore_patterns = compile_patterns(&options.ignore_patterns);

    reporter.on_scan_start(&root_display);
    let start = Instant::now();
    let mut files: Vec<FileRecord> = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_ignored(root, entry, &ignore_patterns));

    for entry_result in walker {
        let entry = match entry_result {
            Ok(entry) => entry,
            Err(err) => {
                if err.io_error().map(|e| e.kind()) == Some(io::ErrorKind::PermissionDenied) {
                    error!("Access denied while scanning {}: {}", root_display, err);
                    continue;
                }
                return Err(err.into());
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let Some(rel_path) = relative_slash_path(root, entry.path()) else {
            continue;
        };

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                error!("Error getting metadata for {}: {}", rel_path, err);
                continue;
            }
        };

        let size = metadata.len();
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        let hash = match hasher::hash_file(entry.path(), size, options.hash_mode) {
            Ok(hash) => hash,
            Err(err) => {
                warn!("Could not hash {}: {}", rel_path, err);
                None
            }
        };

        files.push(FileRecord {
            path: rel_path,
            size,
            mtime,
            hash,
        });

        if files.len() % PROGRESS_INTERVAL == 0 {
            reporter.on_scan_progress(files.len(), entry.path().to_string_lossy().as_ref());
        }
    }

    let duration = start.elapsed();
    reporter.on_scan_complete(files.len(), duration.as_secs_f64());
    debug!(
        "Scan of {} completed in {:.2}s",
        root_display,
        duration.as_secs_f64()
    );

    let catalog = Catalog::new(root_display, options.hash_mode, files)?;
    info!(
        "Found {} files in {} folders ({} bytes)",
        catalog.stats().file_count,
        catalog.stats().folder_count,
        catalog.stats().total_size
    );
    Ok(catalog)
}

/// Express `path` relative to `root` with `/` separators. Returns `None` for
/// the root itself or paths outside it.
pub fn relative_slash_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn compile_patterns(globs: &[String]) -> Vec<Pattern> {
    globs
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Invalid glob pattern '{}': {}", glob, e);
                None
            }
        })
        .collect()
}

fn is_ignored(root: &Path, entry: &DirEntry, patterns: &[Pattern]) -> bool {
    if patterns.is_empty() {
        return false;
    }
    match relative_slash_path(root, entry.path()) {
        Some(rel) => patterns.iter().any(|pattern| pattern.matches(&rel)),
        None => false,
    }
}
