use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// How much of a file's content takes part in its identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashMode {
    /// Filename and size only.
    #[default]
    None,
    /// Adds a SHA-1 of the first and last 64 KiB.
    Sample,
    /// Adds a SHA-1 of the entire file.
    Full,
}

impl fmt::Display for HashMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HashMode::None => "none",
            HashMode::Sample => "sample",
            HashMode::Full => "full",
        };
        f.write_str(name)
    }
}

impl FromStr for HashMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "1" => Ok(HashMode::None),
            "sample" | "2" => Ok(HashMode::Sample),
            "full" | "3" => Ok(HashMode::Full),
            other => Err(format!(
                "unknown hash mode '{}' (expected none, sample or full)",
                other
            )),
        }
    }
}

/// A file discovered during scanning, relative to the catalog root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub size: u64,
    /// Milliseconds since the Unix epoch. Never used for identity.
    #[serde(default)]
    pub mtime: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl FileRecord {
    pub fn new(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
            mtime: 0,
            hash: None,
        }
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Parent portion of the path; empty for files at the root.
    pub fn folder(&self) -> &str {
        self.path.rsplit_once('/').map(|(folder, _)| folder).unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogStats {
    #[serde(default)]
    pub file_count: usize,
    #[serde(default)]
    pub folder_count: usize,
    #[serde(default)]
    pub total_size: u64,
}

impl CatalogStats {
    fn derive(files: &[FileRecord]) -> Self {
        let mut folders: BTreeSet<&str> = BTreeSet::new();
        for file in files {
            let mut folder = file.folder();
            while !folder.is_empty() && folders.insert(folder) {
                folder = folder.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("");
            }
        }

        Self {
            file_count: files.len(),
            folder_count: folders.len(),
            total_size: files.iter().map(|f| f.size).sum(),
        }
    }
}

/// Snapshot of one directory tree. Files are kept sorted by path and paths
/// are unique; stats are always derived from the file list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CatalogWire")]
pub struct Catalog {
    root: String,
    hash_mode: HashMode,
    files: Vec<FileRecord>,
    #[serde(flatten)]
    stats: CatalogStats,
}

#[derive(Deserialize)]
struct CatalogWire {
    #[serde(default)]
    root: String,
    #[serde(default)]
    hash_mode: HashMode,
    files: Vec<FileRecord>,
}

impl TryFrom<CatalogWire> for Catalog {
    type Error = Error;

    fn try_from(wire: CatalogWire) -> Result<Self, Self::Error> {
        Catalog::new(wire.root, wire.hash_mode, wire.files)
    }
}

impl Catalog {
    pub fn new(
        root: impl Into<String>,
        hash_mode: HashMode,
        mut files: Vec<FileRecord>,
    ) -> Result<Self, Error> {
        files.sort_by(|a, b| a.path.cmp(&b.path));
        if let Some(pair) = files.windows(2).find(|pair| pair[0].path == pair[1].path) {
            return Err(Error::DuplicatePath(pair[0].path.clone()));
        }

        let stats = CatalogStats::derive(&files);
        Ok(Self {
            root: root.into(),
            hash_mode,
            files,
            stats,
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn hash_mode(&self) -> HashMode {
        self.hash_mode
    }

    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    pub fn stats(&self) -> &CatalogStats {
        &self.stats
    }

    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.files
            .binary_search_by(|f| f.path.as_str().cmp(path))
            .ok()
            .map(|idx| &self.files[idx])
    }
}

/// A single step of a reconciliation plan.
///
/// `Move`, `Copy` and `Delete` paths are relative to the target root.
/// `Missing` names a source location the target cannot satisfy locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Operation {
    #[serde(rename = "mv")]
    Move { from: String, to: String },
    #[serde(rename = "cp")]
    Copy { from: String, to: String },
    #[serde(rename = "rm")]
    Delete { from: String },
    #[serde(rename = "missing")]
    Missing { from: String, size: u64 },
}

impl Operation {
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Move { .. } => "mv",
            Operation::Copy { .. } => "cp",
            Operation::Delete { .. } => "rm",
            Operation::Missing { .. } => "missing",
        }
    }

    /// The path the operation is sorted and reported by.
    pub fn from_path(&self) -> &str {
        match self {
            Operation::Move { from, .. }
            | Operation::Copy { from, .. }
            | Operation::Delete { from }
            | Operation::Missing { from, .. } => from,
        }
    }

    pub fn to_path(&self) -> Option<&str> {
        match self {
            Operation::Move { to, .. } | Operation::Copy { to, .. } => Some(to),
            Operation::Delete { .. } | Operation::Missing { .. } => None,
        }
    }

    /// Execution priority among operations sharing a `from` path. A copy must
    /// read its source before a move or delete of that path runs.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            Operation::Copy { .. } => 0,
            Operation::Move { .. } => 1,
            Operation::Delete { .. } => 2,
            Operation::Missing { .. } => 3,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Move { from, to } => write!(f, "MOVE: {} -> {}", from, to),
            Operation::Copy { from, to } => write!(f, "COPY: {} -> {}", from, to),
            Operation::Delete { from } => write!(f, "DELETE: {}", from),
            Operation::Missing { from, size } => write!(f, "MISSING: {} ({} bytes)", from, size),
        }
    }
}
