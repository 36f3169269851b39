pub mod error;
pub mod filter;
pub mod recovery;
pub mod scanner;
pub mod summary;

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

/// A file that matched a scan, with the metadata read while walking the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub modified_time: DateTime<Local>,
    pub size_bytes: u64,
}

impl FileRecord {
    /// Builds a record from metadata that was already fetched for `path`.
    pub fn from_metadata(path: PathBuf, metadata: &Metadata) -> io::Result<Self> {
        Ok(Self {
            path,
            modified_time: DateTime::<Local>::from(metadata.modified()?),
            size_bytes: metadata.len(),
        })
    }

    /// Stats `path` (following symlinks) and builds a record from the result.
    pub fn from_path(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let metadata = std::fs::metadata(&path)?;
        Self::from_metadata(path, &metadata)
    }
}

impl AsRef<Path> for FileRecord {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

/// Opaque, never-reused identifier of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Ordering applied to a finished scan. Both orders are descending and stable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Most recently modified first.
    #[default]
    Modified,
    /// Largest first.
    Size,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "modified" | "mtime" | "date" => Ok(SortKey::Modified),
            "size" => Ok(SortKey::Size),
            other => Err(format!(
                "unknown sort key '{}', expected 'modified' or 'size'",
                other
            )),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortKey::Modified => f.write_str("modified"),
            SortKey::Size => f.write_str("size"),
        }
    }
}

/// The filter parameters describing which files qualify as recoverable.
///
/// Bounds are inclusive and every bound is optional. Inverted bounds
/// (`min_size > max_size`, `start_date > end_date`) are not rejected; they
/// simply match nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCriteria {
    pub root_path: PathBuf,
    /// Raw, case-sensitive suffix of the file name (e.g. `.txt`).
    pub extension_filter: Option<String>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub sort_by: SortKey,
}

impl ScanCriteria {
    /// Criteria that accept every regular file under `root_path`.
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        Self {
            root_path: root_path.into(),
            ..Default::default()
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension_filter = Some(extension.into());
        self
    }

    pub fn with_size_range(mut self, min_size: Option<u64>, max_size: Option<u64>) -> Self {
        self.min_size = min_size;
        self.max_size = max_size;
        self
    }

    pub fn with_date_range(
        mut self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Self {
        self.start_date = start_date;
        self.end_date = end_date;
        self
    }

    pub fn sorted_by(mut self, sort_by: SortKey) -> Self {
        self.sort_by = sort_by;
        self
    }
}

/// A file the batch passed over, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

impl SkippedFile {
    pub fn new(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Self {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Output of a directory scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub files: Vec<FileRecord>,
    pub skipped: Vec<SkippedFile>,
}

/// Output of a recovery batch. `recovered` holds destination paths in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub recovered: Vec<PathBuf>,
    pub skipped: Vec<SkippedFile>,
}

pub use error::{CoreError, CoreResult};
pub use recovery::RecoveryEngine;
pub use scanner::DirectoryScanner;
pub use summary::{summarize, ExtensionSummary};
