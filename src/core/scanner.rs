use super::error::{CoreError, CoreResult};
use super::{filter, FileRecord, ScanCriteria, ScanReport, SkippedFile, SortKey};
use rayon::prelude::*;
use std::fs;
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

/// What happened to one enumerated entry.
enum Evaluation {
    Matched(FileRecord),
    Rejected,
    Skipped(SkippedFile),
}

/// Walks a directory tree and collects the files that satisfy a [`ScanCriteria`].
///
/// The scanner owns nothing but its criteria, so any number of scans may run
/// side by side on different threads.
pub struct DirectoryScanner {
    criteria: ScanCriteria,
}

impl DirectoryScanner {
    pub fn new(criteria: ScanCriteria) -> Self {
        Self { criteria }
    }

    pub fn criteria(&self) -> &ScanCriteria {
        &self.criteria
    }

    /// Runs the scan to completion. Blocks on filesystem I/O.
    ///
    /// Entries that cannot be read are reported in [`ScanReport::skipped`].
    /// Only a root that is missing or not a directory fails the scan.
    pub fn scan(&self) -> CoreResult<ScanReport> {
        let given_root = &self.criteria.root_path;
        let root_metadata =
            fs::metadata(given_root).map_err(|e| CoreError::Io(e, given_root.clone()))?;
        if !root_metadata.is_dir() {
            return Err(CoreError::NotADirectory(given_root.clone()));
        }
        // Records carry absolute paths regardless of how the root was given.
        let root = &std::path::absolute(given_root)
            .map_err(|e| CoreError::Io(e, given_root.clone()))?;

        tracing::info!("Starting scan of {}", root.display());

        let mut skipped = Vec::new();
        let mut candidates = Vec::new();

        // Directory symlinks are never descended into, which keeps cycles out.
        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            match entry {
                Ok(entry) => {
                    let file_type = entry.file_type();
                    if file_type.is_file() || file_type.is_symlink() {
                        candidates.push(entry);
                    }
                }
                Err(e) => {
                    let path = e.path().unwrap_or(root.as_path()).to_path_buf();
                    tracing::debug!("Skipping unreadable entry {}: {}", path.display(), e);
                    skipped.push(SkippedFile::new(path, e));
                }
            }
        }

        tracing::debug!("Collected {} candidate files", candidates.len());

        // `collect` on an indexed parallel iterator keeps enumeration order.
        let evaluations: Vec<Evaluation> = candidates
            .par_iter()
            .map(|entry| self.evaluate(entry))
            .collect();

        let mut files = Vec::new();
        for evaluation in evaluations {
            match evaluation {
                Evaluation::Matched(record) => files.push(record),
                Evaluation::Rejected => {}
                Evaluation::Skipped(skip) => skipped.push(skip),
            }
        }

        sort_records(&mut files, self.criteria.sort_by);

        tracing::info!(
            "✅ Scan of {} completed: {} matches, {} entries skipped",
            root.display(),
            files.len(),
            skipped.len()
        );

        Ok(ScanReport { files, skipped })
    }

    fn evaluate(&self, entry: &DirEntry) -> Evaluation {
        let path = entry.path();

        let metadata = if entry.path_is_symlink() {
            // A symlink counts when it resolves to a regular file.
            match fs::metadata(path) {
                Ok(md) if md.is_file() => md,
                Ok(_) => return Evaluation::Rejected,
                Err(e) => return skip(path, e),
            }
        } else {
            match entry.metadata() {
                Ok(md) => md,
                Err(e) => return skip(path, e),
            }
        };

        let record = match FileRecord::from_metadata(path.to_path_buf(), &metadata) {
            Ok(record) => record,
            Err(e) => return skip(path, e),
        };

        let file_name = entry.file_name().to_string_lossy();
        if filter::matches(
            &file_name,
            record.size_bytes,
            &record.modified_time,
            &self.criteria,
        ) {
            Evaluation::Matched(record)
        } else {
            Evaluation::Rejected
        }
    }
}

fn skip(path: &Path, reason: impl std::fmt::Display) -> Evaluation {
    tracing::debug!("Skipping {}: {}", path.display(), reason);
    Evaluation::Skipped(SkippedFile::new(path, reason))
}

/// Descending, stable sort. Ties keep their enumeration order.
fn sort_records(files: &mut [FileRecord], sort_by: SortKey) {
    match sort_by {
        SortKey::Modified => files.sort_by(|a, b| b.modified_time.cmp(&a.modified_time)),
        SortKey::Size => files.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes)),
    }
}

/// Convenience wrapper around [`DirectoryScanner::scan`].
pub fn scan(criteria: &ScanCriteria) -> CoreResult<ScanReport> {
    DirectoryScanner::new(criteria.clone()).scan()
}
