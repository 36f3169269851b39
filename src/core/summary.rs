//! Per-extension totals over a scan result, for result overviews.

use super::FileRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key used for files without an extension.
pub const NO_EXTENSION: &str = "(none)";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionStats {
    pub count: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionSummary {
    pub total_files: usize,
    pub total_bytes: u64,
    /// Keyed by lower-cased extension without the dot.
    pub by_extension: BTreeMap<String, ExtensionStats>,
}

pub fn summarize(files: &[FileRecord]) -> ExtensionSummary {
    let mut summary = ExtensionSummary::default();

    for file in files {
        let key = file
            .path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_else(|| NO_EXTENSION.to_string());

        let stats = summary.by_extension.entry(key).or_default();
        stats.count += 1;
        stats.bytes += file.size_bytes;

        summary.total_files += 1;
        summary.total_bytes += file.size_bytes;
    }

    summary
}
