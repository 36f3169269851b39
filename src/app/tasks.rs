//! Bodies of the background jobs. Both run on the blocking thread pool.

use std::path::{Path, PathBuf};
use std::time::Instant;

use super::jobs::JobOutput;
use crate::core::{CoreResult, DirectoryScanner, RecoveryEngine, ScanCriteria};

/// Walks `criteria.root_path` and ranks the matching files.
pub fn run_scan(criteria: ScanCriteria) -> CoreResult<JobOutput> {
    let started = Instant::now();
    let report = DirectoryScanner::new(criteria).scan()?;
    tracing::debug!("Scan task took {:?}", started.elapsed());
    Ok(report.into())
}

/// Copies every source into `destination` without overwriting anything there.
pub fn run_recover<P: AsRef<Path>>(sources: &[P], destination: PathBuf) -> CoreResult<JobOutput> {
    let started = Instant::now();
    let report = RecoveryEngine::new(destination).recover(sources)?;
    tracing::debug!("Recovery task took {:?}", started.elapsed());
    Ok(report.into())
}
