//! The in-process boundary front ends talk to.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::runtime::Handle;

use super::jobs::{Job, JobId, JobKind, JobRegistry, JobSettings};
use super::progress::ProgressSnapshot;
use super::tasks;
use crate::config::AppConfig;
use crate::core::{CoreResult, ScanCriteria};

/// Submits scans and recoveries as background jobs and answers polls about them.
///
/// Owns its [`JobRegistry`]; there is no global job state. Clones share jobs.
#[derive(Clone)]
pub struct RecoveryService {
    registry: JobRegistry,
}

impl RecoveryService {
    /// Builds a service whose jobs run on the caller's Tokio runtime.
    pub fn new(config: &AppConfig) -> CoreResult<Self> {
        Ok(Self::with_handle(config, Handle::try_current()?))
    }

    pub fn with_handle(config: &AppConfig, runtime: Handle) -> Self {
        Self {
            registry: JobRegistry::new(JobSettings::from(config), runtime),
        }
    }

    pub fn submit_scan(&self, criteria: ScanCriteria) -> JobId {
        self.registry
            .submit(JobKind::Scan, move || tasks::run_scan(criteria))
    }

    /// Accepts anything path-like, including the [`FileRecord`](crate::core::FileRecord)s
    /// a scan produced.
    pub fn submit_recover<P>(&self, sources: Vec<P>, destination: impl Into<PathBuf>) -> JobId
    where
        P: AsRef<Path> + Send + 'static,
    {
        let destination = destination.into();
        self.registry.submit(JobKind::Recover, move || {
            tasks::run_recover(&sources, destination)
        })
    }

    pub fn poll(&self, id: JobId) -> CoreResult<Job> {
        self.registry.poll(id)
    }

    /// Either 0 or 100.
    pub fn progress(&self, kind: JobKind) -> u8 {
        self.registry.progress(kind)
    }

    pub fn progress_snapshot(&self) -> ProgressSnapshot {
        self.registry.progress_snapshot()
    }

    /// Polls `id` every `interval` until the job is no longer running.
    pub async fn wait_for(&self, id: JobId, interval: Duration) -> CoreResult<Job> {
        loop {
            let job = self.poll(id)?;
            if job.is_finished() {
                return Ok(job);
            }
            tokio::time::sleep(interval).await;
        }
    }
}
