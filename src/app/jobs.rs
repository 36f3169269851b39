//! The job registry: identifiers, lifecycle and retention of background operations.
//!
//! Every submitted operation gets a [`Job`] record in the registry's map. The
//! record starts out `Running` and is written exactly once more, by the task
//! that executes the work, when it reaches `Done` or `Error`. Pollers only
//! ever read clones of the record.

use super::progress::{ProgressBoard, ProgressSnapshot};
use crate::config::AppConfig;
pub use crate::core::JobId;
use crate::core::{CoreError, CoreResult, FileRecord, RecoveryReport, ScanReport, SkippedFile};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Scan,
    Recover,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Scan => f.write_str("scan"),
            JobKind::Recover => f.write_str("recover"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Done,
    Error,
}

/// The payload of a finished job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobResult {
    /// Scan matches, in ranked order.
    Files(Vec<FileRecord>),
    /// Destination paths written by a recovery, in input order.
    Recovered(Vec<PathBuf>),
}

/// What a unit of work hands back to the registry on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutput {
    pub result: JobResult,
    pub skipped: Vec<SkippedFile>,
}

impl From<ScanReport> for JobOutput {
    fn from(report: ScanReport) -> Self {
        Self {
            result: JobResult::Files(report.files),
            skipped: report.skipped,
        }
    }
}

impl From<RecoveryReport> for JobOutput {
    fn from(report: RecoveryReport) -> Self {
        Self {
            result: JobResult::Recovered(report.recovered),
            skipped: report.skipped,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    /// Present once the job is `Done`.
    pub result: Option<JobResult>,
    /// Files the job passed over, with the reason for each.
    pub skipped: Vec<SkippedFile>,
    /// Present once the job is `Error`.
    pub error_message: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    fn running(id: JobId, kind: JobKind) -> Self {
        Self {
            id,
            kind,
            status: JobStatus::Running,
            result: None,
            skipped: Vec::new(),
            error_message: None,
            submitted_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status != JobStatus::Running
    }

    /// Scan matches, if this is a finished scan.
    pub fn files(&self) -> Option<&[FileRecord]> {
        match &self.result {
            Some(JobResult::Files(files)) => Some(files),
            _ => None,
        }
    }

    /// Written paths, if this is a finished recovery.
    pub fn recovered(&self) -> Option<&[PathBuf]> {
        match &self.result {
            Some(JobResult::Recovered(paths)) => Some(paths),
            _ => None,
        }
    }
}

/// How long finished jobs stay pollable.
///
/// A job past its TTL polls as not found straight away. Its record is
/// dropped, together with any surplus beyond the count limit, on the next
/// submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Finished jobs beyond this count are evicted, oldest first.
    pub max_finished_jobs: usize,
    /// Finished jobs older than this are evicted.
    pub finished_job_ttl: ChronoDuration,
}

impl RetentionPolicy {
    fn is_expired(&self, job: &Job, now: DateTime<Utc>) -> bool {
        job.finished_at
            .is_some_and(|finished| now - finished > self.finished_job_ttl)
    }

    /// Evicts expired and surplus finished jobs. Running jobs are never touched.
    fn prune(&self, jobs: &mut HashMap<JobId, Job>, now: DateTime<Utc>) {
        let before = jobs.len();

        jobs.retain(|_, job| !self.is_expired(job, now));

        let mut finished: Vec<(DateTime<Utc>, JobId)> = jobs
            .values()
            .filter_map(|job| job.finished_at.map(|at| (at, job.id)))
            .collect();

        if finished.len() > self.max_finished_jobs {
            finished.sort_unstable();
            let excess = finished.len() - self.max_finished_jobs;
            for (_, id) in finished.into_iter().take(excess) {
                jobs.remove(&id);
            }
        }

        let evicted = before - jobs.len();
        if evicted > 0 {
            tracing::debug!("Evicted {} finished jobs", evicted);
        }
    }
}

/// Knobs for a [`JobRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSettings {
    /// Jobs that may execute at the same time; later submissions wait.
    pub max_concurrent_jobs: usize,
    pub retention: RetentionPolicy,
}

impl From<&AppConfig> for JobSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_concurrent_jobs: config.max_concurrent_jobs.max(1),
            retention: RetentionPolicy {
                max_finished_jobs: config.max_finished_jobs,
                finished_job_ttl: i64::try_from(config.finished_job_ttl_secs)
                    .ok()
                    .and_then(ChronoDuration::try_seconds)
                    .unwrap_or(ChronoDuration::MAX),
            },
        }
    }
}

impl Default for JobSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

struct RegistryInner {
    jobs: RwLock<HashMap<JobId, Job>>,
    progress: ProgressBoard,
    permits: Arc<Semaphore>,
    retention: RetentionPolicy,
}

impl RegistryInner {
    fn read_jobs(&self) -> RwLockReadGuard<'_, HashMap<JobId, Job>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_jobs(&self) -> RwLockWriteGuard<'_, HashMap<JobId, Job>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves a job to its terminal state. Called once per job, by its own task.
    fn finish(&self, id: JobId, kind: JobKind, outcome: Result<JobOutput, String>) {
        let succeeded = outcome.is_ok();
        {
            let mut jobs = self.write_jobs();
            let Some(job) = jobs.get_mut(&id) else {
                tracing::warn!("Job {} vanished before it finished", id);
                return;
            };
            match outcome {
                Ok(output) => {
                    job.status = JobStatus::Done;
                    job.result = Some(output.result);
                    job.skipped = output.skipped;
                }
                Err(message) => {
                    job.status = JobStatus::Error;
                    job.error_message = Some(message);
                }
            }
            job.finished_at = Some(Utc::now());

            // Still under the write guard, so no poller sees a terminal
            // record next to a stale counter.
            if succeeded {
                self.progress.completed(kind);
            } else {
                self.progress.failed(kind);
            }
        }

        if succeeded {
            tracing::info!("Job {} ({}) done", id, kind);
        } else {
            tracing::error!("Job {} ({}) failed", id, kind);
        }
    }
}

/// Owns every job record and the worker pool that runs them.
///
/// Cloning is cheap and every clone shares the same jobs.
#[derive(Clone)]
pub struct JobRegistry {
    inner: Arc<RegistryInner>,
    runtime: Handle,
}

impl JobRegistry {
    pub fn new(settings: JobSettings, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                jobs: RwLock::new(HashMap::new()),
                progress: ProgressBoard::default(),
                permits: Arc::new(Semaphore::new(settings.max_concurrent_jobs.max(1))),
                retention: settings.retention,
            }),
            runtime,
        }
    }

    /// Builds a registry on the runtime the caller is running in.
    pub fn on_current_runtime(settings: JobSettings) -> CoreResult<Self> {
        Ok(Self::new(settings, Handle::try_current()?))
    }

    /// Registers a `Running` job and starts `work` in the background.
    ///
    /// Returns immediately. `work` runs on the blocking thread pool once a
    /// worker permit is free. An `Err` from `work`, or a panic inside it,
    /// ends the job in `Error`.
    pub fn submit<F>(&self, kind: JobKind, work: F) -> JobId
    where
        F: FnOnce() -> CoreResult<JobOutput> + Send + 'static,
    {
        let id = JobId::generate();
        {
            let mut jobs = self.inner.write_jobs();
            self.inner.retention.prune(&mut jobs, Utc::now());
            jobs.insert(id, Job::running(id, kind));
            self.inner.progress.started(kind);
        }
        tracing::info!("Submitted {} job {}", kind, id);

        let inner = Arc::clone(&self.inner);
        self.runtime.spawn(async move {
            let outcome = execute(Arc::clone(&inner.permits), work).await;
            if let Err(message) = &outcome {
                tracing::error!("Job {} ({}) error: {}", id, kind, message);
            }
            inner.finish(id, kind, outcome);
        });

        id
    }

    /// Returns a copy of the job's current record. Jobs past their retention
    /// TTL are reported as not found even before they are pruned.
    pub fn poll(&self, id: JobId) -> CoreResult<Job> {
        let now = Utc::now();
        self.inner
            .read_jobs()
            .get(&id)
            .filter(|job| !self.inner.retention.is_expired(job, now))
            .cloned()
            .ok_or(CoreError::JobNotFound(id))
    }

    pub fn progress(&self, kind: JobKind) -> u8 {
        self.inner.progress.get(kind)
    }

    pub fn progress_snapshot(&self) -> ProgressSnapshot {
        self.inner.progress.snapshot()
    }

    /// Number of records currently held, running or finished.
    pub fn len(&self) -> usize {
        self.inner.read_jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn execute<F>(permits: Arc<Semaphore>, work: F) -> Result<JobOutput, String>
where
    F: FnOnce() -> CoreResult<JobOutput> + Send + 'static,
{
    let _permit = permits
        .acquire_owned()
        .await
        .map_err(|_| "worker pool is shut down".to_string())?;

    match tokio::task::spawn_blocking(work).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(e.to_string()),
        Err(join_error) => Err(CoreError::from(join_error).to_string()),
    }
}
