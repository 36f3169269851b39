pub mod settings;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Name of the folder created under the user's documents directory for recovered files.
pub const DEFAULT_DESTINATION_DIR: &str = "Recovered";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Jobs allowed to execute at once. Further submissions queue.
    pub max_concurrent_jobs: usize,
    pub max_finished_jobs: usize,
    pub finished_job_ttl_secs: u64,
    /// How often front ends poll a running job.
    pub poll_interval_ms: u64,
    pub default_destination: Option<PathBuf>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        settings::load_config(None)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let max_concurrent_jobs = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);

        Self {
            max_concurrent_jobs,
            max_finished_jobs: 256,
            finished_job_ttl_secs: 3600,
            poll_interval_ms: 250,
            default_destination: dirs::document_dir().map(|dir| dir.join(DEFAULT_DESTINATION_DIR)),
        }
    }
}
