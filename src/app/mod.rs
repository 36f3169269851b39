//! Background execution: the job registry, progress counters and the service front ends use.

pub mod jobs;
pub mod progress;
pub mod service;
pub mod tasks;

pub use jobs::{Job, JobId, JobKind, JobResult, JobStatus};
pub use progress::ProgressSnapshot;
pub use service::RecoveryService;
