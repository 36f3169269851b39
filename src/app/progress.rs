//! Coarse, per-kind progress indicators.
//!
//! Each job kind has one counter that only ever holds `0` or `100`: it drops
//! to `0` when a job of that kind is submitted or fails, and jumps to `100`
//! when one finishes. Front ends poll it to decide when to fetch a result.

use super::jobs::JobKind;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};

pub const PROGRESS_IDLE: u8 = 0;
pub const PROGRESS_DONE: u8 = 100;

#[derive(Debug, Default)]
pub struct ProgressBoard {
    scan: AtomicU8,
    recover: AtomicU8,
}

/// A point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub scan: u8,
    pub recover: u8,
}

impl ProgressBoard {
    pub fn get(&self, kind: JobKind) -> u8 {
        self.slot(kind).load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            scan: self.get(JobKind::Scan),
            recover: self.get(JobKind::Recover),
        }
    }

    pub(crate) fn started(&self, kind: JobKind) {
        self.slot(kind).store(PROGRESS_IDLE, Ordering::Release);
    }

    pub(crate) fn completed(&self, kind: JobKind) {
        self.slot(kind).store(PROGRESS_DONE, Ordering::Release);
    }

    pub(crate) fn failed(&self, kind: JobKind) {
        self.slot(kind).store(PROGRESS_IDLE, Ordering::Release);
    }

    fn slot(&self, kind: JobKind) -> &AtomicU8 {
        match kind {
            JobKind::Scan => &self.scan,
            JobKind::Recover => &self.recover,
        }
    }
}
