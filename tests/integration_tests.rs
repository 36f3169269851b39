//! End-to-end tests driving scans and recoveries through `RecoveryService`,
//! the same way a front end would: submit, poll until finished, read the job.

use file_recovery::app::{tasks, Job, JobId, JobKind, JobStatus, RecoveryService};
use file_recovery::config::AppConfig;
use file_recovery::core::{CoreError, FileRecord, ScanCriteria, SortKey};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::timeout;
use tracing_test::traced_test;

/// Contains the test infrastructure.
mod helpers {
    use super::*;
    use chrono::NaiveDate;
    use filetime::{set_file_mtime, FileTime};

    const POLL_INTERVAL: Duration = Duration::from_millis(10);
    const JOB_TIMEOUT: Duration = Duration::from_secs(15);

    /// An isolated source tree, destination directory and service per test.
    pub struct TestHarness {
        pub service: RecoveryService,
        pub source: PathBuf,
        pub destination: PathBuf,
        _temp_dir: TempDir,
    }

    impl TestHarness {
        pub fn new() -> Self {
            Self::with_config(Self::test_config())
        }

        pub fn with_config(config: AppConfig) -> Self {
            let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
            let source = temp_dir.path().join("source");
            let destination = temp_dir.path().join("recovered");
            fs::create_dir_all(&source).expect("Failed to create source dir");

            Self {
                service: RecoveryService::new(&config).expect("Tests run inside a runtime"),
                source,
                destination,
                _temp_dir: temp_dir,
            }
        }

        /// A config that does not depend on the user's documents directory.
        pub fn test_config() -> AppConfig {
            AppConfig {
                max_concurrent_jobs: 4,
                poll_interval_ms: 10,
                default_destination: None,
                ..AppConfig::default()
            }
        }

        /// Creates a file of `len` bytes under the source tree, modified at
        /// midnight UTC on `date` (YYYY-MM-DD).
        pub fn create_file(&self, relative: &str, len: usize, date: &str) -> PathBuf {
            let path = self.source.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("Failed to create parent dir");
            }
            fs::write(&path, vec![b'r'; len]).expect("Failed to write file");

            let midnight = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .expect("Bad date in test")
                .and_hms_opt(0, 0, 0)
                .expect("Midnight exists")
                .and_utc()
                .timestamp();
            set_file_mtime(&path, FileTime::from_unix_time(midnight, 0))
                .expect("Failed to set mtime");
            path
        }

        pub async fn wait(&self, id: JobId) -> Job {
            timeout(JOB_TIMEOUT, self.service.wait_for(id, POLL_INTERVAL))
                .await
                .expect("Job did not finish in time")
                .expect("Job vanished while waiting")
        }

        pub async fn scan(&self, criteria: ScanCriteria) -> Job {
            let id = self.service.submit_scan(criteria);
            self.wait(id).await
        }

        pub async fn recover<P>(&self, sources: Vec<P>) -> Job
        where
            P: AsRef<Path> + Send + 'static,
        {
            let id = self
                .service
                .submit_recover(sources, self.destination.clone());
            self.wait(id).await
        }
    }

    pub fn file_names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    pub fn record_names(files: &[FileRecord]) -> Vec<String> {
        let paths: Vec<PathBuf> = files.iter().map(|f| f.path.clone()).collect();
        file_names(&paths)
    }

    /// Root ignores permission bits, so permission tests skip themselves.
    pub fn running_as_root() -> bool {
        #[cfg(unix)]
        {
            // SAFETY: geteuid has no side effects and cannot fail.
            unsafe { libc::geteuid() == 0 }
        }
        #[cfg(not(unix))]
        {
            false
        }
    }
}

use helpers::*;

#[tokio::test]
async fn test_extension_scan_returns_only_matching_file() {
    let harness = TestHarness::new();
    harness.create_file("a.txt", 1024, "2024-01-01");
    harness.create_file("b.log", 5 * 1024, "2024-06-01");

    let job = harness
        .scan(ScanCriteria::new(&harness.source).with_extension(".txt"))
        .await;

    assert_eq!(job.status, JobStatus::Done);
    let files = job.files().unwrap();
    assert_eq!(record_names(files), vec!["a.txt"]);
    assert_eq!(files[0].size_bytes, 1024);
}

#[tokio::test]
async fn test_full_scan_is_newest_first_or_largest_first() {
    let harness = TestHarness::new();
    harness.create_file("a.txt", 1024, "2024-01-01");
    harness.create_file("b.log", 5 * 1024, "2024-06-01");
    harness.create_file("deep/down/c.bin", 10, "2024-03-15");

    let by_time = harness.scan(ScanCriteria::new(&harness.source)).await;
    let by_size = harness
        .scan(ScanCriteria::new(&harness.source).sorted_by(SortKey::Size))
        .await;

    assert_eq!(
        record_names(by_time.files().unwrap()),
        vec!["b.log", "c.bin", "a.txt"]
    );
    assert_eq!(
        record_names(by_size.files().unwrap()),
        vec!["b.log", "a.txt", "c.bin"]
    );
}

#[tokio::test]
async fn test_size_and_date_filters_combine() {
    let harness = TestHarness::new();
    harness.create_file("small-new.txt", 10, "2024-06-01");
    harness.create_file("big-new.txt", 4096, "2024-06-02");
    harness.create_file("big-old.txt", 4096, "2023-01-01");

    let criteria = ScanCriteria::new(&harness.source)
        .with_size_range(Some(1000), None)
        .with_date_range(chrono::NaiveDate::from_ymd_opt(2024, 1, 1), None);
    let job = harness.scan(criteria).await;

    assert_eq!(record_names(job.files().unwrap()), vec!["big-new.txt"]);
}

#[tokio::test]
async fn test_inverted_size_range_matches_nothing() {
    let harness = TestHarness::new();
    harness.create_file("a.txt", 1024, "2024-01-01");

    let job = harness
        .scan(ScanCriteria::new(&harness.source).with_size_range(Some(2048), Some(10)))
        .await;

    assert_eq!(job.status, JobStatus::Done);
    assert!(job.files().unwrap().is_empty());
}

#[tokio::test]
async fn test_collisions_get_numbered_suffixes() {
    let harness = TestHarness::new();
    let source = harness.create_file("a.txt", 16, "2024-01-01");
    fs::create_dir_all(&harness.destination).unwrap();
    fs::write(harness.destination.join("a.txt"), "original").unwrap();

    let first = harness.recover(vec![source.clone()]).await;
    let second = harness.recover(vec![source]).await;

    assert_eq!(file_names(first.recovered().unwrap()), vec!["a(1).txt"]);
    assert_eq!(file_names(second.recovered().unwrap()), vec!["a(2).txt"]);
    assert_eq!(
        fs::read_to_string(harness.destination.join("a.txt")).unwrap(),
        "original"
    );
}

#[tokio::test]
async fn test_rerun_never_overwrites() {
    let harness = TestHarness::new();
    harness.create_file("docs/report.pdf", 300, "2024-02-02");
    harness.create_file("notes.md", 20, "2024-02-03");

    let scan = harness.scan(ScanCriteria::new(&harness.source)).await;
    let files = scan.files().unwrap().to_vec();

    let first = harness.recover(files.clone()).await;
    let second = harness.recover(files).await;

    let first: HashSet<PathBuf> = first.recovered().unwrap().iter().cloned().collect();
    let second: HashSet<PathBuf> = second.recovered().unwrap().iter().cloned().collect();
    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);
    assert!(first.is_disjoint(&second));
    assert!(second.contains(&harness.destination.join("report(1).pdf")));
}

#[tokio::test]
async fn test_vanished_source_is_skipped_not_fatal() {
    let harness = TestHarness::new();
    let kept = harness.create_file("kept.txt", 8, "2024-01-01");
    let doomed = harness.create_file("doomed.txt", 8, "2024-01-02");

    let scan = harness.scan(ScanCriteria::new(&harness.source)).await;
    fs::remove_file(&doomed).unwrap();
    let job = harness.recover(scan.files().unwrap().to_vec()).await;

    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(file_names(job.recovered().unwrap()), vec!["kept.txt"]);
    assert_eq!(job.skipped.len(), 1);
    assert_eq!(job.skipped[0].path, doomed);
    assert!(kept.exists());
}

#[tokio::test]
async fn test_unreadable_entries_do_not_fail_the_scan() {
    let harness = TestHarness::new();
    harness.create_file("good.txt", 32, "2024-05-05");

    #[cfg(unix)]
    std::os::unix::fs::symlink(harness.source.join("nowhere"), harness.source.join("dangling.txt"))
        .unwrap();

    let locked = harness.source.join("locked");
    let lock_dir = !running_as_root() && cfg!(unix);
    if lock_dir {
        harness.create_file("locked/hidden.txt", 32, "2024-05-06");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        }
    }

    let job = harness
        .scan(ScanCriteria::new(&harness.source).with_extension(".txt"))
        .await;

    #[cfg(unix)]
    if lock_dir {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
    }

    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(record_names(job.files().unwrap()), vec!["good.txt"]);
    if cfg!(unix) {
        assert!(!job.skipped.is_empty());
    }
}

#[tokio::test]
async fn test_missing_root_is_a_job_error() {
    let harness = TestHarness::new();

    let job = harness
        .scan(ScanCriteria::new(harness.source.join("does-not-exist")))
        .await;

    assert_eq!(job.status, JobStatus::Error);
    assert!(job.result.is_none());
    assert!(job.error_message.is_some());
    assert_eq!(harness.service.progress(JobKind::Scan), 0);
}

#[tokio::test]
async fn test_unknown_job_id_is_not_found() {
    let harness = TestHarness::new();
    harness.scan(ScanCriteria::new(&harness.source)).await;

    let never_issued: JobId = "3fa85f64-5717-4562-b3fc-2c963f66afa6".parse().unwrap();

    assert!(matches!(
        harness.service.poll(never_issued),
        Err(CoreError::JobNotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_jobs_all_finish_with_unique_ids() {
    let harness = TestHarness::new();
    for i in 0..20 {
        harness.create_file(&format!("dir{}/file{}.dat", i % 4, i), i + 1, "2024-04-04");
    }

    let scans: Vec<JobId> = (0..6)
        .map(|_| harness.service.submit_scan(ScanCriteria::new(&harness.source)))
        .collect();
    let recovers: Vec<JobId> = (0..3)
        .map(|i| {
            let source = harness.source.join(format!("dir{}/file{}.dat", i, i));
            harness
                .service
                .submit_recover(vec![source], harness.destination.clone())
        })
        .collect();

    let unique: HashSet<JobId> = scans.iter().chain(&recovers).copied().collect();
    assert_eq!(unique.len(), 9);

    for id in scans {
        let job = harness.wait(id).await;
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.files().unwrap().len(), 20);
    }
    for id in recovers {
        let job = harness.wait(id).await;
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.recovered().unwrap().len(), 1);
    }

    assert_eq!(harness.service.progress(JobKind::Scan), 100);
    assert_eq!(harness.service.progress(JobKind::Recover), 100);
}

#[tokio::test]
async fn test_old_jobs_are_evicted_beyond_retention_limit() {
    let harness = TestHarness::with_config(AppConfig {
        max_finished_jobs: 2,
        ..TestHarness::test_config()
    });

    let mut ids = Vec::new();
    for _ in 0..3 {
        let id = harness.service.submit_scan(ScanCriteria::new(&harness.source));
        harness.wait(id).await;
        ids.push(id);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    // Pruning happens on submission.
    let latest = harness.service.submit_scan(ScanCriteria::new(&harness.source));

    assert!(harness.service.poll(ids[0]).is_err());
    assert!(harness.service.poll(ids[1]).is_ok());
    assert!(harness.service.poll(ids[2]).is_ok());
    assert!(harness.service.poll(latest).is_ok());
}

#[test]
#[traced_test]
fn test_scan_task_logs_its_outcome() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("x.txt"), "x").unwrap();

    let output = tasks::run_scan(ScanCriteria::new(dir.path())).unwrap();

    assert!(matches!(output.result, file_recovery::app::JobResult::Files(ref files) if files.len() == 1));
    assert!(logs_contain("Starting scan of"));
    assert!(logs_contain("1 matches, 0 entries skipped"));
}
