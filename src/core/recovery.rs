//! Copies selected files into a destination directory without overwriting anything.

use super::error::{CoreError, CoreResult};
use super::{RecoveryReport, SkippedFile};
use filetime::FileTime;
use std::ffi::{OsStr, OsString};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Upper bound on `name(n).ext` probes for a single file.
const MAX_COLLISION_ATTEMPTS: u32 = 10_000;

/// Copies files into a destination directory, giving colliding names a
/// numeric suffix.
pub struct RecoveryEngine {
    destination: PathBuf,
}

impl RecoveryEngine {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Copies every source into the destination, in input order.
    ///
    /// The destination (and its missing ancestors) is created first; failing
    /// to do so is the only error this returns. A source that has vanished
    /// or cannot be copied is recorded in [`RecoveryReport::skipped`] and the
    /// batch carries on.
    pub fn recover<P: AsRef<Path>>(&self, sources: &[P]) -> CoreResult<RecoveryReport> {
        fs::create_dir_all(&self.destination)
            .map_err(|e| CoreError::Io(e, self.destination.clone()))?;

        tracing::info!(
            "Recovering {} files into {}",
            sources.len(),
            self.destination.display()
        );

        let mut report = RecoveryReport::default();

        for source in sources {
            let source = source.as_ref();

            match source.try_exists() {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!("Source {} no longer exists", source.display());
                    report
                        .skipped
                        .push(SkippedFile::new(source, "source no longer exists"));
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Cannot access {}: {}", source.display(), e);
                    report.skipped.push(SkippedFile::new(source, e));
                    continue;
                }
            }

            match self.copy_one(source) {
                Ok(target) => {
                    tracing::debug!("Recovered {} to {}", source.display(), target.display());
                    report.recovered.push(target);
                }
                Err(e) => {
                    tracing::warn!("Failed to recover {}: {}", source.display(), e);
                    report.skipped.push(SkippedFile::new(source, e));
                }
            }
        }

        tracing::info!(
            "Recovery into {} complete: {} copied, {} skipped",
            self.destination.display(),
            report.recovered.len(),
            report.skipped.len()
        );

        Ok(report)
    }

    fn copy_one(&self, source: &Path) -> io::Result<PathBuf> {
        let file_name = source.file_name().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "source path has no file name")
        })?;

        // Opening a FIFO or device for reading can block indefinitely.
        ensure_regular_file(&fs::metadata(source)?)?;

        let mut reader = File::open(source)?;
        let metadata = reader.metadata()?;
        ensure_regular_file(&metadata)?;

        let (target, mut writer) = create_unique(&self.destination, file_name)?;

        if let Err(e) = io::copy(&mut reader, &mut writer) {
            drop(writer);
            // The partial copy is ours; nothing pre-existing lived at `target`.
            if let Err(cleanup) = fs::remove_file(&target) {
                tracing::warn!(
                    "Could not remove partial copy {}: {}",
                    target.display(),
                    cleanup
                );
            }
            return Err(e);
        }

        if let Err(e) = writer.set_permissions(metadata.permissions()) {
            tracing::debug!("Could not copy permissions to {}: {}", target.display(), e);
        }
        let mtime = FileTime::from_last_modification_time(&metadata);
        let atime = FileTime::from_last_access_time(&metadata);
        if let Err(e) = filetime::set_file_handle_times(&writer, Some(atime), Some(mtime)) {
            tracing::debug!("Could not copy timestamps to {}: {}", target.display(), e);
        }

        Ok(target)
    }
}

fn ensure_regular_file(metadata: &fs::Metadata) -> io::Result<()> {
    if metadata.is_file() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "source is not a regular file",
        ))
    }
}

/// Creates `dir/file_name`, or the first free `stem(n).ext` after it.
///
/// The file is opened with `create_new`, so the existence check and the
/// creation are a single atomic step.
fn create_unique(dir: &Path, file_name: &OsStr) -> io::Result<(PathBuf, File)> {
    for attempt in 0..=MAX_COLLISION_ATTEMPTS {
        let candidate = dir.join(disambiguated_name(file_name, attempt));
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!(
            "no free name for {} after {} attempts",
            Path::new(file_name).display(),
            MAX_COLLISION_ATTEMPTS
        ),
    ))
}

/// `report.pdf` → `report(3).pdf` for `attempt == 3`. Attempt 0 is the
/// original name. The suffix goes before the last extension only, so
/// `backup.tar.gz` becomes `backup.tar(1).gz` and `.bashrc` becomes
/// `.bashrc(1)`.
pub fn disambiguated_name(file_name: &OsStr, attempt: u32) -> OsString {
    if attempt == 0 {
        return file_name.to_os_string();
    }

    let as_path = Path::new(file_name);
    let stem = as_path.file_stem().unwrap_or(file_name);

    let mut name = stem.to_os_string();
    name.push(format!("({})", attempt));
    if let Some(extension) = as_path.extension() {
        name.push(".");
        name.push(extension);
    }
    name
}

/// Convenience wrapper around [`RecoveryEngine::recover`].
pub fn recover<P: AsRef<Path>>(sources: &[P], destination: &Path) -> CoreResult<RecoveryReport> {
    RecoveryEngine::new(destination).recover(sources)
}
