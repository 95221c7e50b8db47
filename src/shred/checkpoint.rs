//! Checkpoint persistence for resumable shredding
//!
//! A [`ShredJob`] is the only durable state. It is stored as a small JSON
//! document next to the file, keyed by the path the caller originally
//! supplied, so a job stays resumable after any number of renames.

use super::error::{Result, ShredError};
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Checkpoint records are three short fields; anything larger is not ours
pub const MAX_CHECKPOINT_SIZE: u64 = 64 * 1024;

/// Append a literal suffix to a path (`/a/b.txt` + `.tmp` = `/a/b.txt.tmp`)
pub fn with_suffix(path: &Path, suffix: impl AsRef<OsStr>) -> PathBuf {
    let mut joined = path.as_os_str().to_os_string();
    joined.push(suffix);
    PathBuf::from(joined)
}

/// Progress of a single shred, as persisted between invocations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShredJob {
    passes_completed: u64,
    current_path: PathBuf,
    original_path: PathBuf,
}

/// Lifecycle phase derived from a [`ShredJob`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    /// Not renamed yet
    Uninitiated,
    /// Renamed, overwrite passes outstanding
    Working,
    /// All passes written, no obfuscation rename yet
    Overwritten,
    /// Rename chain in progress
    Obfuscating,
    /// Renames done; truncate and delete outstanding
    Finalizing,
}

impl ShredJob {
    /// Fresh job for a file that has not been touched yet
    pub fn new(original_path: impl Into<PathBuf>) -> Self {
        Self {
            passes_completed: 0,
            current_path: PathBuf::new(),
            original_path: original_path.into(),
        }
    }

    /// Path the caller supplied
    pub fn original_path(&self) -> &Path {
        &self.original_path
    }

    /// Where the file lives now, or `None` before the first rename
    pub fn current_path(&self) -> Option<&Path> {
        if self.current_path.as_os_str().is_empty() {
            None
        } else {
            Some(&self.current_path)
        }
    }

    /// Number of overwrite passes durably written
    pub fn passes_completed(&self) -> u64 {
        self.passes_completed
    }

    /// Record a rename of the working file
    pub fn set_current_path(&mut self, path: impl Into<PathBuf>) {
        self.current_path = path.into();
    }

    /// Record that `passes` passes are complete. Never moves backwards.
    pub fn record_pass(&mut self, passes: u64) {
        self.passes_completed = self.passes_completed.max(passes);
    }

    /// Count the obfuscation renames already applied, by reading them back
    /// off the working path (`<original><working_suffix>(.<suffix>)*`)
    pub fn renames_completed(&self, working_suffix: &str, suffix_len: usize) -> u32 {
        let Some(current) = self.current_path() else {
            return 0;
        };

        let working = with_suffix(&self.original_path, working_suffix);
        let working = working.as_os_str().as_encoded_bytes();
        let current = current.as_os_str().as_encoded_bytes();

        match current.strip_prefix(working) {
            Some(chain) => (chain.len() / (suffix_len + 1)) as u32,
            None => 0,
        }
    }

    /// Name the working file had before the latest obfuscation rename
    ///
    /// The checkpoint is written before each rename, so after a crash the
    /// file may still be here rather than at `current_path`. `None` before
    /// the first obfuscation rename or when the chain is malformed.
    pub fn previous_path(&self, working_suffix: &str, suffix_len: usize) -> Option<PathBuf> {
        let current = self.current_path()?;
        let working = with_suffix(&self.original_path, working_suffix);
        let chain = current
            .as_os_str()
            .as_encoded_bytes()
            .strip_prefix(working.as_os_str().as_encoded_bytes())?;

        let step = suffix_len + 1;
        if chain.is_empty() || chain.len() % step != 0 {
            return None;
        }

        // The chain is ours, so it is ASCII
        let kept = std::str::from_utf8(&chain[..chain.len() - step]).ok()?;
        Some(with_suffix(&working, kept))
    }

    /// Derive the lifecycle phase for the given targets
    pub fn phase(
        &self,
        required_passes: u64,
        rename_rounds: u32,
        working_suffix: &str,
        suffix_len: usize,
    ) -> JobPhase {
        if self.current_path().is_none() {
            return JobPhase::Uninitiated;
        }
        if self.passes_completed < required_passes {
            return JobPhase::Working;
        }
        match self.renames_completed(working_suffix, suffix_len) {
            0 if rename_rounds > 0 => JobPhase::Overwritten,
            done if done < rename_rounds => JobPhase::Obfuscating,
            _ => JobPhase::Finalizing,
        }
    }
}

/// Reads and atomically replaces checkpoint records
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    suffix: String,
}

impl CheckpointStore {
    /// Store whose records live at `<original><suffix>`
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }

    /// Location of the record for `original`
    pub fn path_for(&self, original: &Path) -> PathBuf {
        with_suffix(original, &self.suffix)
    }

    /// Load the record for `original`; `Ok(None)` when there is none
    pub fn load(&self, original: &Path) -> Result<Option<ShredJob>> {
        let path = self.path_for(original);
        debug!(path = %path.display(), "Loading shred checkpoint");

        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ShredError::io("stat checkpoint", &path, e)),
        };

        if metadata.len() > MAX_CHECKPOINT_SIZE {
            return Err(ShredError::CorruptCheckpoint {
                path,
                reason: format!(
                    "{} bytes exceeds the {} byte limit",
                    metadata.len(),
                    MAX_CHECKPOINT_SIZE
                ),
            });
        }

        let contents =
            fs::read_to_string(&path).map_err(|e| ShredError::io("read checkpoint", &path, e))?;

        let job: ShredJob = serde_json::from_str(&contents).map_err(|e| {
            warn!(path = %path.display(), error = %e, "Failed to deserialize shred checkpoint");
            ShredError::CorruptCheckpoint {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;

        if job.original_path != original {
            return Err(ShredError::CorruptCheckpoint {
                path,
                reason: format!("record belongs to {}", job.original_path.display()),
            });
        }

        info!(
            path = %path.display(),
            passes_completed = job.passes_completed,
            current_path = %job.current_path.display(),
            "Shred checkpoint loaded"
        );
        Ok(Some(job))
    }

    /// Replace the record for `job` in a single atomic step
    ///
    /// The document is written to a temporary file in the same directory,
    /// synced, then renamed over the record, so readers see either the old
    /// record or the new one.
    pub fn save(&self, job: &ShredJob) -> Result<()> {
        let path = self.path_for(&job.original_path);
        let parent = parent_dir(&path);

        let json = serde_json::to_vec(job).map_err(|e| ShredError::Io {
            op: "serialize checkpoint",
            path: path.clone(),
            source: io::Error::other(e),
        })?;

        let mut temp_file = tempfile::Builder::new()
            .prefix(".kc-shred")
            .tempfile_in(parent)
            .map_err(|e| ShredError::io("create checkpoint temp file in", parent, e))?;

        temp_file
            .write_all(&json)
            .map_err(|e| ShredError::io("write checkpoint temp file", temp_file.path(), e))?;
        temp_file
            .flush()
            .map_err(|e| ShredError::io("flush checkpoint temp file", temp_file.path(), e))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| ShredError::io("sync checkpoint temp file", temp_file.path(), e))?;

        temp_file
            .persist(&path)
            .map_err(|e| ShredError::io("persist checkpoint", &path, e.error))?;

        sync_dir(parent);

        debug!(
            path = %path.display(),
            passes_completed = job.passes_completed,
            current_path = %job.current_path.display(),
            "Shred checkpoint saved"
        );
        Ok(())
    }

    /// Delete the record for `original`. Missing records are not an error.
    pub fn remove(&self, original: &Path) -> Result<()> {
        let path = self.path_for(original);
        match fs::remove_file(&path) {
            Ok(()) => {
                sync_dir(parent_dir(&path));
                debug!(path = %path.display(), "Shred checkpoint removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ShredError::io("remove checkpoint", &path, e)),
        }
    }
}

/// Directory containing `path`; `.` for bare file names
pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Best-effort fsync of a directory so renames inside it are durable
pub(crate) fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    {
        if let Ok(handle) = fs::File::open(dir) {
            let _ = handle.sync_all();
        }
    }

    #[cfg(not(unix))]
    let _ = dir;
}

/// Rename `from` to `to`, failing with `AlreadyExists` instead of replacing
/// whatever already lives at `to`
#[cfg(all(target_os = "linux", target_env = "gnu"))]
pub(crate) fn rename_noreplace(from: &Path, to: &Path) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::fcntl::{AT_FDCWD, RenameFlags, renameat2};

    match renameat2(AT_FDCWD, from, AT_FDCWD, to, RenameFlags::RENAME_NOREPLACE) {
        Ok(()) => Ok(()),
        // Filesystem without RENAME_NOREPLACE support
        Err(errno) if errno == Errno::EINVAL || errno == Errno::ENOSYS => {
            rename_if_absent(from, to)
        }
        Err(errno) => Err(errno.into()),
    }
}

/// Rename `from` to `to`, failing with `AlreadyExists` instead of replacing
/// whatever already lives at `to`
#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
pub(crate) fn rename_noreplace(from: &Path, to: &Path) -> io::Result<()> {
    rename_if_absent(from, to)
}

fn rename_if_absent(from: &Path, to: &Path) -> io::Result<()> {
    match fs::symlink_metadata(to) {
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", to.display()),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => fs::rename(from, to),
        Err(e) => Err(e),
    }
}
