//! Advisory locking used to keep two shredders off the same file
//!
//! Unix uses `flock(2)`: the lock belongs to the open file description, so
//! it follows the inode through every rename of the working file. Other
//! platforms fall back to a companion `<original>.lock` file created with
//! create-new semantics, which gives the same "fail immediately if held"
//! contract for cooperating shredders. The companion file is named after the
//! path the caller supplied, like the checkpoint, so it stays put while the
//! working file is renamed.

use super::error::{Result, ShredError};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::fcntl::{Flock, FlockArg};

#[cfg(not(unix))]
use super::checkpoint::with_suffix;

/// Report whether another holder has an exclusive lock on `path`
///
/// Shredders always hold their lock exclusively, so the probe asks for a
/// shared lock: it still fails against any exclusive holder, but two
/// probes racing each other never both report busy. The probe lock is
/// released before returning. A file that cannot be opened is reported as
/// not locked; the caller hits the real error when it opens the file itself.
#[cfg(unix)]
pub fn is_locked(path: &Path) -> bool {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(_) => return false,
    };

    match Flock::lock(file, FlockArg::LockSharedNonblock) {
        Ok(probe) => {
            drop(probe);
            false
        }
        Err((_, errno)) if errno == Errno::EWOULDBLOCK => true,
        Err((_, errno)) => {
            warn!(path = %path.display(), error = %errno, "Lock probe failed");
            false
        }
    }
}

/// Report whether another holder has an exclusive lock on the job for the
/// caller-supplied `path`
#[cfg(not(unix))]
pub fn is_locked(path: &Path) -> bool {
    with_suffix(path, ".lock").exists()
}

/// Exclusive lock held on the file being shredded for the rest of the run
///
/// Released on drop.
pub struct FileLock {
    path: PathBuf,
    #[cfg(unix)]
    file: Flock<File>,
    #[cfg(not(unix))]
    sentinel: PathBuf,
}

impl FileLock {
    /// Take the lock on a file that is still at the caller's path
    pub fn try_acquire(path: &Path) -> Result<Self> {
        Self::try_acquire_for(path, path)
    }

    /// Take the lock on `path`, the current location of the job for
    /// `original`, without blocking
    ///
    /// The file is opened for writing, so an unwritable target fails here,
    /// before anything has been renamed. A lock held elsewhere yields
    /// [`ShredError::Busy`].
    pub fn try_acquire_for(path: &Path, original: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| ShredError::io("open for writing", path, e))?;

        #[cfg(unix)]
        {
            let _ = original;
            let file = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
                Ok(file) => file,
                Err((_, errno)) if errno == Errno::EWOULDBLOCK => {
                    return Err(ShredError::Busy {
                        path: path.to_path_buf(),
                    });
                }
                Err((_, errno)) => {
                    return Err(ShredError::io("lock", path, errno.into()));
                }
            };

            debug!(path = %path.display(), "Acquired exclusive lock");
            Ok(Self {
                path: path.to_path_buf(),
                file,
            })
        }

        #[cfg(not(unix))]
        {
            drop(file);
            let sentinel = with_suffix(original, ".lock");
            match OpenOptions::new().write(true).create_new(true).open(&sentinel) {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    return Err(ShredError::Busy {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) => return Err(ShredError::io("create lock file", &sentinel, e)),
            }

            debug!(path = %path.display(), "Acquired exclusive lock");
            Ok(Self {
                path: path.to_path_buf(),
                sentinel,
            })
        }
    }

    /// Path the lock was taken on
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Confirm `path` still names the file this lock covers
    ///
    /// A replaced or vanished working file means someone else has taken
    /// over, so the run must stop rather than write into an unknown file.
    pub fn verify(&self, path: &Path) -> Result<()> {
        let on_disk =
            std::fs::symlink_metadata(path).map_err(|e| ShredError::io("stat", path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;

            let held = self
                .file
                .metadata()
                .map_err(|e| ShredError::io("stat locked file", &self.path, e))?;

            if held.dev() != on_disk.dev() || held.ino() != on_disk.ino() {
                warn!(
                    path = %path.display(),
                    locked = %self.path.display(),
                    "Working file was replaced by another process"
                );
                return Err(ShredError::Busy {
                    path: path.to_path_buf(),
                });
            }
        }

        #[cfg(not(unix))]
        {
            if !on_disk.is_file() || !self.sentinel.exists() {
                return Err(ShredError::Busy {
                    path: path.to_path_buf(),
                });
            }
        }

        Ok(())
    }

    /// Release the lock explicitly
    pub fn release(self) {
        debug!(path = %self.path.display(), "Released exclusive lock");
        drop(self);
    }
}

#[cfg(not(unix))]
impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.sentinel);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn scratch(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, b"payload").unwrap();
        path
    }

    #[test]
    fn test_unlocked_file_reports_free() {
        let dir = TempDir::new().unwrap();
        let path = scratch(&dir, "free");
        assert!(!is_locked(&path));
        // Probing must not leave a lock behind
        assert!(!is_locked(&path));
    }

    #[test]
    fn test_missing_file_reports_free() {
        let dir = TempDir::new().unwrap();
        assert!(!is_locked(&dir.path().join("absent")));
    }

    #[test]
    fn test_foreign_lock_is_detected() {
        let dir = TempDir::new().unwrap();
        let path = scratch(&dir, "held");

        let holder = File::open(&path).unwrap();
        let held = Flock::lock(holder, FlockArg::LockExclusiveNonblock).unwrap();

        assert!(is_locked(&path));
        assert!(matches!(
            FileLock::try_acquire(&path),
            Err(ShredError::Busy { .. })
        ));

        drop(held);
        assert!(!is_locked(&path));
    }

    #[test]
    fn test_lock_excludes_second_acquire_until_released() {
        let dir = TempDir::new().unwrap();
        let path = scratch(&dir, "exclusive");

        let lock = FileLock::try_acquire(&path).unwrap();
        assert_eq!(lock.path(), path.as_path());
        assert!(is_locked(&path));
        assert!(FileLock::try_acquire(&path).is_err());

        lock.release();
        let again = FileLock::try_acquire(&path).unwrap();
        drop(again);
    }

    #[test]
    fn test_lock_follows_renames() {
        let dir = TempDir::new().unwrap();
        let path = scratch(&dir, "moving");
        let renamed = dir.path().join("moving.tmp");

        let lock = FileLock::try_acquire(&path).unwrap();
        fs::rename(&path, &renamed).unwrap();

        assert!(is_locked(&renamed));
        assert!(lock.verify(&renamed).is_ok());
    }

    #[test]
    fn test_resumed_acquire_conflicts_with_fresh_lock() {
        let dir = TempDir::new().unwrap();
        let original = scratch(&dir, "job");
        let working = dir.path().join("job.tmp");

        let lock = FileLock::try_acquire(&original).unwrap();
        fs::rename(&original, &working).unwrap();

        assert!(matches!(
            FileLock::try_acquire_for(&working, &original),
            Err(ShredError::Busy { .. })
        ));
        drop(lock);
        assert!(FileLock::try_acquire_for(&working, &original).is_ok());
    }

    #[test]
    fn test_verify_detects_replacement() {
        let dir = TempDir::new().unwrap();
        let path = scratch(&dir, "swapped");

        let lock = FileLock::try_acquire(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert!(matches!(lock.verify(&path), Err(ShredError::NotFound { .. })));

        fs::write(&path, b"impostor").unwrap();
        assert!(matches!(lock.verify(&path), Err(ShredError::Busy { .. })));
    }

    #[test]
    fn test_unwritable_file_fails_to_lock() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = scratch(&dir, "readonly");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o444)).unwrap();

        // root ignores permission bits
        if OpenOptions::new().write(true).open(&path).is_ok() {
            return;
        }
        assert!(matches!(
            FileLock::try_acquire(&path),
            Err(ShredError::Io { .. })
        ));
    }
}
