//! Shred orchestration - the single entry point for callers
//!
//! Flow:
//! 1. Refuse non-regular, oversized or busy targets before touching them
//! 2. Lock the file and load (or start) its checkpoint
//! 3. Checkpoint the working name, then rename the original to it, once
//! 4. Overwrite passes, each checkpointed
//! 5. Rename chain, each checkpointed
//! 6. Truncate, remove checkpoint, remove file
//!
//! Every step after 2 starts from what the checkpoint says, so calling
//! `shred` again after a crash picks up at the first unfinished step. A
//! checkpoint naming a file that does not exist yet means the crash hit
//! between the checkpoint write and its rename; the rename is finished
//! before carrying on.
//!
//! A symbolic link is followed: the file it points at is shredded, then the
//! link itself is removed.

use super::checkpoint::{
    CheckpointStore, ShredJob, parent_dir, rename_noreplace, sync_dir, with_suffix,
};
use super::error::{Result, ShredError};
use super::guard::{self, FileLock};
use super::obfuscate::{finalize, obfuscate};
use super::overwrite::overwrite;
use crate::config::ShredConfig;
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Same limit as the Linux kernel's path walk
const MAX_SYMLINK_HOPS: usize = 40;

/// Shred `path` with `passes` overwrite passes using the default settings
pub fn shred(path: impl AsRef<Path>, passes: u64) -> Result<()> {
    Shredder::new(ShredConfig::default())?.shred(path, passes)
}

/// Runs shred jobs with a fixed configuration
#[derive(Debug, Clone)]
pub struct Shredder {
    config: ShredConfig,
    store: CheckpointStore,
}

impl Shredder {
    /// Build a shredder; the configuration is validated up front
    pub fn new(config: ShredConfig) -> Result<Self> {
        config.validate().map_err(ShredError::InvalidConfig)?;
        let store = CheckpointStore::new(config.checkpoint_suffix.clone());
        Ok(Self { config, store })
    }

    /// Active configuration
    pub fn config(&self) -> &ShredConfig {
        &self.config
    }

    /// Checkpoint store, for inspecting in-flight jobs
    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Securely delete the file the caller knows as `path`
    ///
    /// Safe to call again after an interruption: the job resumes from its
    /// checkpoint even though the file no longer lives at `path`. When
    /// `path` is a symbolic link, the file it resolves to is shredded and
    /// the link is removed afterwards.
    pub fn shred(&self, path: impl AsRef<Path>, passes: u64) -> Result<()> {
        let path = path.as_ref();

        match fs::symlink_metadata(path) {
            Ok(metadata) if metadata.file_type().is_symlink() => {
                let target = resolve_symlink(path)?;
                info!(
                    link = %path.display(),
                    target = %target.display(),
                    "Shredding symlink target"
                );

                self.shred_file(&target, passes)?;

                fs::remove_file(path).map_err(|e| ShredError::io("remove symlink", path, e))?;
                sync_dir(parent_dir(path));
                Ok(())
            }
            _ => self.shred_file(path, passes),
        }
    }

    fn shred_file(&self, original: &Path, passes: u64) -> Result<()> {
        info!(path = %original.display(), passes, "Starting shred");

        let (mut job, lock) = self.claim(original)?;

        debug!(
            path = %original.display(),
            phase = ?job.phase(
                passes,
                self.config.rename_rounds,
                &self.config.working_suffix,
                self.config.suffix_len,
            ),
            passes_completed = job.passes_completed(),
            "Shred job claimed"
        );

        overwrite(&mut job, passes, &lock, &self.store)?;
        obfuscate(
            &mut job,
            self.config.rename_rounds,
            self.config.suffix_len,
            &self.config.working_suffix,
            &lock,
            &self.store,
        )?;
        finalize(&job, &lock, &self.store)?;

        lock.release();
        info!(path = %original.display(), passes, "Shred complete");
        Ok(())
    }

    /// Take ownership of the job for `original`
    ///
    /// Returns the job positioned at its working path together with the
    /// exclusive lock on that file.
    fn claim(&self, original: &Path) -> Result<(ShredJob, FileLock)> {
        match fs::symlink_metadata(original) {
            Ok(metadata) => self.claim_fresh(original, &metadata),
            Err(e) if e.kind() == io::ErrorKind::NotFound => self.claim_resumed(original),
            Err(e) => Err(ShredError::io("stat", original, e)),
        }
    }

    /// The file is still at the caller's path: check it, lock it, rename it
    fn claim_fresh(&self, original: &Path, metadata: &Metadata) -> Result<(ShredJob, FileLock)> {
        self.check_target(original, metadata)?;

        if guard::is_locked(original) {
            warn!(path = %original.display(), "File is locked by another process");
            return Err(ShredError::Busy {
                path: original.to_path_buf(),
            });
        }

        let lock = FileLock::try_acquire(original)?;
        // The file may have been shredded and removed between stat and lock
        lock.verify(original)?;

        let working = with_suffix(original, &self.config.working_suffix);

        let mut job = match self.store.load(original)? {
            Some(job) => job,
            None => ShredJob::new(original),
        };

        match job.current_path() {
            None => {}
            Some(current) if current == working && !path_exists(&working)? => {
                info!(
                    path = %original.display(),
                    working = %working.display(),
                    "Redoing interrupted move to working path"
                );
            }
            Some(current) => {
                // A checkpoint that has moved on means this is not the file it tracks
                return Err(ShredError::StaleCheckpoint {
                    original: original.to_path_buf(),
                    current: current.to_path_buf(),
                });
            }
        }

        if path_exists(&working)? {
            warn!(working = %working.display(), "Working path is already taken");
            return Err(ShredError::io(
                "rename",
                &working,
                io::Error::from(io::ErrorKind::AlreadyExists),
            ));
        }

        job.set_current_path(&working);
        self.store.save(&job)?;

        if let Err(e) = rename_noreplace(original, &working) {
            // Nothing moved, so nothing to resume
            if let Err(cleanup) = self.store.remove(original) {
                warn!(path = %original.display(), error = %cleanup, "Failed to drop checkpoint");
            }
            return Err(ShredError::io("rename", original, e));
        }
        sync_dir(parent_dir(&working));

        info!(
            path = %original.display(),
            working = %working.display(),
            "Moved file to working path"
        );
        Ok((job, lock))
    }

    /// The caller's path is gone: pick the job up from its checkpoint
    fn claim_resumed(&self, original: &Path) -> Result<(ShredJob, FileLock)> {
        let not_found = || ShredError::NotFound {
            path: original.to_path_buf(),
        };

        let job = self.store.load(original)?.ok_or_else(not_found)?;
        let current = job.current_path().ok_or_else(not_found)?.to_path_buf();
        let located = self.locate(&job, &current)?.ok_or_else(not_found)?;

        let metadata =
            fs::symlink_metadata(&located).map_err(|e| ShredError::io("stat", &located, e))?;
        self.check_target(&located, &metadata)?;

        let lock = FileLock::try_acquire_for(&located, original)?;

        // Another shredder may have advanced the job before we got the lock
        let job = self.store.load(original)?.ok_or_else(not_found)?;
        let current = job.current_path().ok_or_else(not_found)?.to_path_buf();

        if !path_exists(&current)? {
            let previous = self.locate(&job, &current)?.ok_or_else(not_found)?;
            lock.verify(&previous)?;

            rename_noreplace(&previous, &current)
                .map_err(|e| ShredError::io("rename", &previous, e))?;
            sync_dir(parent_dir(&current));

            info!(
                from = %previous.display(),
                to = %current.display(),
                "Finished interrupted rename"
            );
        }
        lock.verify(&current)?;

        info!(
            path = %original.display(),
            working = %current.display(),
            passes_completed = job.passes_completed(),
            "Resuming interrupted shred"
        );
        Ok((job, lock))
    }

    /// Where the file for `job` is on disk: at `current`, or one rename
    /// behind it when the crash hit between checkpoint and rename
    fn locate(&self, job: &ShredJob, current: &Path) -> Result<Option<PathBuf>> {
        if path_exists(current)? {
            return Ok(Some(current.to_path_buf()));
        }

        match job.previous_path(&self.config.working_suffix, self.config.suffix_len) {
            Some(previous) if path_exists(&previous)? => Ok(Some(previous)),
            _ => Ok(None),
        }
    }

    /// Refuse anything that is not a regular file within the size bound
    fn check_target(&self, path: &Path, metadata: &Metadata) -> Result<()> {
        if !metadata.file_type().is_file() {
            return Err(ShredError::NotRegularFile {
                path: path.to_path_buf(),
            });
        }

        if metadata.len() > self.config.max_file_size {
            warn!(
                path = %path.display(),
                size = metadata.len(),
                limit = self.config.max_file_size,
                "File size exceeds the allowed limit"
            );
            return Err(ShredError::SizeExceeded {
                path: path.to_path_buf(),
                size: metadata.len(),
                limit: self.config.max_file_size,
            });
        }

        Ok(())
    }
}

fn path_exists(path: &Path) -> Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ShredError::io("stat", path, e)),
    }
}

/// Follow `link` to the first path that is not a symbolic link
///
/// Unlike `fs::canonicalize` this also resolves a link whose target is
/// gone, which is where an interrupted job for the target left it.
fn resolve_symlink(link: &Path) -> Result<PathBuf> {
    let mut resolved = link.to_path_buf();

    for _ in 0..MAX_SYMLINK_HOPS {
        match fs::symlink_metadata(&resolved) {
            Ok(metadata) if metadata.file_type().is_symlink() => {
                let target = fs::read_link(&resolved)
                    .map_err(|e| ShredError::io("read symlink", &resolved, e))?;
                resolved = parent_dir(&resolved).join(target);
            }
            Ok(_) => return Ok(resolved),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(resolved),
            Err(e) => return Err(ShredError::io("stat", &resolved, e)),
        }
    }

    Err(ShredError::io(
        "resolve symlink",
        link,
        io::Error::other("too many levels of symbolic links"),
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn small_config() -> ShredConfig {
        ShredConfig {
            max_file_size: 1024,
            ..ShredConfig::default()
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ShredConfig {
            suffix_len: 0,
            ..ShredConfig::default()
        };
        assert!(matches!(
            Shredder::new(config),
            Err(ShredError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_size_bound_is_inclusive() {
        let dir = TempDir::new().unwrap();
        let shredder = Shredder::new(small_config()).unwrap();

        let at_limit = dir.path().join("at_limit");
        fs::write(&at_limit, vec![7u8; 1024]).unwrap();
        shredder.shred(&at_limit, 1).unwrap();
        assert!(!at_limit.exists());

        let over = dir.path().join("over");
        fs::write(&over, vec![7u8; 1025]).unwrap();
        let err = shredder.shred(&over, 1).unwrap_err();
        assert!(matches!(err, ShredError::SizeExceeded { size: 1025, .. }));

        // Rejected before any mutation
        assert_eq!(fs::read(&over).unwrap(), vec![7u8; 1025]);
        assert!(!shredder.store().path_for(&over).exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_directory_is_refused() {
        let dir = TempDir::new().unwrap();
        let shredder = Shredder::new(ShredConfig::default()).unwrap();

        let err = shredder.shred(dir.path(), 1).unwrap_err();
        assert!(matches!(err, ShredError::NotRegularFile { .. }));
        assert!(dir.path().exists());
    }

    #[test]
    fn test_stale_checkpoint_is_reported() {
        let dir = TempDir::new().unwrap();
        let shredder = Shredder::new(ShredConfig::default()).unwrap();
        let original = dir.path().join("secret.txt");
        fs::write(&original, b"new file, old checkpoint").unwrap();

        let working = with_suffix(&original, ".tmp");
        fs::write(&working, b"file the checkpoint tracks").unwrap();

        let mut job = ShredJob::new(&original);
        job.set_current_path(&working);
        shredder.store().save(&job).unwrap();

        let err = shredder.shred(&original, 1).unwrap_err();
        assert!(matches!(err, ShredError::StaleCheckpoint { .. }));
        assert_eq!(fs::read(&original).unwrap(), b"new file, old checkpoint");
        assert_eq!(fs::read(&working).unwrap(), b"file the checkpoint tracks");
    }

    #[test]
    fn test_interrupted_move_to_working_path_is_redone() {
        let dir = TempDir::new().unwrap();
        let shredder = Shredder::new(ShredConfig::default()).unwrap();
        let original = dir.path().join("secret.txt");
        fs::write(&original, b"checkpointed, never moved").unwrap();

        let mut job = ShredJob::new(&original);
        job.set_current_path(with_suffix(&original, ".tmp"));
        shredder.store().save(&job).unwrap();

        shredder.shred(&original, 1).unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_taken_working_path_is_left_alone() {
        let dir = TempDir::new().unwrap();
        let shredder = Shredder::new(ShredConfig::default()).unwrap();
        let original = dir.path().join("report");
        let working = with_suffix(&original, ".tmp");
        fs::write(&original, b"secret").unwrap();
        fs::write(&working, b"unrelated user data").unwrap();

        let err = shredder.shred(&original, 1).unwrap_err();
        match err {
            ShredError::Io { ref source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::AlreadyExists)
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(fs::read(&original).unwrap(), b"secret");
        assert_eq!(fs::read(&working).unwrap(), b"unrelated user data");
        assert!(!shredder.store().path_for(&original).exists());
    }

    #[test]
    fn test_resolve_symlink_follows_chain_and_dangling_links() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("target");
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        std::os::unix::fs::symlink("target", &first).unwrap();
        std::os::unix::fs::symlink(&first, &second).unwrap();

        // Target missing: still resolves to where it would be
        assert_eq!(resolve_symlink(&second).unwrap(), target);

        fs::write(&target, b"x").unwrap();
        assert_eq!(resolve_symlink(&second).unwrap(), target);
        assert_eq!(resolve_symlink(&target).unwrap(), target);
    }

    #[test]
    fn test_symlink_loop_is_an_error() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::os::unix::fs::symlink(&b, &a).unwrap();
        std::os::unix::fs::symlink(&a, &b).unwrap();

        let shredder = Shredder::new(ShredConfig::default()).unwrap();
        let err = shredder.shred(&a, 1).unwrap_err();
        assert!(matches!(err, ShredError::Io { .. }));
        assert!(fs::symlink_metadata(&a).is_ok());
    }

    #[test]
    fn test_checkpoint_without_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let shredder = Shredder::new(ShredConfig::default()).unwrap();
        let original = dir.path().join("secret.txt");

        let mut job = ShredJob::new(&original);
        job.set_current_path(with_suffix(&original, ".tmp.abcdefghijkl"));
        shredder.store().save(&job).unwrap();

        let err = shredder.shred(&original, 1).unwrap_err();
        assert!(matches!(err, ShredError::NotFound { .. }));
        // Left in place for inspection
        assert!(shredder.store().path_for(&original).exists());
    }

    #[test]
    fn test_custom_suffixes_are_honoured() {
        let dir = TempDir::new().unwrap();
        let config = ShredConfig {
            working_suffix: ".work".to_string(),
            checkpoint_suffix: ".progress".to_string(),
            rename_rounds: 3,
            suffix_len: 4,
            ..ShredConfig::default()
        };
        let shredder = Shredder::new(config).unwrap();
        let original = dir.path().join("secret.txt");
        fs::write(&original, b"custom").unwrap();

        shredder.shred(&original, 2).unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
