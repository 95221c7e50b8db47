//! Rename chain, truncate and final removal

use super::checkpoint::{
    CheckpointStore, ShredJob, parent_dir, rename_noreplace, sync_dir, with_suffix,
};
use super::error::{Result, ShredError};
use super::guard::FileLock;
use crate::utils::random_suffix;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use tracing::{debug, info, warn};

fn working_path(job: &ShredJob) -> Result<PathBuf> {
    job.current_path()
        .map(|path| path.to_path_buf())
        .ok_or_else(|| ShredError::NotFound {
            path: job.original_path().to_path_buf(),
        })
}

/// Rename the working file through `rename_rounds` random names
///
/// Each round checkpoints the new name, then renames the file to it by
/// appending `.<suffix>` to the current name. An existing file under the new
/// name is never replaced. Rounds already applied are read back off the
/// working path, so a resumed job continues the chain.
pub fn obfuscate(
    job: &mut ShredJob,
    rename_rounds: u32,
    suffix_len: usize,
    working_suffix: &str,
    lock: &FileLock,
    store: &CheckpointStore,
) -> Result<()> {
    let done = job.renames_completed(working_suffix, suffix_len);

    for round in done..rename_rounds {
        let current = working_path(job)?;
        lock.verify(&current)?;

        let suffix = random_suffix(suffix_len)?;
        let next = with_suffix(&current, format!(".{}", suffix));

        job.set_current_path(&next);
        store.save(job)?;

        if let Err(e) = rename_noreplace(&current, &next) {
            // Nothing moved, so point the checkpoint back at the file
            job.set_current_path(&current);
            if let Err(rollback) = store.save(job) {
                warn!(path = %current.display(), error = %rollback, "Failed to roll back checkpoint");
            }
            return Err(ShredError::io("rename", &current, e));
        }
        sync_dir(parent_dir(&next));

        debug!(round = round + 1, rounds = rename_rounds, "Obfuscation rename complete");
    }

    info!(
        original = %job.original_path().display(),
        rounds = rename_rounds,
        "Working file name obfuscated"
    );
    Ok(())
}

/// Truncate the working file, drop the checkpoint, then delete the file
///
/// The checkpoint goes first: a crash between the two steps leaves an empty
/// file under a random name instead of a checkpoint with nothing to resume.
pub fn finalize(job: &ShredJob, lock: &FileLock, store: &CheckpointStore) -> Result<()> {
    let current = working_path(job)?;
    lock.verify(&current)?;

    let file = OpenOptions::new()
        .write(true)
        .open(&current)
        .map_err(|e| ShredError::io("open for truncate", &current, e))?;
    file.set_len(0)
        .map_err(|e| ShredError::io("truncate", &current, e))?;
    file.sync_all()
        .map_err(|e| ShredError::io("sync", &current, e))?;
    drop(file);
    debug!(path = %current.display(), "Working file truncated");

    store.remove(job.original_path())?;

    fs::remove_file(&current).map_err(|e| ShredError::io("remove", &current, e))?;
    sync_dir(parent_dir(&current));

    info!(original = %job.original_path().display(), "File shredded and removed");
    Ok(())
}
