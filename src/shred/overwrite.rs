//! Random-data overwrite passes

use super::checkpoint::{CheckpointStore, ShredJob};
use super::error::{Result, ShredError};
use super::guard::FileLock;
use crate::utils::fill_random;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use tracing::{debug, info};

/// Overwrite the working file until `required_passes` passes are durable
///
/// Each pass fills a buffer the size of the file from the OS CSPRNG,
/// writes it over the whole file, syncs it, and only then records the pass
/// in the checkpoint. A resumed job starts at `passes_completed`, so an
/// unfinished pass is never skipped; at worst a finished one is repeated.
pub fn overwrite(
    job: &mut ShredJob,
    required_passes: u64,
    lock: &FileLock,
    store: &CheckpointStore,
) -> Result<()> {
    let working = match job.current_path() {
        Some(path) => path.to_path_buf(),
        None => {
            return Err(ShredError::NotFound {
                path: job.original_path().to_path_buf(),
            });
        }
    };

    if job.passes_completed() >= required_passes {
        debug!(
            path = %working.display(),
            passes_completed = job.passes_completed(),
            "Overwrite passes already complete"
        );
        return Ok(());
    }

    lock.verify(&working)?;
    let mut file = OpenOptions::new()
        .write(true)
        .open(&working)
        .map_err(|e| ShredError::io("open for overwrite", &working, e))?;

    let size = file
        .metadata()
        .map_err(|e| ShredError::io("stat", &working, e))?
        .len();
    let len = buffer_len(size, &working)?;

    // One buffer for every pass; refilled before each write
    let mut random_data = vec![0u8; len];

    for pass in job.passes_completed()..required_passes {
        // Someone may have swapped the file out between passes
        lock.verify(&working)?;

        fill_random(&mut random_data)?;
        write_pass(&mut file, &random_data, &working)?;

        job.record_pass(pass + 1);
        store.save(job)?;

        info!(
            path = %working.display(),
            pass = pass + 1,
            passes = required_passes,
            bytes = size,
            "Overwrite pass complete"
        );
    }

    Ok(())
}

/// In-memory buffer length for a file of `size` bytes
fn buffer_len(size: u64, path: &Path) -> Result<usize> {
    usize::try_from(size).map_err(|_| {
        ShredError::io(
            "allocate overwrite buffer",
            path,
            io::Error::new(
                io::ErrorKind::FileTooLarge,
                format!("{size} bytes does not fit in memory on this platform"),
            ),
        )
    })
}

/// Write `data` over the file from offset 0 and sync it to disk
fn write_pass(file: &mut File, data: &[u8], path: &Path) -> Result<()> {
    write_at_start(file, data).map_err(|e| ShredError::io("overwrite", path, e))?;
    file.sync_all()
        .map_err(|e| ShredError::io("sync", path, e))
}

#[cfg(unix)]
fn write_at_start(file: &mut File, data: &[u8]) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(data, 0)
}

#[cfg(not(unix))]
fn write_at_start(file: &mut File, data: &[u8]) -> io::Result<()> {
    use std::io::{Seek, SeekFrom, Write};
    file.seek(SeekFrom::Start(0))?;
    file.write_all(data)?;
    file.flush()
}
