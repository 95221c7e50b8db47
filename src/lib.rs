//! # kc-shred
//!
//! Crash-resumable secure deletion of a single file.
//!
//! A shred overwrites the file with random data for a number of passes,
//! walks it through a chain of random names, truncates it, and removes both
//! the file and its progress checkpoint. Progress is checkpointed after
//! every pass and every rename, so a killed process can be re-run with the
//! same arguments and will finish the job instead of starting over.
//!
//! ```no_run
//! # fn example() -> Result<(), kc_shred::ShredError> {
//! kc_shred::shred("/tmp/secret.txt", 3)?;
//! # Ok(())
//! # }
//! ```
//!
//! Concurrent shredders of the same file are kept apart with an exclusive
//! advisory lock; the loser fails with [`ShredError::Busy`] or
//! [`ShredError::NotFound`] and should not retry blindly.
//!
//! Overwriting does not guarantee physical erasure on copy-on-write
//! filesystems or wear-levelled flash.

#![warn(missing_docs)]

/// Configuration loading and validation
pub mod config;

/// Checkpointing, locking, overwrite and cleanup
pub mod shred;

/// Random data helpers
pub mod utils;

pub use config::ShredConfig;
pub use shred::{CheckpointStore, ErrorKind, JobPhase, ShredError, ShredJob, Shredder, shred};
