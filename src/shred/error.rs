//! Shredding errors.
//!
//! No step is retried internally. Every failure surfaces here, and the
//! checkpoint on disk reflects the last step that completed.

use std::io;
use std::path::{Path, PathBuf};

/// Result alias for shredding operations
pub type Result<T> = std::result::Result<T, ShredError>;

/// Coarse classification of a [`ShredError`], for callers that only
/// need to decide between "retry later", "give up" and "fix the input"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// File is over the size bound; nothing was changed
    SizeExceeded,
    /// Another process holds a conflicting lock; retry later
    Busy,
    /// Target file or its checkpointed working file is missing
    NotFound,
    /// Filesystem operation failed
    IoFailure,
    /// OS entropy source failed
    RandomSourceFailure,
    /// Configuration was rejected
    Config,
}

/// Errors returned by the shredder
#[derive(Debug, thiserror::Error)]
pub enum ShredError {
    /// File larger than the configured bound
    #[error("file size {size} bytes exceeds the allowed limit of {limit} bytes: {}", .path.display())]
    SizeExceeded {
        /// Offending file
        path: PathBuf,
        /// Actual size
        size: u64,
        /// Configured bound
        limit: u64,
    },

    /// File is locked by another process
    #[error("file is locked by another process: {}", .path.display())]
    Busy {
        /// Contended file
        path: PathBuf,
    },

    /// File expected on disk is missing
    #[error("file not found: {}", .path.display())]
    NotFound {
        /// Missing file
        path: PathBuf,
    },

    /// Filesystem operation failed
    #[error("failed to {op} {}: {source}", .path.display())]
    Io {
        /// Short verb describing the failed operation
        op: &'static str,
        /// Path the operation targeted
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// OS entropy source unavailable
    #[error("random source failure: {0}")]
    RandomSource(String),

    /// Checkpoint record exists but cannot be used
    #[error("corrupt checkpoint {}: {reason}", .path.display())]
    CorruptCheckpoint {
        /// Checkpoint file
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },

    /// Target (or the file a symlink resolves to) is a directory or other non-regular file
    #[error("not a regular file: {}", .path.display())]
    NotRegularFile {
        /// Offending path
        path: PathBuf,
    },

    /// Both the original file and the checkpointed working file exist
    #[error(
        "checkpoint for {} points at {}, but both files exist",
        .original.display(),
        .current.display()
    )]
    StaleCheckpoint {
        /// Caller-supplied path
        original: PathBuf,
        /// Working path recorded in the checkpoint
        current: PathBuf,
    },

    /// Configuration rejected by validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ShredError {
    /// Wrap an I/O error, promoting "not found" to [`ShredError::NotFound`]
    pub(crate) fn io(op: &'static str, path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            return ShredError::NotFound {
                path: path.to_path_buf(),
            };
        }
        ShredError::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Coarse classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShredError::SizeExceeded { .. } => ErrorKind::SizeExceeded,
            ShredError::Busy { .. } => ErrorKind::Busy,
            ShredError::NotFound { .. } => ErrorKind::NotFound,
            ShredError::RandomSource(_) => ErrorKind::RandomSourceFailure,
            ShredError::InvalidConfig(_) => ErrorKind::Config,
            ShredError::Io { .. }
            | ShredError::CorruptCheckpoint { .. }
            | ShredError::NotRegularFile { .. }
            | ShredError::StaleCheckpoint { .. } => ErrorKind::IoFailure,
        }
    }
}
