/// Shred module - Resumable secure deletion of a single file
pub mod checkpoint;
pub mod error;
pub mod guard;
pub mod obfuscate;
pub mod orchestrator;
pub mod overwrite;

pub use checkpoint::{CheckpointStore, JobPhase, ShredJob};
pub use error::{ErrorKind, Result, ShredError};
pub use guard::{FileLock, is_locked};
pub use orchestrator::{Shredder, shred};
