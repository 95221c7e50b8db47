/// Configuration module - Load and validate shredder configuration
pub mod schema;
pub mod loader;

pub use schema::{DEFAULT_MAX_FILE_SIZE, ShredConfig};
pub use loader::{CONFIG_ENV, load_config, load_config_from};
