//! Configuration loader

use super::schema::ShredConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV: &str = "KC_SHRED_CONFIG";

/// Load configuration for the shredder binary
///
/// Lookup order:
/// 1. File named by `KC_SHRED_CONFIG` (must exist)
/// 2. Adjacent `<executable>.config` file (e.g. "kc-shred.config")
/// 3. Built-in defaults
pub fn load_config() -> Result<ShredConfig, String> {
    if let Ok(explicit) = std::env::var(CONFIG_ENV) {
        return load_config_from(Path::new(&explicit));
    }

    match adjacent_config_path() {
        Some(path) if path.exists() => load_config_from(&path),
        _ => {
            debug!("No config file found, using defaults");
            Ok(ShredConfig::default())
        }
    }
}

/// Load and validate configuration from a specific JSON file
pub fn load_config_from(path: &Path) -> Result<ShredConfig, String> {
    let config_content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

    let config: ShredConfig = serde_json::from_str(&config_content)
        .map_err(|e| format!("Failed to parse config {}: {}", path.display(), e))?;

    config.validate()?;

    debug!(path = %path.display(), "Loaded shredder configuration");
    Ok(config)
}

fn adjacent_config_path() -> Option<PathBuf> {
    let exe_path = std::env::current_exe().ok()?;
    Some(PathBuf::from(format!("{}.config", exe_path.display())))
}
