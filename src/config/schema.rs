//! Configuration schema for the shredder

use serde::{Deserialize, Serialize};

/// Upper bound on the size of a file we agree to shred (1 GiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ShredConfig {
    /// Number of random overwrite passes when the caller does not pick one
    #[serde(default = "default_passes")]
    pub passes: u64,

    /// Number of random renames applied after the overwrite passes
    #[serde(default = "default_rename_rounds")]
    pub rename_rounds: u32,

    /// Length of each random rename suffix (alphanumeric characters)
    #[serde(default = "default_suffix_len")]
    pub suffix_len: usize,

    /// Files larger than this many bytes are refused before any mutation
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Appended to the original path to locate the checkpoint record
    #[serde(default = "default_checkpoint_suffix")]
    pub checkpoint_suffix: String,

    /// Appended to the original path for the first (working) rename
    #[serde(default = "default_working_suffix")]
    pub working_suffix: String,

    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_passes() -> u64 {
    3
}

fn default_rename_rounds() -> u32 {
    10
}

fn default_suffix_len() -> usize {
    12
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_checkpoint_suffix() -> String {
    ".shredmeta".to_string()
}

fn default_working_suffix() -> String {
    ".tmp".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ShredConfig {
    fn default() -> Self {
        Self {
            passes: default_passes(),
            rename_rounds: default_rename_rounds(),
            suffix_len: default_suffix_len(),
            max_file_size: default_max_file_size(),
            checkpoint_suffix: default_checkpoint_suffix(),
            working_suffix: default_working_suffix(),
            log_level: default_log_level(),
        }
    }
}

impl ShredConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.passes == 0 {
            return Err("passes must be at least 1".to_string());
        }

        if self.suffix_len == 0 {
            return Err("suffix_len must be at least 1".to_string());
        }

        if self.max_file_size == 0 {
            return Err("max_file_size must be greater than zero".to_string());
        }

        validate_suffix("checkpoint_suffix", &self.checkpoint_suffix)?;
        validate_suffix("working_suffix", &self.working_suffix)?;

        // The checkpoint must never share a name with the file it tracks
        if self.checkpoint_suffix == self.working_suffix {
            return Err("checkpoint_suffix and working_suffix must differ".to_string());
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(format!("unknown log_level: {}", other)),
        }
    }
}

fn validate_suffix(name: &str, suffix: &str) -> Result<(), String> {
    if suffix.is_empty() {
        return Err(format!("{} cannot be empty", name));
    }

    if suffix.contains('/') || suffix.contains('\\') {
        return Err(format!("{} cannot contain a path separator", name));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        let mut config = ShredConfig::default();
        assert!(config.validate().is_ok());

        config.passes = 0;
        assert!(config.validate().is_err());
        config.passes = 3;

        config.working_suffix = "".to_string();
        assert!(config.validate().is_err());

        config.working_suffix = "/tmp".to_string();
        assert!(config.validate().is_err());

        config.working_suffix = ".shredmeta".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_values() {
        let config: ShredConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.passes, 3);
        assert_eq!(config.rename_rounds, 10);
        assert_eq!(config.suffix_len, 12);
        assert_eq!(config.max_file_size, 1024 * 1024 * 1024);
        assert_eq!(config.checkpoint_suffix, ".shredmeta");
        assert_eq!(config.working_suffix, ".tmp");
        assert_eq!(config.log_level, "info");
        assert_eq!(config, ShredConfig::default());
    }

    #[test]
    fn test_unknown_log_level() {
        let config: ShredConfig = serde_json::from_str(r#"{ "log_level": "loud" }"#).unwrap();
        assert!(config.validate().is_err());
    }
}
