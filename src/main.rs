/// kc-shred - Crash-resumable secure file deletion
///
/// Thin command-line wrapper around `kc_shred::Shredder`:
/// 1. Load configuration (flag, KC_SHRED_CONFIG, <exe>.config, defaults)
/// 2. Shred the given path
/// 3. Map the outcome to an exit code
///
/// Exit codes: 0 = shredded, 1 = failed, 2 = busy (retry later),
/// 3 = file too large
use clap::Parser;
use kc_shred::config::{load_config, load_config_from};
use kc_shred::{ErrorKind, ShredConfig, Shredder};
use std::path::PathBuf;
use std::process::exit;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "kc-shred", version, about = "Securely overwrite and delete a file")]
struct Cli {
    /// File to shred. Re-run with the same path to resume an interrupted shred.
    path: PathBuf,

    /// Number of random overwrite passes (defaults to the configured value)
    #[arg(short, long)]
    passes: Option<u64>,

    /// JSON configuration file
    #[arg(short, long, env = "KC_SHRED_CONFIG")]
    config: Option<PathBuf>,
}

/// Initialize tracing; `RUST_LOG` wins over the configured level and
/// `LOG_FORMAT=json` switches to JSON lines
fn init_tracing(level: &str) {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("kc_shred={}", level.to_lowercase())));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    };

    let level = loaded
        .as_ref()
        .map(|config| config.log_level.clone())
        .unwrap_or_else(|_| ShredConfig::default().log_level);
    init_tracing(&level);

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            exit(1);
        }
    };

    let passes = cli.passes.unwrap_or(config.passes);
    let shredder = match Shredder::new(config) {
        Ok(shredder) => shredder,
        Err(e) => {
            error!("{}", e);
            exit(1);
        }
    };

    match shredder.shred(&cli.path, passes) {
        Ok(()) => {
            info!(path = %cli.path.display(), "Shredded");
            exit(0);
        }
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::Busy => {
                    warn!("{} (retry later)", e);
                    2
                }
                ErrorKind::SizeExceeded => {
                    error!("{}", e);
                    3
                }
                _ => {
                    error!("{}", e);
                    1
                }
            };
            exit(code);
        }
    }
}
