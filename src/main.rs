//! Dataset manifest tool
//!
//! Builds randomly-seekable JSON Lines manifests for video files and image
//! collections, and inspects existing ones.

mod cli;

use std::path::Path;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dataset_manifest::config::{LoggingConfig, ManifestConfig};
use dataset_manifest::config_file::ConfigFile;
use dataset_manifest::error::Result;
use dataset_manifest::ffmpeg_utils;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "dataset-manifest";

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }

    init_logging(&config.logging);

    tracing::debug!("{} v{} starting", APP_NAME, VERSION);
    tracing::debug!("FFmpeg version: {}", ffmpeg_utils::version_info());

    ffmpeg_utils::init()?;
    ffmpeg_utils::install_log_filter();

    cli::run(cli.command, &config)
}

/// An explicit config file must load; without one the defaults apply
fn load_config(path: Option<&Path>) -> Result<ManifestConfig> {
    match path {
        Some(path) => Ok(ConfigFile::from_file(path)?.into_manifest_config()),
        None => Ok(ManifestConfig::default()),
    }
}

/// Initialize logging with tracing.
///
/// Logs go to stderr so that command output on stdout stays parseable.
fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("dataset_manifest={},ffmpeg=warn", logging.level).into());
    let registry = tracing_subscriber::registry().with(filter);

    if logging.is_json() {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/config.toml"))).is_err());
        assert_eq!(load_config(None).unwrap().video.chunk_size, 36);
    }
}
