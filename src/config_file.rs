//! Configuration file support
//!
//! Every section and every key is optional; anything left out keeps the
//! value from [`ManifestConfig::default`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{ImagesConfig, IndexConfig, LoggingConfig, ManifestConfig, VideoConfig};
use crate::error::{ManifestError, Result};
use crate::sorting::SortingMethod;

/// Configuration file format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Video manifest settings
    pub video: Option<VideoSettings>,
    /// Image manifest settings
    pub images: Option<ImagesSettings>,
    /// Manifest and index file settings
    pub index: Option<IndexSettings>,
    /// Logging settings
    pub logging: Option<LoggingSettings>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoSettings {
    /// Frames per chunk
    pub chunk_size: Option<usize>,
    /// Accept videos with sparse keyframes
    pub force: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImagesSettings {
    /// lexicographical, natural, predefined or random
    pub sorting_method: Option<SortingMethod>,
    /// Store content checksums
    pub use_image_hash: Option<bool>,
    /// Root for relative entry names
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexSettings {
    /// Persist the index next to the manifest
    pub persist: Option<bool>,
    pub manifest_file_name: Option<String>,
    pub index_file_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: Option<String>,
    /// Output format (json, pretty)
    pub format: Option<String>,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&content).map_err(|e| {
            ManifestError::Config(format!("{}: {}", path.as_ref().display(), e))
        })
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ManifestError::Config(e.to_string()))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Generate default configuration file
    pub fn default_config() -> Self {
        let defaults = ManifestConfig::default();
        Self {
            video: Some(VideoSettings {
                chunk_size: Some(defaults.video.chunk_size),
                force: Some(defaults.video.force),
            }),
            images: Some(ImagesSettings {
                sorting_method: Some(defaults.images.sorting_method),
                use_image_hash: Some(defaults.images.use_image_hash),
                data_dir: None,
            }),
            index: Some(IndexSettings {
                persist: Some(defaults.index.persist),
                manifest_file_name: Some(defaults.index.manifest_file_name),
                index_file_name: Some(defaults.index.index_file_name),
            }),
            logging: Some(LoggingSettings {
                level: Some(defaults.logging.level),
                format: Some(defaults.logging.format),
            }),
        }
    }

    /// Convert to ManifestConfig
    pub fn into_manifest_config(self) -> ManifestConfig {
        let defaults = ManifestConfig::default();
        let video = self.video.unwrap_or_default();
        let images = self.images.unwrap_or_default();
        let index = self.index.unwrap_or_default();
        let logging = self.logging.unwrap_or_default();

        ManifestConfig {
            video: VideoConfig {
                chunk_size: video.chunk_size.unwrap_or(defaults.video.chunk_size),
                force: video.force.unwrap_or(defaults.video.force),
            },
            images: ImagesConfig {
                sorting_method: images.sorting_method.unwrap_or_default(),
                use_image_hash: images.use_image_hash.unwrap_or(false),
                data_dir: images.data_dir,
            },
            index: IndexConfig {
                persist: index.persist.unwrap_or(defaults.index.persist),
                manifest_file_name: index
                    .manifest_file_name
                    .unwrap_or(defaults.index.manifest_file_name),
                index_file_name: index.index_file_name.unwrap_or(defaults.index.index_file_name),
            },
            logging: LoggingConfig {
                level: logging.level.unwrap_or(defaults.logging.level),
                format: logging.format.unwrap_or(defaults.logging.format),
            },
        }
    }
}

/// Generate default configuration file at the specified path
pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
    ConfigFile::default_config().to_file(path)
}
