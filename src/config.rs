//! Runtime configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ManifestError, Result};
use crate::manifest::types::{INDEX_FILE_NAME, MANIFEST_FILE_NAME};
use crate::reader::images::ImageReaderOptions;
use crate::reader::video::{VideoReaderOptions, DEFAULT_CHUNK_SIZE};
use crate::sorting::SortingMethod;

/// Video manifest settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    /// Frames per chunk; bounds the allowed keyframe spacing
    pub chunk_size: usize,

    /// Build manifests for videos with too few keyframes
    pub force: bool,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            force: false,
        }
    }
}

impl VideoConfig {
    pub fn reader_options(&self, upload_dir: Option<PathBuf>) -> VideoReaderOptions {
        VideoReaderOptions {
            upload_dir,
            chunk_size: self.chunk_size,
            force: self.force,
        }
    }
}

/// Image manifest settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImagesConfig {
    pub sorting_method: SortingMethod,

    /// Store a content checksum for every image
    pub use_image_hash: bool,

    /// Root that entry names are made relative to
    pub data_dir: Option<PathBuf>,
}

impl ImagesConfig {
    pub fn reader_options(&self) -> ImageReaderOptions {
        ImageReaderOptions {
            use_image_hash: self.use_image_hash,
            data_dir: self.data_dir.clone(),
            sorting_method: self.sorting_method,
            ..Default::default()
        }
    }
}

/// Manifest and index file settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Keep `index.json` next to the manifest and reuse it
    pub persist: bool,

    /// Used when a manager is pointed at a directory
    pub manifest_file_name: String,

    pub index_file_name: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            persist: true,
            manifest_file_name: MANIFEST_FILE_NAME.to_string(),
            index_file_name: INDEX_FILE_NAME.to_string(),
        }
    }
}

impl IndexConfig {
    /// Manifest file for `path`, which may name a file or its directory
    pub fn manifest_path(&self, path: &Path) -> PathBuf {
        if path.is_dir() {
            path.join(&self.manifest_file_name)
        } else {
            path.to_path_buf()
        }
    }

    /// Index file kept beside `manifest_path`
    pub fn index_path(&self, manifest_path: &Path) -> PathBuf {
        manifest_path.with_file_name(&self.index_file_name)
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Output format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

/// Complete configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestConfig {
    pub video: VideoConfig,
    pub images: ImagesConfig,
    pub index: IndexConfig,
    pub logging: LoggingConfig,
}

impl ManifestConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&content).map_err(|e| ManifestError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ManifestError::Config(e.to_string()))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ManifestConfig::default();
        assert_eq!(config.video.chunk_size, 36);
        assert!(!config.video.force);
        assert_eq!(config.images.sorting_method, SortingMethod::Predefined);
        assert!(config.index.persist);
        assert_eq!(config.index.manifest_file_name, "manifest.jsonl");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_index_paths() {
        let dir = tempfile::tempdir().unwrap();
        let index = IndexConfig::default();
        let manifest = index.manifest_path(dir.path());
        assert_eq!(manifest, dir.path().join("manifest.jsonl"));
        assert_eq!(index.index_path(&manifest), dir.path().join("index.json"));

        let explicit = dir.path().join("other.jsonl");
        assert_eq!(index.manifest_path(&explicit), explicit);
    }

    #[test]
    fn test_file_roundtrip() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = ManifestConfig {
            video: VideoConfig {
                chunk_size: 10,
                force: true,
            },
            ..Default::default()
        };
        config.to_file(file.path()).unwrap();

        let loaded = ManifestConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded.video.chunk_size, 10);
        assert!(loaded.video.force);
    }

    #[test]
    fn test_reader_options() {
        let images = ImagesConfig {
            sorting_method: SortingMethod::Natural,
            use_image_hash: true,
            data_dir: None,
        };
        let options = images.reader_options();
        assert_eq!(options.sorting_method, SortingMethod::Natural);
        assert!(options.use_image_hash);
        assert_eq!(options.step, 1);

        let video = VideoConfig::default().reader_options(Some(PathBuf::from("/up")));
        assert_eq!(video.resolve(Path::new("a.mp4")), PathBuf::from("/up/a.mp4"));
        assert_eq!(video.resolve(Path::new("/abs/a.mp4")), PathBuf::from("/abs/a.mp4"));
    }
}
