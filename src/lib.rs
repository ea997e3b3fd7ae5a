//! Randomly-seekable manifests for video files and image collections
//!
//! A manifest describes media once, at upload time: the verified keyframes
//! of a video, or the name, size and checksum of every image of a
//! collection. Later consumers read single entries through a byte offset
//! index instead of touching the media again.

pub mod config;
pub mod config_file;
pub mod error;
pub mod ffmpeg_utils;
pub mod hashing;
pub mod manifest;
pub mod reader;
pub mod related;
pub mod sorting;

pub use error::{FfmpegError, ManifestError, Result};
pub use manifest::{
    is_dataset_manifest, is_manifest, is_video_manifest, ImageManifestManager, Manifest,
    ManifestIndex, ManifestManager, VideoManifestManager,
};
pub use reader::{ImageCollectionReader, ImageReaderOptions, ImageSources, VideoStreamReader};
pub use sorting::SortingMethod;

#[cfg(test)]
mod tests;
