//! Media readers feeding the manifest builders
//!
//! - `video`: verified keyframe walk over a single video file
//! - `images`: image and point cloud collections, with range and placeholders
//! - `source`: where collection readers take their inputs from

pub mod images;
pub mod source;
pub mod video;

pub use images::{Dimension, ImageCollectionReader, ImageEntries, ImageReaderOptions};
pub use source::{ImageSource, ImageSources};
pub use video::{
    KeyframeDensityGuard, TimestampGuard, VideoFrameRecord, VideoFrames, VideoReaderOptions,
    VideoStreamReader,
};
