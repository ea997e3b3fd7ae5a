//! Manifest manager for a single video file

use std::path::Path;

use super::store::ManifestStore;
use super::types::{self, ManifestType, PropertiesLine, VideoFrameEntry, VideoProperties};
use super::ManifestManager;
use crate::config::IndexConfig;
use crate::error::{ManifestError, Result};
use crate::reader::video::{VideoFrameRecord, VideoReaderOptions, VideoStreamReader};

/// Builds and reads video manifests.
///
/// Entries are the verified keyframes of the video; a frame can be reached
/// by seeking to the closest entry at or before it and decoding forward.
#[derive(Debug)]
pub struct VideoManifestManager {
    store: ManifestStore,
    reader: Option<VideoStreamReader>,
}

impl VideoManifestManager {
    /// Manager for `path`, a manifest file or the directory holding one
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self::with_config(path, &IndexConfig::default())
    }

    pub fn with_config<P: AsRef<Path>>(path: P, config: &IndexConfig) -> Self {
        Self {
            store: ManifestStore::new(path.as_ref(), ManifestType::Video, config),
            reader: None,
        }
    }

    /// Open `media_file` as the source of the next [`create`](ManifestManager::create)
    pub fn link<P: AsRef<Path>>(&mut self, media_file: P, options: &VideoReaderOptions) -> Result<()> {
        let path = options.resolve(media_file.as_ref());
        self.reader = Some(VideoStreamReader::open(&path, options.chunk_size, options.force)?);
        Ok(())
    }

    fn properties(&self) -> Result<VideoProperties> {
        let line: PropertiesLine = self.store.header(2)?;
        Ok(line.properties)
    }

    /// Video file name from the header
    pub fn video_name(&self) -> Result<String> {
        Ok(self.properties()?.name)
    }

    /// `(width, height)` from the header
    pub fn video_resolution(&self) -> Result<(u32, u32)> {
        Ok(self.properties()?.resolution)
    }

    /// Total number of frames from the header
    pub fn video_length(&self) -> Result<usize> {
        Ok(self.properties()?.length)
    }

    /// Video manifests are always rebuilt in full
    pub fn partial_update(&mut self) -> Result<()> {
        Ok(())
    }

    pub fn get_subset(&mut self, _names: &[String]) -> Result<(Vec<usize>, Vec<VideoFrameEntry>)> {
        Err(ManifestError::NotImplemented(
            "subsets of video manifests are not supported".to_string(),
        ))
    }

    /// Latest keyframe entry whose PTS is at or before `pts`
    pub fn keyframe_before(&mut self, pts: i64) -> Result<Option<VideoFrameEntry>> {
        let mut found = None;
        for entry in self.iter()? {
            let entry = entry?;
            if entry.pts > pts {
                break;
            }
            found = Some(entry);
        }
        Ok(found)
    }
}

impl ManifestManager for VideoManifestManager {
    type Entry = VideoFrameEntry;

    fn store(&self) -> &ManifestStore {
        &self.store
    }

    fn store_mut(&mut self) -> &mut ManifestStore {
        &mut self.store
    }

    /// Walk the linked video and write one entry per verified keyframe.
    ///
    /// Without `force`, a video that yields no usable keyframe leaves no
    /// manifest behind and fails with [`ManifestError::InvalidManifest`].
    fn create(&mut self) -> Result<()> {
        let mut reader = self.reader.take().ok_or_else(|| {
            ManifestError::Config("no video is linked to this manifest".to_string())
        })?;

        // the header needs the frame count, which is only known at the end
        let mut body = Vec::new();
        let mut keyframes = 0usize;
        for record in reader.frames()? {
            if let VideoFrameRecord::KeyFrame { pts, checksum, .. } = record? {
                let entry = VideoFrameEntry {
                    number: keyframes,
                    pts,
                    checksum: Some(checksum),
                };
                types::write_line(&mut body, &entry)?;
                keyframes += 1;
            }
        }

        let properties = VideoProperties {
            name: reader
                .source_path()
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            resolution: reader.resolution(),
            length: reader.len()?,
        };

        self.store.write(|writer| {
            types::write_line(writer, &PropertiesLine { properties })?;
            std::io::Write::write_all(writer, &body)?;
            Ok(())
        })?;

        if keyframes == 0 && !reader.force() {
            self.store.remove()?;
            return Err(ManifestError::InvalidManifest("empty manifest".to_string()));
        }

        tracing::info!(
            "Created video manifest {:?} with {} keyframes",
            self.store.manifest_path(),
            keyframes
        );
        Ok(())
    }
}
