//! Validating reader for video files
//!
//! The reader proves, once at manifest build time, that every keyframe it
//! reports can be reached again by seeking to its presentation timestamp and
//! decodes to the same picture. Later random access by PTS then never has
//! to re-validate anything.

use std::path::{Path, PathBuf};

use crate::error::{ManifestError, Result};
use crate::ffmpeg_utils::cursor::VideoCursor;
use crate::ffmpeg_utils::helpers;
use crate::hashing::ContentHasher;

/// One decoded frame, as reported by [`VideoStreamReader::frames`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoFrameRecord {
    /// A keyframe whose seek position and checksum were verified
    KeyFrame {
        index: usize,
        pts: i64,
        checksum: String,
    },
    /// Any other frame: not a keyframe, or a keyframe that could not be
    /// verified. Counted toward the video length only.
    Frame(usize),
}

impl VideoFrameRecord {
    pub fn index(&self) -> usize {
        match self {
            VideoFrameRecord::KeyFrame { index, .. } => *index,
            VideoFrameRecord::Frame(index) => *index,
        }
    }
}

/// Rejects frames whose PTS or DTS does not strictly increase.
///
/// A comparison is only made when both the current and the previous value
/// are known.
#[derive(Debug, Default)]
pub struct TimestampGuard {
    prev_pts: Option<i64>,
    prev_dts: Option<i64>,
}

impl TimestampGuard {
    pub fn check(&mut self, pts: Option<i64>, dts: Option<i64>) -> Result<()> {
        if let (Some(cur), Some(prev)) = (pts, self.prev_pts) {
            if cur <= prev {
                return Err(ManifestError::InvalidVideo(format!(
                    "non-increasing PTS sequence: {} after {}",
                    cur, prev
                )));
            }
        }
        if let (Some(cur), Some(prev)) = (dts, self.prev_dts) {
            if cur <= prev {
                return Err(ManifestError::InvalidVideo(format!(
                    "non-increasing DTS sequence: {} after {}",
                    cur, prev
                )));
            }
        }
        self.prev_pts = pts;
        self.prev_dts = dts;
        Ok(())
    }
}

/// Enforces a minimum keyframe density.
///
/// Chunked playback seeks to the closest keyframe before a chunk start, so
/// the ratio of frames to verified keyframes must stay below
/// `3 * chunk_size + 1`.
#[derive(Debug)]
pub struct KeyframeDensityGuard {
    upper_bound: usize,
    force: bool,
    frames: usize,
    keyframes: usize,
}

impl KeyframeDensityGuard {
    pub fn new(chunk_size: usize, force: bool) -> Self {
        Self {
            upper_bound: 3 * chunk_size + 1,
            force,
            frames: 0,
            keyframes: 0,
        }
    }

    /// Account for one more frame
    pub fn record(&mut self, verified_keyframe: bool) -> Result<()> {
        self.frames += 1;
        if verified_keyframe {
            self.keyframes += 1;
        }
        let ratio = self.frames / self.keyframes.max(1);
        if ratio >= self.upper_bound && !self.force {
            return Err(ManifestError::InvalidVideo(format!(
                "not enough keyframes for smooth iteration: {} frames, {} keyframes",
                self.frames, self.keyframes
            )));
        }
        Ok(())
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn keyframes(&self) -> usize {
        self.keyframes
    }
}

/// Default number of frames per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 36;

/// How a video manifest's reader is set up
#[derive(Debug, Clone)]
pub struct VideoReaderOptions {
    /// Directory relative video paths are resolved against
    pub upload_dir: Option<PathBuf>,
    pub chunk_size: usize,
    /// Build the manifest even when keyframes are too sparse
    pub force: bool,
}

impl Default for VideoReaderOptions {
    fn default() -> Self {
        Self {
            upload_dir: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            force: false,
        }
    }
}

impl VideoReaderOptions {
    /// Resolve `path` against `upload_dir` when it is relative
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.upload_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// Reader over the frames of a single video file
#[derive(Debug)]
pub struct VideoStreamReader {
    source_path: PathBuf,
    chunk_size: usize,
    force: bool,
    width: u32,
    height: u32,
    frames_number: Option<usize>,
    consumed: bool,
}

impl VideoStreamReader {
    /// Open a video and validate its first frame.
    ///
    /// Fails with [`ManifestError::InvalidVideo`] when the first decoded
    /// frame is not a keyframe.
    pub fn open<P: AsRef<Path>>(path: P, chunk_size: usize, force: bool) -> Result<Self> {
        if chunk_size == 0 {
            return Err(ManifestError::Config(
                "chunk_size must be greater than zero".to_string(),
            ));
        }

        let path = path.as_ref();
        let mut cursor = VideoCursor::open(path)?;
        let frame = cursor
            .next_frame()?
            .ok_or_else(|| ManifestError::InvalidVideo("the video has no frames".to_string()))?;

        if !frame.is_key() {
            return Err(ManifestError::InvalidVideo(
                "the first frame is not a key frame".to_string(),
            ));
        }

        let (mut width, mut height) = (frame.width(), frame.height());
        if cursor.rotation().is_some_and(helpers::is_quarter_turn) {
            std::mem::swap(&mut width, &mut height);
        }

        tracing::debug!("Opened video {:?}: {}x{}", path, width, height);

        Ok(Self {
            source_path: path.to_path_buf(),
            chunk_size,
            force,
            width,
            height,
            frames_number: None,
            consumed: false,
        })
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn force(&self) -> bool {
        self.force
    }

    /// Effective `(width, height)` of the video, with rotation applied
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Total number of decoded frames.
    ///
    /// Only known once [`frames`](Self::frames) has been iterated to the end.
    pub fn len(&self) -> Result<usize> {
        self.frames_number.ok_or(ManifestError::LengthUnavailable)
    }

    /// Walk the video once, verifying every keyframe.
    ///
    /// The sequence is single-pass: calling this a second time fails with
    /// [`ManifestError::ReaderConsumed`]; open a new reader to start over.
    pub fn frames(&mut self) -> Result<VideoFrames<'_>> {
        if self.consumed {
            return Err(ManifestError::ReaderConsumed);
        }
        self.consumed = true;

        let cursors = CursorPair::open(&self.source_path)?;
        let density = KeyframeDensityGuard::new(self.chunk_size, self.force);

        Ok(VideoFrames {
            reader: self,
            cursors: Some(cursors),
            hasher: ContentHasher::new(),
            timestamps: TimestampGuard::default(),
            density,
            index: 0,
        })
    }
}

/// The reading and checking cursors, opened and closed together
struct CursorPair {
    reading: VideoCursor,
    checking: VideoCursor,
}

impl CursorPair {
    fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            reading: VideoCursor::open(path)?,
            checking: VideoCursor::open(path)?,
        })
    }
}

/// Iterator returned by [`VideoStreamReader::frames`]
pub struct VideoFrames<'a> {
    reader: &'a mut VideoStreamReader,
    /// `None` once the walk finished or failed; dropping closes both files
    cursors: Option<CursorPair>,
    hasher: ContentHasher,
    timestamps: TimestampGuard,
    density: KeyframeDensityGuard,
    index: usize,
}

impl VideoFrames<'_> {
    fn advance(&mut self) -> Result<Option<VideoFrameRecord>> {
        let Some(cursors) = self.cursors.as_mut() else {
            return Ok(None);
        };

        let Some(frame) = cursors.reading.next_frame()? else {
            self.cursors = None;
            self.reader.frames_number = Some(self.index);
            tracing::info!(
                "Read video {:?}: {} frames, {} verified keyframes",
                self.reader.source_path,
                self.index,
                self.density.keyframes()
            );
            return Ok(None);
        };

        let pts = frame.pts();
        self.timestamps
            .check(pts, helpers::frame_packet_dts(&frame))?;

        let index = self.index;
        let record = match pts {
            Some(pts) if frame.is_key() => {
                let checksum = self.hasher.hash_frame(&frame)?;
                if verify_keyframe(&mut cursors.checking, &mut self.hasher, pts, &checksum)? {
                    VideoFrameRecord::KeyFrame {
                        index,
                        pts,
                        checksum,
                    }
                } else {
                    tracing::debug!("Keyframe {} (pts={}) is not seekable", index, pts);
                    VideoFrameRecord::Frame(index)
                }
            }
            _ => VideoFrameRecord::Frame(index),
        };

        self.index += 1;
        self.density
            .record(matches!(record, VideoFrameRecord::KeyFrame { .. }))?;

        Ok(Some(record))
    }
}

impl Iterator for VideoFrames<'_> {
    type Item = Result<VideoFrameRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(record) => record.map(Ok),
            Err(e) => {
                self.cursors = None;
                Some(Err(e))
            }
        }
    }
}

/// Seek the checking cursor to `pts` and compare the frame it lands on.
fn verify_keyframe(
    checking: &mut VideoCursor,
    hasher: &mut ContentHasher,
    pts: i64,
    checksum: &str,
) -> Result<bool> {
    if let Err(e) = checking.seek_to_pts(pts) {
        tracing::debug!("Seek to pts={} failed: {}", pts, e);
        return Ok(false);
    }

    match checking.next_frame()? {
        Some(frame) => {
            if frame.pts() != Some(pts) {
                return Ok(false);
            }
            Ok(hasher.hash_frame(&frame)? == checksum)
        }
        None => Ok(false),
    }
}
