use thiserror::Error;

/// Main error type for manifest creation and access
#[derive(Error, Debug)]
pub enum ManifestError {
    /// The source video violates a container, keyframe or seek invariant
    #[error("Invalid video: {0}")]
    InvalidVideo(String),

    /// The manifest file itself is structurally broken, or the requested
    /// change would break it
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    /// An image source could not be read or decoded
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// A point cloud source could not be read
    #[error("Invalid point cloud: {0}")]
    InvalidPcd(String),

    /// The operation is not supported for this manifest type
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Random access outside the indexed entries
    #[error("Index out of range: {index} (manifest has {len} entries)")]
    IndexOutOfRange { index: usize, len: usize },

    /// The reader has not been iterated to the end yet
    #[error("The length is not available until the reader is fully iterated")]
    LengthUnavailable,

    /// A single-pass reader was asked to iterate a second time
    #[error("The reader has already been consumed")]
    ReaderConsumed,

    /// Input paths or arguments are inconsistent
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// An error originating from the underlying FFmpeg library
    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] FfmpegError),

    /// A standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A manifest or index line is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// FFmpeg-specific errors
#[derive(Error, Debug)]
pub enum FfmpegError {
    /// Failure during global FFmpeg initialization
    #[error("FFmpeg initialization failed: {0}")]
    InitFailed(String),

    /// Failure opening an input media file
    #[error("Failed to open input file: {0}")]
    OpenInput(String),

    /// The container has no video stream
    #[error("No video stream found in source file")]
    NoVideoStream,

    /// Failure instantiating a decoder
    #[error("Failed to create decoder: {0}")]
    DecoderCreate(String),

    /// Failure decoding a single packet into a frame
    #[error("Failed to decode packet: {0}")]
    DecodePacket(String),

    /// Failure reading a single packet from the input context
    #[error("Failed to read frame: {0}")]
    ReadFrame(String),

    /// Failure seeking the input context
    #[error("Failed to seek: {0}")]
    Seek(String),

    /// Failure creating or running a pixel format converter
    #[error("Failed to scale frame: {0}")]
    Scale(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ManifestError>;

impl From<image::ImageError> for ManifestError {
    fn from(e: image::ImageError) -> Self {
        ManifestError::InvalidImage(e.to_string())
    }
}
