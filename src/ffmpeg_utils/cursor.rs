//! Decoding cursor over the first video stream of a container
//!
//! A [`VideoCursor`] owns one FFmpeg input context and one video decoder.
//! It hands out decoded frames in decode order and can be repositioned to a
//! presentation timestamp. The video reader keeps two of them open on the
//! same file: one walks the stream, the other verifies keyframe seeks.

use std::path::{Path, PathBuf};

use ffmpeg_next as ffmpeg;

use crate::error::{FfmpegError, Result};

use super::helpers;

/// `AVSEEK_FLAG_BACKWARD`: land on the closest keyframe at or before the
/// requested timestamp.
const AVSEEK_FLAG_BACKWARD: i32 = 1;

/// Sequential decoder over one video stream
pub struct VideoCursor {
    input: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    source_path: PathBuf,
    stream_index: usize,
    rotation: Option<f64>,
    /// EOF has been sent to the decoder
    draining: bool,
}

impl VideoCursor {
    /// Open a media file and prepare a decoder for its first video stream
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        super::init()?;

        let path = path.as_ref();
        let input = ffmpeg::format::input(&path)
            .map_err(|e| FfmpegError::OpenInput(format!("Failed to open {:?}: {}", path, e)))?;

        let (stream_index, time_base, rotation, decoder) = {
            let stream = input
                .streams()
                .find(|s| s.parameters().medium() == ffmpeg::media::Type::Video)
                .ok_or(FfmpegError::NoVideoStream)?;

            let stream_index = stream.index();
            let context = ffmpeg::codec::Context::from_parameters(stream.parameters())
                .map_err(|e| {
                    FfmpegError::DecoderCreate(format!(
                        "Failed to create codec context for stream {}: {}",
                        stream_index, e
                    ))
                })?;
            let decoder = context.decoder().video().map_err(|e| {
                FfmpegError::DecoderCreate(format!(
                    "Failed to open video decoder for stream {}: {}",
                    stream_index, e
                ))
            })?;

            (
                stream_index,
                stream.time_base(),
                helpers::stream_rotation(&stream),
                decoder,
            )
        };

        tracing::debug!(
            "Opened video cursor: {:?}, stream={}, timebase={}",
            path,
            stream_index,
            time_base
        );

        Ok(Self {
            input,
            decoder,
            source_path: path.to_path_buf(),
            stream_index,
            rotation,
            draining: false,
        })
    }

    /// Stored rotation of the video stream in degrees, if any
    pub fn rotation(&self) -> Option<f64> {
        self.rotation
    }

    /// Decode the next frame of the video stream.
    ///
    /// Returns `None` once the container is exhausted and the decoder has
    /// been drained.
    pub fn next_frame(&mut self) -> Result<Option<ffmpeg::frame::Video>> {
        loop {
            let mut frame = ffmpeg::frame::Video::empty();
            match self.decoder.receive_frame(&mut frame) {
                Ok(()) => return Ok(Some(frame)),
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {}
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(e) => {
                    return Err(FfmpegError::DecodePacket(format!(
                        "receive_frame error on stream {}: {}",
                        self.stream_index, e
                    ))
                    .into())
                }
            }

            if self.draining {
                return Ok(None);
            }

            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() == self.stream_index {
                        self.send_packet(&packet)?;
                    }
                }
                Err(ffmpeg::Error::Eof) => {
                    match self.decoder.send_eof() {
                        Ok(()) | Err(ffmpeg::Error::Eof) => {}
                        Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {}
                        Err(e) => {
                            return Err(FfmpegError::DecodePacket(format!(
                                "send_eof error on stream {}: {}",
                                self.stream_index, e
                            ))
                            .into())
                        }
                    }
                    self.draining = true;
                }
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {}
                Err(e) => {
                    return Err(FfmpegError::ReadFrame(format!(
                        "Failed to read packet from {:?}: {}",
                        self.source_path, e
                    ))
                    .into())
                }
            }
        }
    }

    /// Send a compressed packet to the decoder.
    ///
    /// `AVERROR_INVALIDDATA` is treated as non-fatal: the packet is skipped
    /// and decoding continues with the next one.
    fn send_packet(&mut self, packet: &ffmpeg::Packet) -> Result<()> {
        match self.decoder.send_packet(packet) {
            Ok(()) => Ok(()),
            Err(ffmpeg::Error::InvalidData) => {
                tracing::debug!(
                    stream_index = self.stream_index,
                    "send_packet: skipping invalid packet"
                );
                Ok(())
            }
            Err(e) => Err(FfmpegError::DecodePacket(format!(
                "send_packet error on stream {}: {}",
                self.stream_index, e
            ))
            .into()),
        }
    }

    /// Reposition the cursor so the next decoded frame is the keyframe at or
    /// before `pts` (in the video stream's timebase).
    pub fn seek_to_pts(&mut self, pts: i64) -> Result<()> {
        // SAFETY: `as_mut_ptr()` is a valid AVFormatContext for the lifetime
        // of `self.input`; `stream_index` was taken from this context.
        let ret = unsafe {
            ffmpeg::ffi::av_seek_frame(
                self.input.as_mut_ptr(),
                self.stream_index as i32,
                pts,
                AVSEEK_FLAG_BACKWARD,
            )
        };
        if ret < 0 {
            return Err(FfmpegError::Seek(format!(
                "av_seek_frame(stream={}, pts={}) returned {}",
                self.stream_index, pts, ret
            ))
            .into());
        }

        self.decoder.flush();
        self.draining = false;
        Ok(())
    }
}
