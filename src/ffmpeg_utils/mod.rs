//! FFmpeg module - wrappers and helpers for FFmpeg library access
//!
//! This module handles:
//! - FFmpeg initialization and log routing
//! - Decoding cursors over a video stream (read, seek, decode)
//! - Raw field access that `ffmpeg-next` does not expose safely

pub mod cursor;
pub mod helpers;

pub use ffmpeg_next as ffmpeg;

/// Initialize the FFmpeg library.
///
/// Safe to call repeatedly; every cursor calls it before opening a file.
pub fn init() -> Result<(), crate::error::FfmpegError> {
    ffmpeg::init().map_err(|e| {
        crate::error::FfmpegError::InitFailed(format!("ffmpeg::init() failed: {}", e))
    })?;

    Ok(())
}

/// Route FFmpeg's own log output through `tracing`, dropping known-noisy
/// messages.
///
/// Keyframe verification seeks into the middle of GOPs and decodes the first
/// frame it lands on; H.264/HEVC decoders complain about missing references
/// when that happens, which is expected and not worth reporting.
///
/// **Safety & Ordering:** must be called after `init()` and before any other
/// thread uses FFmpeg, because altering the global log callback is not
/// thread-safe.
pub fn install_log_filter() {
    // SAFETY: both functions modify global FFmpeg state and are called once
    // at startup before any decoding begins.
    unsafe {
        ffmpeg_next::ffi::av_log_set_level(ffmpeg_next::ffi::AV_LOG_WARNING as i32);
        ffmpeg_next::ffi::av_log_set_callback(Some(ffmpeg_log_callback));
    }
}

/// Messages that are expected side-effects of seek verification.
const SUPPRESSED_MESSAGES: &[&str] = &[
    "Missing reference picture",
    "co located POCs unavailable",
    "reference picture missing during reorder",
    "Could not find ref with POC",
    "number of reference frames",
];

unsafe extern "C" fn ffmpeg_log_callback(
    avcl: *mut std::ffi::c_void,
    level: std::ffi::c_int,
    fmt: *const std::ffi::c_char,
    vl: ffmpeg_next::ffi::va_list,
) {
    use std::ffi::CStr;

    if level > unsafe { ffmpeg_next::ffi::av_log_get_level() } {
        return;
    }

    let mut buf = [0 as std::ffi::c_char; 1024];
    let mut print_prefix: std::ffi::c_int = 1;
    ffmpeg_next::ffi::av_log_format_line(
        avcl,
        level,
        fmt,
        vl,
        buf.as_mut_ptr(),
        buf.len() as std::ffi::c_int,
        &mut print_prefix,
    );

    let msg = CStr::from_ptr(buf.as_ptr()).to_string_lossy();
    let msg = msg.trim_end();

    for suppressed in SUPPRESSED_MESSAGES {
        if msg.contains(suppressed) {
            return;
        }
    }

    if level <= ffmpeg_next::ffi::AV_LOG_ERROR as std::ffi::c_int {
        tracing::error!(target: "ffmpeg", "{}", msg);
    } else {
        tracing::warn!(target: "ffmpeg", "{}", msg);
    }
}

/// Get the version information of the linked FFmpeg libraries.
pub fn version_info() -> String {
    // SAFETY: avformat_version only reads a compile-time constant.
    let v = unsafe { ffmpeg_next::ffi::avformat_version() };
    format!("libavformat {}.{}.{}", v >> 16, (v >> 8) & 0xff, v & 0xff)
}
