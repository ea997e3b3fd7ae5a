//! End-to-end tests over synthesised media
//!
//! Fixtures generate JPEG images with `image` and short videos with the
//! FFmpeg encoder; tests that need an encoder missing from the local FFmpeg
//! build return early.

mod video_e2e;
