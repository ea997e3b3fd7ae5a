//! Content checksums for decoded frames and images
//!
//! Checksums are computed over decoded pixels converted to packed RGB24, so
//! the same picture hashes identically whatever container or codec it came
//! from. Video frames and still images share the same digest routine.

use ffmpeg_next as ffmpeg;
use ffmpeg_next::software::scaling::{Context as ScalingContext, Flags as ScalingFlags};
use image::DynamicImage;
use sha2::{Digest, Sha256};

use crate::error::{FfmpegError, Result};

/// Hex digest of packed RGB24 rows.
pub fn hash_rgb_rows<'a, I>(rows: I) -> String
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut hasher = Sha256::new();
    for row in rows {
        hasher.update(row);
    }
    hex::encode(hasher.finalize())
}

/// Hex digest of a decoded image.
pub fn hash_image(image: &DynamicImage) -> String {
    let rgb = image.to_rgb8();
    let row_len = rgb.width() as usize * 3;
    if row_len == 0 {
        return hash_rgb_rows(std::iter::empty());
    }
    hash_rgb_rows(rgb.as_raw().chunks_exact(row_len))
}

struct CachedScaler {
    format: ffmpeg::format::Pixel,
    width: u32,
    height: u32,
    context: ScalingContext,
}

/// Hashes decoded video frames.
///
/// Keeps the RGB24 converter between calls; it is rebuilt only when the
/// source format or size changes.
#[derive(Default)]
pub struct ContentHasher {
    scaler: Option<CachedScaler>,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hex digest of a decoded video frame
    pub fn hash_frame(&mut self, frame: &ffmpeg::frame::Video) -> Result<String> {
        let (format, width, height) = (frame.format(), frame.width(), frame.height());

        let stale = match &self.scaler {
            Some(s) => s.format != format || s.width != width || s.height != height,
            None => true,
        };
        if stale {
            let context = ScalingContext::get(
                format,
                width,
                height,
                ffmpeg::format::Pixel::RGB24,
                width,
                height,
                ScalingFlags::BILINEAR,
            )
            .map_err(|e| {
                FfmpegError::Scale(format!(
                    "Cannot convert {:?} {}x{} to RGB24: {}",
                    format, width, height, e
                ))
            })?;
            self.scaler = Some(CachedScaler {
                format,
                width,
                height,
                context,
            });
        }

        let mut rgb = ffmpeg::frame::Video::empty();
        if let Some(scaler) = self.scaler.as_mut() {
            scaler
                .context
                .run(frame, &mut rgb)
                .map_err(|e| FfmpegError::Scale(format!("RGB24 conversion failed: {}", e)))?;
        }

        // Frame planes are padded to `stride`; only the visible bytes count.
        let stride = rgb.stride(0);
        let row_len = width as usize * 3;
        let data = rgb.data(0);
        let rows = (0..height as usize).map(|y| &data[y * stride..y * stride + row_len]);
        Ok(hash_rgb_rows(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, RgbaImage};

    #[test]
    fn test_hash_is_hex_sha256() {
        let digest = hash_rgb_rows([&[1u8, 2, 3][..]]);
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_row_split_does_not_matter() {
        let whole = hash_rgb_rows([&[1u8, 2, 3, 4, 5, 6][..]]);
        let split = hash_rgb_rows([&[1u8, 2, 3][..], &[4u8, 5, 6][..]]);
        assert_eq!(whole, split);
    }

    #[test]
    fn test_same_pixels_same_hash_across_layouts() {
        let rgb = RgbImage::from_pixel(4, 3, Rgb([10, 20, 30]));
        let rgba = RgbaImage::from_pixel(4, 3, image::Rgba([10, 20, 30, 255]));
        assert_eq!(
            hash_image(&DynamicImage::ImageRgb8(rgb)),
            hash_image(&DynamicImage::ImageRgba8(rgba))
        );
    }

    #[test]
    fn test_different_pixels_different_hash() {
        let a = RgbImage::from_pixel(2, 2, Rgb([0, 0, 0]));
        let b = RgbImage::from_pixel(2, 2, Rgb([0, 0, 1]));
        assert_ne!(
            hash_image(&DynamicImage::ImageRgb8(a)),
            hash_image(&DynamicImage::ImageRgb8(b))
        );
    }
}
