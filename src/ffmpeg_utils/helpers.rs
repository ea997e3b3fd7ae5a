//! Safe wrappers around FFmpeg FFI calls.
//!
//! All `unsafe` blocks needed by the video reader live here with explicit
//! safety arguments. Callers outside this module never write `unsafe` for
//! routine FFmpeg access.

use ffmpeg_next as ffmpeg;

// ── Frame field accessors ───────────────────────────────────────────────────

/// Read `pkt_dts` (the DTS of the packet that produced this frame).
///
/// `ffmpeg-next` does not expose this field through a safe accessor.
/// Returns `None` for `AV_NOPTS_VALUE`.
pub fn frame_packet_dts(frame: &ffmpeg::frame::Video) -> Option<i64> {
    // SAFETY: `as_ptr()` is valid for the lifetime of `frame`; `pkt_dts` is a
    // plain i64 field with no ownership semantics.
    let dts = unsafe { (*frame.as_ptr()).pkt_dts };
    // AV_NOPTS_VALUE in rust is i64::MIN
    if dts == i64::MIN {
        None
    } else {
        Some(dts)
    }
}

// ── Stream orientation ──────────────────────────────────────────────────────

/// Rotation of a video stream in degrees, counter-clockwise, as stored in
/// the container.
///
/// Looks at the display matrix attached to the codec parameters first and
/// falls back to the legacy `rotate` metadata tag. Returns `None` when the
/// stream carries no orientation information.
pub fn stream_rotation(stream: &ffmpeg::Stream) -> Option<f64> {
    if let Some(matrix) = display_matrix(&stream.parameters()) {
        if let Some(rotation) = display_matrix_rotation(&matrix) {
            return Some(rotation);
        }
    }

    stream
        .metadata()
        .get("rotate")
        .and_then(|v| v.trim().parse::<f64>().ok())
        .map(|clockwise| -clockwise)
}

/// Copy the 3x3 display matrix out of `coded_side_data`, if present.
fn display_matrix(params: &ffmpeg::codec::Parameters) -> Option<[i32; 9]> {
    // SAFETY: `params.as_ptr()` is valid for the lifetime of `params`.
    // `coded_side_data` points at `nb_coded_side_data` contiguous entries
    // owned by the codec parameters; we only read them. The display matrix
    // payload is 9 native-endian i32 values (36 bytes), checked via `size`.
    unsafe {
        let p = params.as_ptr();
        let count = (*p).nb_coded_side_data;
        let entries = (*p).coded_side_data;
        if entries.is_null() || count <= 0 {
            return None;
        }
        for i in 0..count as usize {
            let sd = &*entries.add(i);
            if sd.type_ != ffmpeg::ffi::AVPacketSideDataType::AV_PKT_DATA_DISPLAYMATRIX {
                continue;
            }
            if sd.data.is_null() || sd.size < 9 * std::mem::size_of::<i32>() {
                return None;
            }
            let mut matrix = [0i32; 9];
            std::ptr::copy_nonoverlapping(
                sd.data as *const u8,
                matrix.as_mut_ptr() as *mut u8,
                9 * std::mem::size_of::<i32>(),
            );
            return Some(matrix);
        }
        None
    }
}

/// Counter-clockwise rotation encoded in a display matrix, in degrees.
///
/// Same computation as libavutil's `av_display_rotation_get`: the matrix
/// holds 16.16 fixed point values and the rotation is read from the
/// normalised first two columns.
pub fn display_matrix_rotation(matrix: &[i32; 9]) -> Option<f64> {
    let fp = |v: i32| v as f64 / 65536.0;
    let scale0 = fp(matrix[0]).hypot(fp(matrix[3]));
    let scale1 = fp(matrix[1]).hypot(fp(matrix[4]));
    if scale0 == 0.0 || scale1 == 0.0 {
        return None;
    }
    let rotation = (fp(matrix[1]) / scale1)
        .atan2(fp(matrix[0]) / scale0)
        .to_degrees();
    Some(-rotation)
}

/// True if a rotation swaps the displayed width and height.
pub fn is_quarter_turn(rotation: f64) -> bool {
    let normalized = rotation.round().rem_euclid(360.0) as i64;
    normalized == 90 || normalized == 270
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE: i32 = 1 << 16;

    #[test]
    fn test_identity_matrix_has_no_rotation() {
        let matrix = [ONE, 0, 0, 0, ONE, 0, 0, 0, 1 << 30];
        let rotation = display_matrix_rotation(&matrix).unwrap();
        assert!(rotation.abs() < 0.001);
        assert!(!is_quarter_turn(rotation));
    }

    #[test]
    fn test_quarter_turn_matrix() {
        // 90 degree counter-clockwise rotation
        let matrix = [0, -ONE, 0, ONE, 0, 0, 0, 0, 1 << 30];
        let rotation = display_matrix_rotation(&matrix).unwrap();
        assert!((rotation - 90.0).abs() < 0.001);
        assert!(is_quarter_turn(rotation));
    }

    #[test]
    fn test_degenerate_matrix() {
        assert!(display_matrix_rotation(&[0; 9]).is_none());
    }

    #[test]
    fn test_is_quarter_turn() {
        assert!(is_quarter_turn(-90.0));
        assert!(is_quarter_turn(270.0));
        assert!(is_quarter_turn(450.0));
        assert!(!is_quarter_turn(180.0));
        assert!(!is_quarter_turn(0.0));
    }
}
