//! Fixed-point quantization of keypoint pose.
//!
//! Angle and position are recorded on 16 bits each: the half-open source
//! range maps linearly onto `[0, 65536)` and the result is truncated toward
//! zero. An angle of 0 encodes as 0; an angle approaching 360 encodes as a
//! value approaching (but never reaching) 65536, and likewise for positions
//! against the image extent.

use crate::features::Keypoint;

/// One past the largest encodable value: `1 << 16`.
const SCALE: f32 = 65536.0;

/// The 16-bit pose shared by all hits of one keypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantizedPose {
    /// Orientation, `[0, 360)` degrees mapped onto `[0, 65536)`.
    pub angle: u16,
    /// Horizontal position, `[0, width)` mapped onto `[0, 65536)`.
    pub x: u16,
    /// Vertical position, `[0, height)` mapped onto `[0, 65536)`.
    pub y: u16,
}

/// Quantizes an orientation angle in degrees, `[0, 360)`.
// Float-to-int casts saturate at the target type's range, so inputs outside
// the contract clamp to 0 or 65535 instead of wrapping.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
#[must_use]
pub fn quantize_angle(degrees: f32) -> u16 {
    (degrees / 360.0 * SCALE) as u16
}

/// Quantizes a position in `[0, extent)` pixels against the image extent.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
#[allow(clippy::cast_precision_loss)] // image extents are far below 2^24
#[must_use]
pub fn quantize_coord(value: f32, extent: u32) -> u16 {
    (value / extent as f32 * SCALE) as u16
}

/// Quantizes a keypoint's full pose against the image dimensions.
#[must_use]
pub fn quantize_pose(keypoint: &Keypoint, width: u32, height: u32) -> QuantizedPose {
    QuantizedPose {
        angle: quantize_angle(keypoint.angle),
        x: quantize_coord(keypoint.x, width),
        y: quantize_coord(keypoint.y, height),
    }
}
