//! Boundary types for the external decode/detect capability.
//!
//! The image codec and the interest-point detector are external
//! collaborators: mature native libraries do that work, this crate only
//! defines the seam. Implementations plug in through [`FeatureExtractor`].

use crate::vocabulary::DESCRIPTOR_DIM;

/// Errors a [`FeatureExtractor`] implementation can report.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// The byte buffer is not a decodable image (malformed bytes,
    /// unsupported format, or an empty result).
    #[error("decode failed: {0}")]
    Decode(String),
    /// The detector failed on a decoded image.
    #[error("detection failed: {0}")]
    Detection(String),
}

/// A decoded single-channel image.
///
/// Always grayscale: decoders force one channel regardless of the source
/// color format. Guaranteed non-empty; both dimensions are at least 1.
#[derive(Debug, Clone)]
pub struct GrayImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl GrayImage {
    /// Builds an image from row-major single-channel pixels.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::Decode`] when either dimension is zero or
    /// the pixel count does not equal `width * height`.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, ExtractionError> {
        if width == 0 || height == 0 {
            return Err(ExtractionError::Decode("empty image".into()));
        }
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(ExtractionError::Decode(format!(
                "{}x{} image needs {expected} pixels, got {}",
                width,
                height,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Image width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major pixel data, one byte per pixel.
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

/// A detected local feature.
#[derive(Debug, Clone)]
pub struct Keypoint {
    /// Horizontal position within the image, `0.0 <= x < width`.
    pub x: f32,
    /// Vertical position within the image, `0.0 <= y < height`.
    pub y: f32,
    /// Orientation in degrees, `0.0 <= angle < 360.0`.
    pub angle: f32,
    /// Appearance descriptor in the vocabulary's 128-dimensional space.
    pub descriptor: Vec<f32>,
}

impl Keypoint {
    /// Returns `true` when the descriptor lives in the vocabulary's space.
    #[must_use]
    pub fn has_expected_dimension(&self) -> bool {
        self.descriptor.len() == DESCRIPTOR_DIM
    }
}

/// The external decode + detect capability.
///
/// One implementation is shared across all worker threads, so implementations
/// must be `Send + Sync` and stateless per call.
pub trait FeatureExtractor: Send + Sync {
    /// Decodes an encoded image byte buffer into a grayscale pixel grid.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::Decode`] for malformed bytes, unsupported
    /// formats, or an empty decode result.
    fn decode(&self, bytes: &[u8]) -> Result<GrayImage, ExtractionError>;

    /// Detects keypoints and computes their descriptors, in detector order.
    ///
    /// Zero keypoints is a valid outcome, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::Detection`] when the detector itself fails.
    fn extract(&self, image: &GrayImage) -> Result<Vec<Keypoint>, ExtractionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_dimension_images_are_rejected() {
        assert!(GrayImage::new(0, 240, Vec::new()).is_err());
        assert!(GrayImage::new(320, 0, Vec::new()).is_err());
    }

    #[test]
    fn pixel_count_must_match_dimensions() {
        assert!(GrayImage::new(4, 4, vec![0; 15]).is_err());
        let image = GrayImage::new(4, 4, vec![0; 16]).unwrap();
        assert_eq!(image.width(), 4);
        assert_eq!(image.height(), 4);
        assert_eq!(image.pixels().len(), 16);
    }

    #[test]
    fn keypoint_dimension_check() {
        let keypoint = Keypoint {
            x: 1.0,
            y: 2.0,
            angle: 45.0,
            descriptor: vec![0.0; DESCRIPTOR_DIM],
        };
        assert!(keypoint.has_expected_dimension());

        let short = Keypoint {
            descriptor: vec![0.0; 64],
            ..keypoint
        };
        assert!(!short.has_expected_dimension());
    }
}
