use crate::error::{CameraError, Result};
use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// Pixel layouts a frame source may hand over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// Motion JPEG format - compressed JPEG frames
    Mjpeg,
    /// Packed 8-bit RGB
    Rgb24,
    /// Packed 8-bit BGR, as delivered by OpenCV-style pipelines
    Bgr24,
}

impl FrameFormat {
    /// Get bytes per pixel for the format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            FrameFormat::Mjpeg => 0, // Variable size, compressed
            FrameFormat::Rgb24 | FrameFormat::Bgr24 => 3,
        }
    }

    /// Check if format is compressed
    pub fn is_compressed(&self) -> bool {
        matches!(self, FrameFormat::Mjpeg)
    }
}

/// One captured image. Cloning shares the pixel data.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Sequence number within the session
    pub id: u64,
    /// Time the frame was captured
    pub timestamp: SystemTime,
    image: Arc<RgbImage>,
}

impl Frame {
    pub fn new(id: u64, timestamp: SystemTime, image: RgbImage) -> Self {
        Self {
            id,
            timestamp,
            image: Arc::new(image),
        }
    }

    /// Build a frame from raw source bytes, rejecting anything malformed.
    ///
    /// Uncompressed data must be exactly `width * height * 3` bytes. Compressed
    /// data must decode to the declared dimensions.
    pub fn from_raw(
        id: u64,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(CameraError::InvalidFrame {
                details: format!("frame {} has zero dimension {}x{}", id, width, height),
            }
            .into());
        }

        let image = match format {
            FrameFormat::Mjpeg => {
                let decoded = image::load_from_memory_with_format(&data, ImageFormat::Jpeg)
                    .map_err(|e| CameraError::InvalidFrame {
                        details: format!("MJPEG decode failed for frame {}: {}", id, e),
                    })?
                    .to_rgb8();
                if decoded.dimensions() != (width, height) {
                    return Err(CameraError::InvalidFrame {
                        details: format!(
                            "frame {} decoded to {}x{}, expected {}x{}",
                            id,
                            decoded.width(),
                            decoded.height(),
                            width,
                            height
                        ),
                    }
                    .into());
                }
                decoded
            }
            FrameFormat::Rgb24 | FrameFormat::Bgr24 => {
                let expected = width as usize * height as usize * format.bytes_per_pixel();
                if data.len() != expected {
                    return Err(CameraError::InvalidFrame {
                        details: format!(
                            "frame {} has {} bytes, expected {} for {}x{} {:?}",
                            id,
                            data.len(),
                            expected,
                            width,
                            height,
                            format
                        ),
                    }
                    .into());
                }

                let mut data = data;
                if format == FrameFormat::Bgr24 {
                    for pixel in data.chunks_exact_mut(3) {
                        pixel.swap(0, 2);
                    }
                }

                RgbImage::from_raw(width, height, data).ok_or_else(|| {
                    CameraError::InvalidFrame {
                        details: format!("frame {} buffer rejected", id),
                    }
                })?
            }
        };

        Ok(Self::new(id, timestamp, image))
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}
