use super::overlay::TimestampOverlay;
use crate::analyzer::Delta;
use crate::error::{ExportError, Result};
use crate::frame::Frame;

use image::codecs::jpeg::JpegEncoder;
use image::{GenericImage, GenericImageView, GrayImage, ImageBuffer, Pixel, PixelWithColorType, RgbImage};

/// Stack images top to bottom in order. All parts must share one size.
fn stack_vertically<P>(
    artifact: &'static str,
    parts: &[ImageBuffer<P, Vec<P::Subpixel>>],
) -> Result<ImageBuffer<P, Vec<P::Subpixel>>>
where
    P: Pixel,
{
    let (width, height) = match parts.first() {
        Some(first) => first.dimensions(),
        None => {
            return Err(ExportError::Render {
                artifact,
                details: "no images to concatenate".to_string(),
            }
            .into())
        }
    };

    if let Some(odd) = parts.iter().find(|part| part.dimensions() != (width, height)) {
        return Err(ExportError::Render {
            artifact,
            details: format!(
                "image of {}x{} in a {}x{} chain",
                odd.width(),
                odd.height(),
                width,
                height
            ),
        }
        .into());
    }

    let mut canvas = ImageBuffer::new(width, height * parts.len() as u32);
    for (index, part) in parts.iter().enumerate() {
        canvas
            .copy_from(part, 0, height * index as u32)
            .map_err(|e| ExportError::Render {
                artifact,
                details: e.to_string(),
            })?;
    }
    Ok(canvas)
}

/// Concatenate event frames in capture order, stamping each when an overlay is set
pub(crate) fn render_chain(frames: &[Frame], overlay: Option<&TimestampOverlay>) -> Result<RgbImage> {
    let parts: Vec<RgbImage> = frames
        .iter()
        .map(|frame| {
            let mut image = frame.image().clone();
            if let Some(overlay) = overlay {
                overlay.apply(&mut image, frame.timestamp);
            }
            image
        })
        .collect();
    stack_vertically("chain", &parts)
}

/// Concatenate event deltas as 8-bit grayscale
pub(crate) fn render_delta_chain(deltas: &[Delta]) -> Result<GrayImage> {
    let parts: Vec<GrayImage> = deltas.iter().map(Delta::to_luma).collect();
    stack_vertically("delta", &parts)
}

pub(crate) fn encode_jpeg<I>(image: &I, quality: u8) -> Result<Vec<u8>>
where
    I: GenericImageView,
    I::Pixel: PixelWithColorType,
{
    let mut output = Vec::new();
    JpegEncoder::new_with_quality(&mut output, quality).encode_image(image)?;
    Ok(output)
}
