use crate::error::{ChaincamError, ExportError, Result};
use crate::frame::Frame;

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, DynamicImage, Frame as GifFrame};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

const OPTIMIZER_TIMEOUT: Duration = Duration::from_secs(120);
const GIF_ENCODER_SPEED: i32 = 10;

/// Encode frames as a looping GIF with a fixed per-frame duration
pub(crate) fn encode_gif(frames: &[Frame], frame_seconds: f64) -> Result<Vec<u8>> {
    if frames.is_empty() {
        return Err(ExportError::Render {
            artifact: "animation",
            details: "no frames to animate".to_string(),
        }
        .into());
    }

    let delay_ms = (frame_seconds * 1000.0).round().clamp(10.0, u32::MAX as f64) as u32;
    let mut output = Vec::new();
    {
        let mut encoder = GifEncoder::new_with_speed(&mut output, GIF_ENCODER_SPEED);
        encoder.set_repeat(Repeat::Infinite)?;
        for frame in frames {
            let rgba = DynamicImage::ImageRgb8(frame.image().clone()).into_rgba8();
            encoder.encode_frame(GifFrame::from_parts(
                rgba,
                0,
                0,
                Delay::from_numer_denom_ms(delay_ms, 1),
            ))?;
        }
    }

    debug!(
        "Encoded {} frame GIF ({} bytes, {} ms per frame)",
        frames.len(),
        output.len(),
        delay_ms
    );
    Ok(output)
}

/// Run the external optimizer over `gif`, replacing it only on success.
///
/// Invoked as `<command> <args..> <gif> -o <tmp>`.
pub(crate) async fn optimize_gif(gif: &Path, command: &str, args: &[String]) -> Result<()> {
    let file_name = gif
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "animation.gif".to_string());
    let optimized = gif.with_file_name(format!(".{}.optimized", file_name));

    debug!("Optimizing {} with {}", gif.display(), command);

    let run = Command::new(command)
        .args(args)
        .arg(gif)
        .arg("-o")
        .arg(&optimized)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let result = match tokio::time::timeout(OPTIMIZER_TIMEOUT, run).await {
        Err(_) => Err(ChaincamError::component(
            "gif_optimizer",
            format!("{} timed out after {:?}", command, OPTIMIZER_TIMEOUT),
        )),
        Ok(Err(e)) => Err(ChaincamError::component(
            "gif_optimizer",
            format!("failed to run {}: {}", command, e),
        )),
        Ok(Ok(output)) if !output.status.success() => Err(ChaincamError::component(
            "gif_optimizer",
            format!(
                "{} exited with {}: {}",
                command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        )),
        Ok(Ok(_)) => tokio::fs::rename(&optimized, gif).await.map_err(Into::into),
    };

    if result.is_err() {
        let _ = tokio::fs::remove_file(&optimized).await;
    } else {
        info!("Optimized {}", gif.display());
    }
    result
}
