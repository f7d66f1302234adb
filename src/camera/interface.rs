use super::replay::DirectorySource;
use crate::config::{SourceConfig, SourceKind};
use crate::error::{CameraError, Result};
use crate::frame::Frame;

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

/// Supplies frames to the detection loop, one per call.
///
/// Every frame of a session has the same resolution. `Ok(None)` marks the end
/// of a finite source; live sources never return it.
#[async_trait]
pub trait FrameSource: Send {
    async fn capture(&mut self) -> Result<Option<Frame>>;

    /// Live sources are paced by the cycle interval, finite ones run flat out
    fn is_live(&self) -> bool;

    fn describe(&self) -> String;

    /// Release the device
    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Open the source selected in the configuration
pub async fn open_source(config: &SourceConfig, cycle_interval: Duration) -> Result<Box<dyn FrameSource>> {
    let source: Box<dyn FrameSource> = match config.kind {
        SourceKind::Directory => {
            let directory = config.directory.as_deref().ok_or_else(|| CameraError::Configuration {
                details: "directory source requires source.directory".to_string(),
            })?;
            Box::new(DirectorySource::open(directory, cycle_interval).await?)
        }
        SourceKind::Camera => open_camera(config).await?,
    };

    info!("Opened frame source: {}", source.describe());
    Ok(source)
}

#[cfg(all(feature = "camera", target_os = "linux"))]
async fn open_camera(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    let camera = super::v4l2::GstCameraSource::open(config.device_index, config.resolution).await?;
    Ok(Box::new(camera))
}

#[cfg(not(all(feature = "camera", target_os = "linux")))]
async fn open_camera(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    Err(CameraError::DeviceOpen {
        device: format!("/dev/video{}", config.device_index),
        details: "built without the camera feature".to_string(),
    }
    .into())
}
