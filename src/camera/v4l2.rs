use super::interface::FrameSource;
use crate::error::{CameraError, ChaincamError, Result};
use crate::frame::{Frame, FrameFormat};

use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use std::time::SystemTime;
use tracing::{debug, info, trace, warn};

const SAMPLE_TIMEOUT_SECONDS: u64 = 5;

/// V4L2 camera delivering MJPEG through GStreamer.
///
/// The appsink keeps only the newest sample, so each capture sees the current
/// scene rather than a backlog from the previous cycle.
pub struct GstCameraSource {
    device_index: u32,
    resolution: (u32, u32),
    pipeline: Pipeline,
    appsink: AppSink,
    next_id: u64,
}

impl GstCameraSource {
    pub async fn open(device_index: u32, resolution: (u32, u32)) -> Result<Self> {
        let device = format!("/dev/video{}", device_index);
        info!(
            "Initializing GStreamer camera {} at {}x{}",
            device, resolution.0, resolution.1
        );

        gstreamer::init().map_err(|e| CameraError::Configuration {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;

        let pipeline_desc = format!(
            "v4l2src device={} io-mode=mmap do-timestamp=true ! \
             image/jpeg,width={},height={} ! \
             queue max-size-buffers=2 leaky=downstream ! \
             appsink name=sink sync=false max-buffers=1 drop=true emit-signals=false",
            device, resolution.0, resolution.1
        );
        debug!("Creating GStreamer pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| CameraError::DeviceOpen {
                device: device.clone(),
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| CameraError::Configuration {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| CameraError::Configuration {
                details: "Failed to get appsink element".to_string(),
            })?
            .downcast::<AppSink>()
            .map_err(|_| CameraError::Configuration {
                details: "Failed to downcast to AppSink".to_string(),
            })?;

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| CameraError::DeviceOpen {
                device,
                details: format!("Failed to start pipeline: {}", e),
            })?;

        Ok(Self {
            device_index,
            resolution,
            pipeline,
            appsink,
            next_id: 0,
        })
    }
}

#[async_trait]
impl FrameSource for GstCameraSource {
    async fn capture(&mut self) -> Result<Option<Frame>> {
        let appsink = self.appsink.clone();
        let sample = tokio::task::spawn_blocking(move || {
            appsink.try_pull_sample(gstreamer::ClockTime::from_seconds(SAMPLE_TIMEOUT_SECONDS))
        })
        .await
        .map_err(|e| ChaincamError::component("camera", format!("capture task failed: {}", e)))?
        .ok_or_else(|| CameraError::Capture {
            details: format!("no sample within {}s", SAMPLE_TIMEOUT_SECONDS),
        })?;

        let buffer = sample.buffer().ok_or_else(|| CameraError::Capture {
            details: "No buffer in sample".to_string(),
        })?;
        let map = buffer.map_readable().map_err(|e| CameraError::Capture {
            details: format!("Failed to map buffer: {}", e),
        })?;

        let id = self.next_id;
        self.next_id += 1;
        trace!("Captured MJPEG frame {} ({} bytes)", id, map.len());

        let (width, height) = self.resolution;
        let frame = Frame::from_raw(
            id,
            SystemTime::now(),
            map.as_slice().to_vec(),
            width,
            height,
            FrameFormat::Mjpeg,
        )?;
        Ok(Some(frame))
    }

    fn is_live(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        format!(
            "camera /dev/video{} ({}x{} MJPEG)",
            self.device_index, self.resolution.0, self.resolution.1
        )
    }

    async fn stop(&mut self) -> Result<()> {
        self.pipeline
            .set_state(gstreamer::State::Null)
            .map_err(|e| CameraError::Configuration {
                details: format!("Failed to stop pipeline: {}", e),
            })?;
        info!("GStreamer camera stopped");
        Ok(())
    }
}

impl Drop for GstCameraSource {
    fn drop(&mut self) {
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            warn!("Failed to release camera pipeline: {}", e);
        }
    }
}
