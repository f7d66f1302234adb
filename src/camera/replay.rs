use super::interface::FrameSource;
use crate::error::{CameraError, Result};
use crate::frame::Frame;

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// Replays a directory of still images in file name order.
///
/// Frame timestamps are synthetic: the open time plus one cycle interval per
/// frame, so replays of the same directory group events identically.
pub struct DirectorySource {
    directory: PathBuf,
    pending: VecDeque<PathBuf>,
    started_at: SystemTime,
    spacing: Duration,
    next_id: u64,
    dimensions: Option<(u32, u32)>,
}

impl DirectorySource {
    pub async fn open<P: AsRef<Path>>(directory: P, spacing: Duration) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        let device = directory.display().to_string();

        let mut entries = tokio::fs::read_dir(&directory)
            .await
            .map_err(|e| CameraError::DeviceOpen {
                device: device.clone(),
                details: e.to_string(),
            })?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_image && entry.file_type().await?.is_file() {
                files.push(path);
            }
        }
        files.sort();

        info!("Replaying {} frames from {}", files.len(), device);

        Ok(Self {
            directory,
            pending: files.into(),
            started_at: SystemTime::now(),
            spacing,
            next_id: 0,
            dimensions: None,
        })
    }

    /// Frames not yet delivered
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl FrameSource for DirectorySource {
    async fn capture(&mut self) -> Result<Option<Frame>> {
        let path = match self.pending.pop_front() {
            Some(path) => path,
            None => return Ok(None),
        };

        let id = self.next_id;
        self.next_id += 1;
        let timestamp = self.started_at + self.spacing * id as u32;

        let bytes = tokio::fs::read(&path).await.map_err(|e| CameraError::Capture {
            details: format!("{}: {}", path.display(), e),
        })?;
        let image = image::load_from_memory(&bytes)
            .map_err(|e| CameraError::InvalidFrame {
                details: format!("{}: {}", path.display(), e),
            })?
            .to_rgb8();

        let dimensions = image.dimensions();
        match self.dimensions {
            None => self.dimensions = Some(dimensions),
            Some(expected) if expected != dimensions => {
                return Err(CameraError::InvalidFrame {
                    details: format!(
                        "{} is {}x{}, session frames are {}x{}",
                        path.display(),
                        dimensions.0,
                        dimensions.1,
                        expected.0,
                        expected.1
                    ),
                }
                .into());
            }
            Some(_) => {}
        }

        debug!("Replaying frame {} from {}", id, path.display());
        Ok(Some(Frame::new(id, timestamp, image)))
    }

    fn is_live(&self) -> bool {
        false
    }

    fn describe(&self) -> String {
        format!("directory {}", self.directory.display())
    }
}
