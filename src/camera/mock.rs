use super::interface::FrameSource;
use crate::error::{CameraError, Result};
use crate::frame::Frame;

use async_trait::async_trait;
use image::RgbImage;
use std::collections::VecDeque;
use std::time::{Duration, UNIX_EPOCH};

#[derive(Debug, Clone)]
enum MockStep {
    Image(RgbImage),
    Fail(String),
}

/// Scripted frame source for exercising the detection loop.
///
/// Timestamps start at the Unix epoch and advance one interval per step,
/// failed steps included.
#[derive(Debug, Clone)]
pub struct MockFrameSource {
    steps: VecDeque<MockStep>,
    interval: Duration,
    live: bool,
    step: u64,
    next_id: u64,
}

impl MockFrameSource {
    pub fn new(interval: Duration) -> Self {
        Self {
            steps: VecDeque::new(),
            interval,
            live: false,
            step: 0,
            next_id: 0,
        }
    }

    /// Pace the source like a camera
    pub fn live(mut self) -> Self {
        self.live = true;
        self
    }

    pub fn frame(mut self, image: RgbImage) -> Self {
        self.steps.push_back(MockStep::Image(image));
        self
    }

    pub fn frames<I: IntoIterator<Item = RgbImage>>(mut self, images: I) -> Self {
        self.steps.extend(images.into_iter().map(MockStep::Image));
        self
    }

    pub fn failure(mut self, details: impl Into<String>) -> Self {
        self.steps.push_back(MockStep::Fail(details.into()));
        self
    }

    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

#[async_trait]
impl FrameSource for MockFrameSource {
    async fn capture(&mut self) -> Result<Option<Frame>> {
        let step = match self.steps.pop_front() {
            Some(step) => step,
            None => return Ok(None),
        };
        let timestamp = UNIX_EPOCH + self.interval * self.step as u32;
        self.step += 1;

        match step {
            MockStep::Image(image) => {
                let frame = Frame::new(self.next_id, timestamp, image);
                self.next_id += 1;
                Ok(Some(frame))
            }
            MockStep::Fail(details) => Err(CameraError::Capture { details }.into()),
        }
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn describe(&self) -> String {
        format!("mock ({} steps queued)", self.steps.len())
    }
}

