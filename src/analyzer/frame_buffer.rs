use crate::config::ReferenceMode;
use crate::frame::Frame;
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Holds the reference frame new frames are differenced against
#[derive(Debug)]
pub struct FrameBuffer {
    mode: ReferenceMode,
    refresh: Duration,
    reference: Option<Frame>,
    /// Capture time of the first frame, the still period's origin before any motion
    session_start: Option<SystemTime>,
}

impl FrameBuffer {
    pub fn new(mode: ReferenceMode, refresh: Duration) -> Self {
        Self {
            mode,
            refresh,
            reference: None,
            session_start: None,
        }
    }

    pub fn reference(&self) -> Option<&Frame> {
        self.reference.as_ref()
    }

    /// Apply the reference policy after a completed cycle.
    ///
    /// `last_motion` is the time of the most recent motion frame, if any has
    /// been seen this session. The first frame always becomes the reference.
    /// In anchor mode every frame captured more than the refresh period after
    /// the last motion replaces the reference.
    pub fn advance(&mut self, current: &Frame, last_motion: Option<SystemTime>) {
        let now = current.timestamp;

        if self.reference.is_none() {
            self.reference = Some(current.clone());
            self.session_start = Some(now);
            return;
        }

        match self.mode {
            ReferenceMode::Rolling => {
                self.reference = Some(current.clone());
            }
            ReferenceMode::Anchor => {
                let since = last_motion.or(self.session_start).unwrap_or(now);
                let still_for = now.duration_since(since).unwrap_or_default();

                if still_for > self.refresh {
                    debug!(
                        "Refreshing anchor reference with frame {} after {:.1}s without motion",
                        current.id,
                        still_for.as_secs_f64()
                    );
                    self.reference = Some(current.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::time::UNIX_EPOCH;

    fn frame_at(id: u64, seconds: u64) -> Frame {
        Frame::new(
            id,
            UNIX_EPOCH + Duration::from_secs(seconds),
            RgbImage::new(2, 2),
        )
    }

    #[test]
    fn test_first_frame_becomes_reference() {
        for mode in [ReferenceMode::Rolling, ReferenceMode::Anchor] {
            let mut buffer = FrameBuffer::new(mode, Duration::from_secs(60));
            assert!(buffer.reference().is_none());
            buffer.advance(&frame_at(1, 0), None);
            assert_eq!(buffer.reference().map(|f| f.id), Some(1));
        }
    }

    #[test]
    fn test_rolling_tracks_every_frame() {
        let mut buffer = FrameBuffer::new(ReferenceMode::Rolling, Duration::from_secs(60));
        for id in 1..=5 {
            buffer.advance(&frame_at(id, id), Some(UNIX_EPOCH + Duration::from_secs(id)));
            assert_eq!(buffer.reference().map(|f| f.id), Some(id));
        }
    }

    #[test]
    fn test_anchor_holds_until_still_period_passes() {
        let mut buffer = FrameBuffer::new(ReferenceMode::Anchor, Duration::from_secs(10));
        buffer.advance(&frame_at(1, 0), None);

        // Motion at t=5 pushes the refresh out to t>15
        buffer.advance(&frame_at(2, 5), Some(UNIX_EPOCH + Duration::from_secs(5)));
        buffer.advance(&frame_at(3, 10), Some(UNIX_EPOCH + Duration::from_secs(5)));
        buffer.advance(&frame_at(4, 15), Some(UNIX_EPOCH + Duration::from_secs(5)));
        assert_eq!(buffer.reference().map(|f| f.id), Some(1));

        buffer.advance(&frame_at(5, 16), Some(UNIX_EPOCH + Duration::from_secs(5)));
        assert_eq!(buffer.reference().map(|f| f.id), Some(5));

        // Still scene keeps the reference following the frames
        buffer.advance(&frame_at(6, 20), Some(UNIX_EPOCH + Duration::from_secs(5)));
        assert_eq!(buffer.reference().map(|f| f.id), Some(6));
        buffer.advance(&frame_at(7, 21), Some(UNIX_EPOCH + Duration::from_secs(5)));
        assert_eq!(buffer.reference().map(|f| f.id), Some(7));

        // New motion holds the anchor again
        buffer.advance(&frame_at(8, 22), Some(UNIX_EPOCH + Duration::from_secs(22)));
        buffer.advance(&frame_at(9, 30), Some(UNIX_EPOCH + Duration::from_secs(22)));
        assert_eq!(buffer.reference().map(|f| f.id), Some(7));
    }

    #[test]
    fn test_anchor_replaces_on_consecutive_still_frames() {
        let mut buffer = FrameBuffer::new(ReferenceMode::Anchor, Duration::from_secs(10));
        let motion = Some(UNIX_EPOCH + Duration::from_secs(5));
        buffer.advance(&frame_at(1, 0), None);
        buffer.advance(&frame_at(2, 16), motion);
        assert_eq!(buffer.reference().map(|f| f.id), Some(2));
        buffer.advance(&frame_at(3, 17), motion);
        assert_eq!(buffer.reference().map(|f| f.id), Some(3));
    }

    #[test]
    fn test_anchor_refreshes_without_any_motion() {
        let mut buffer = FrameBuffer::new(ReferenceMode::Anchor, Duration::from_secs(3));
        buffer.advance(&frame_at(1, 0), None);
        buffer.advance(&frame_at(2, 3), None);
        assert_eq!(buffer.reference().map(|f| f.id), Some(1));
        buffer.advance(&frame_at(3, 4), None);
        assert_eq!(buffer.reference().map(|f| f.id), Some(3));
    }
}
