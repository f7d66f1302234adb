use crate::analyzer::Delta;
use crate::frame::Frame;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

/// Per-frame statistics recorded for every motion frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitRecord {
    pub hit_metric: u64,
    pub average_color: [u8; 3],
    /// Local hour the frame was captured, 0..=23
    pub hour_of_day: u8,
}

impl fmt::Display for HitRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t[{} {} {}]\t{:02}",
            self.hit_metric,
            self.average_color[0],
            self.average_color[1],
            self.average_color[2],
            self.hour_of_day
        )
    }
}

/// Everything the accumulator keeps for one motion frame
#[derive(Debug, Clone)]
pub struct MotionSample {
    pub frame: Frame,
    pub delta: Delta,
    pub record: HitRecord,
}

/// A closed run of motion frames with parallel deltas and hit records
#[derive(Debug, Clone, Default)]
pub struct MotionEvent {
    frames: Vec<Frame>,
    deltas: Vec<Delta>,
    hits: Vec<HitRecord>,
}

impl MotionEvent {
    fn push(&mut self, sample: MotionSample) {
        self.frames.push(sample.frame);
        self.deltas.push(sample.delta);
        self.hits.push(sample.record);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn deltas(&self) -> &[Delta] {
        &self.deltas
    }

    pub fn hits(&self) -> &[HitRecord] {
        &self.hits
    }

    /// Capture time of the first frame
    pub fn started_at(&self) -> Option<SystemTime> {
        self.frames.first().map(|frame| frame.timestamp)
    }

    /// Capture time of the last frame
    pub fn ended_at(&self) -> Option<SystemTime> {
        self.frames.last().map(|frame| frame.timestamp)
    }
}

/// Why an open event was flushed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushReason {
    /// No motion for longer than the event timeout
    Timeout,
    /// The event reached its maximum length
    MaxLength,
    /// The session is ending
    Shutdown,
}

impl fmt::Display for FlushReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FlushReason::Timeout => "timeout",
            FlushReason::MaxLength => "max length",
            FlushReason::Shutdown => "shutdown",
        };
        f.write_str(text)
    }
}

#[derive(Debug)]
pub enum FlushOutcome {
    /// Event long enough to export
    Closed {
        event: MotionEvent,
        reason: FlushReason,
    },
    /// Single-frame event, dropped
    Discarded { frames: usize, reason: FlushReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorState {
    Idle,
    Open,
}

/// Groups consecutive motion frames into events
#[derive(Debug)]
pub struct EventAccumulator {
    timeout: Duration,
    max_length: usize,
    open: Option<MotionEvent>,
    last_motion: Option<SystemTime>,
}

impl EventAccumulator {
    pub fn new(timeout: Duration, max_length: usize) -> Self {
        Self {
            timeout,
            max_length,
            open: None,
            last_motion: None,
        }
    }

    pub fn state(&self) -> AccumulatorState {
        if self.open.is_some() {
            AccumulatorState::Open
        } else {
            AccumulatorState::Idle
        }
    }

    /// Frames buffered in the open event
    pub fn buffered(&self) -> usize {
        self.open.as_ref().map_or(0, MotionEvent::len)
    }

    /// Time of the most recent motion frame this session, kept across events
    pub fn last_motion(&self) -> Option<SystemTime> {
        self.last_motion
    }

    /// Advance the state machine by one cycle.
    ///
    /// The timeout is checked before a new motion frame is appended, so an
    /// event that has gone quiet is never extended. The length cap is checked
    /// after the append and flushes in the same cycle it is reached.
    pub fn observe(&mut self, now: SystemTime, sample: Option<MotionSample>) -> Option<FlushOutcome> {
        let mut outcome = None;

        if self.open.is_some() && self.idle_for(now) > self.timeout {
            outcome = self.flush(FlushReason::Timeout);
        }

        if let Some(sample) = sample {
            let event = self.open.get_or_insert_with(|| {
                debug!("Opening motion event at frame {}", sample.frame.id);
                MotionEvent::default()
            });
            event.push(sample);
            self.last_motion = Some(now);

            if event.len() >= self.max_length {
                outcome = self.flush(FlushReason::MaxLength);
            }
        }

        outcome
    }

    /// Flush whatever is open at session end
    pub fn finish(&mut self) -> Option<FlushOutcome> {
        self.flush(FlushReason::Shutdown)
    }

    fn idle_for(&self, now: SystemTime) -> Duration {
        self.last_motion
            .and_then(|last| now.duration_since(last).ok())
            .unwrap_or_default()
    }

    fn flush(&mut self, reason: FlushReason) -> Option<FlushOutcome> {
        let event = self.open.take()?;

        if event.len() > 1 {
            info!("Motion event closed ({}) with {} frames", reason, event.len());
            Some(FlushOutcome::Closed { event, reason })
        } else {
            debug!(
                "Discarding motion event ({}) with {} frame(s)",
                reason,
                event.len()
            );
            Some(FlushOutcome::Discarded {
                frames: event.len(),
                reason,
            })
        }
    }
}
