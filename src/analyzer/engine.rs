use super::{
    difference::Differencer,
    frame_buffer::FrameBuffer,
    hits::{HitEvaluation, HitEvaluator},
};
use crate::capture::{
    EventAccumulator, EventStatistics, EventSummary, FlushOutcome, FlushReason, HitRecord,
    MotionEvent, MotionSample,
};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::frame::Frame;

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use std::time::SystemTime;
use tracing::{debug, info};

/// An event ready for export
#[derive(Debug, Clone)]
pub struct ClosedEvent {
    pub event: MotionEvent,
    pub summary: EventSummary,
    pub reason: FlushReason,
    /// Capture time of the cycle that closed the event
    pub closed_at: SystemTime,
}

#[derive(Debug, Clone)]
pub enum EventClosure {
    Closed(ClosedEvent),
    Discarded { frames: usize, reason: FlushReason },
}

/// What happened during one detection cycle
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub evaluation: HitEvaluation,
    pub closure: Option<EventClosure>,
}

/// Session-long detection state: reference frame, accumulator, and strategy
pub struct MotionEngine {
    config: EngineConfig,
    differencer: Differencer,
    evaluator: HitEvaluator,
    accumulator: EventAccumulator,
    buffer: FrameBuffer,
    timezone: Tz,
    last_seen: Option<SystemTime>,
    cycles: u64,
}

impl MotionEngine {
    /// Build an engine for a validated configuration. `timezone` sets the
    /// hour recorded in each hit record.
    pub fn new(config: EngineConfig, timezone: Tz) -> Self {
        info!(
            "Motion engine using {:?} strategy with {:?} reference",
            config.strategy, config.reference_mode
        );

        Self {
            differencer: Differencer::new(&config),
            evaluator: HitEvaluator::new(config.min_hit_pixels),
            accumulator: EventAccumulator::new(config.event_timeout(), config.max_event_length),
            buffer: FrameBuffer::new(config.reference_mode, config.reference_refresh()),
            config,
            timezone,
            last_seen: None,
            cycles: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn accumulator(&self) -> &EventAccumulator {
        &self.accumulator
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run one cycle for a freshly captured frame.
    ///
    /// An analyzer error leaves the accumulator and the reference frame
    /// untouched, so the next frame is compared against the same reference.
    pub fn process(&mut self, frame: Frame) -> Result<CycleOutcome> {
        let difference = self.differencer.compute(&frame, self.buffer.reference())?;
        let now = frame.timestamp;
        self.cycles += 1;
        self.last_seen = Some(now);

        let (evaluation, sample) = match difference {
            None => (HitEvaluation::still(), None),
            Some(difference) => {
                let evaluation = self.evaluator.evaluate(&difference, &frame);
                let sample = if evaluation.is_motion {
                    debug!(
                        "Frame {}: {} hits, motion",
                        frame.id, evaluation.hit_metric
                    );
                    Some(MotionSample {
                        frame: frame.clone(),
                        delta: difference.into_delta(),
                        record: HitRecord {
                            hit_metric: evaluation.hit_metric,
                            average_color: evaluation.average_color.unwrap_or([0, 0, 0]),
                            hour_of_day: self.hour_of_day(now),
                        },
                    })
                } else {
                    None
                };
                (evaluation, sample)
            }
        };

        let flushed = self.accumulator.observe(now, sample);
        self.buffer.advance(&frame, self.accumulator.last_motion());

        Ok(CycleOutcome {
            evaluation,
            closure: flushed.map(|outcome| self.close(outcome, now)),
        })
    }

    /// Flush any open event at session end
    pub fn finish(&mut self) -> Option<EventClosure> {
        let closed_at = self.last_seen.unwrap_or_else(SystemTime::now);
        self.accumulator
            .finish()
            .map(|outcome| self.close(outcome, closed_at))
    }

    fn close(&self, outcome: FlushOutcome, closed_at: SystemTime) -> EventClosure {
        match outcome {
            FlushOutcome::Closed { event, reason } => {
                match EventStatistics::summarize(event.hits(), self.config.classification_threshold) {
                    Some(summary) => EventClosure::Closed(ClosedEvent {
                        event,
                        summary,
                        reason,
                        closed_at,
                    }),
                    None => EventClosure::Discarded {
                        frames: event.len(),
                        reason,
                    },
                }
            }
            FlushOutcome::Discarded { frames, reason } => EventClosure::Discarded { frames, reason },
        }
    }

    fn hour_of_day(&self, at: SystemTime) -> u8 {
        DateTime::<Utc>::from(at).with_timezone(&self.timezone).hour() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DifferenceStrategy, ReferenceMode};
    use crate::error::{AnalyzerError, ChaincamError};
    use image::{Rgb, RgbImage};
    use std::time::{Duration, UNIX_EPOCH};

    const WIDTH: u32 = 100;
    const HEIGHT: u32 = 40;

    fn anchor_config() -> EngineConfig {
        EngineConfig {
            strategy: DifferenceStrategy::Lab,
            reference_mode: ReferenceMode::Anchor,
            difference_threshold: 10.0,
            min_hit_pixels: 1000,
            blur_kernel_size: 1,
            event_timeout_seconds: 2.0,
            max_event_length: 30,
            classification_threshold: None,
            cycle_interval_seconds: 1.0,
            reference_refresh_seconds: 60.0,
            ..EngineConfig::default()
        }
    }

    /// Black frame with the first `lit` pixels in raster order set white
    fn lit_frame(id: u64, lit: u32) -> Frame {
        let mut image = RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([0, 0, 0]));
        for index in 0..lit {
            image.put_pixel(index % WIDTH, index / WIDTH, Rgb([255, 255, 255]));
        }
        Frame::new(id, UNIX_EPOCH + Duration::from_secs(id), image)
    }

    fn at_hour(frame: Frame) -> Frame {
        let timestamp = UNIX_EPOCH + Duration::from_secs(frame.id * 3600);
        Frame::new(frame.id, timestamp, frame.image().clone())
    }

    fn run(engine: &mut MotionEngine, counts: &[u32]) -> Vec<(u64, CycleOutcome)> {
        counts
            .iter()
            .enumerate()
            .map(|(i, lit)| {
                let id = i as u64;
                (id, engine.process(lit_frame(id, *lit)).unwrap())
            })
            .collect()
    }

    #[test]
    fn test_first_cycle_is_still() {
        let mut engine = MotionEngine::new(anchor_config(), chrono_tz::UTC);
        let outcome = engine.process(lit_frame(0, 4000)).unwrap();
        assert!(!outcome.evaluation.is_motion);
        assert_eq!(outcome.evaluation.hit_metric, 0);
        assert!(outcome.closure.is_none());
    }

    #[test]
    fn test_sub_threshold_frame_does_not_extend_event() {
        let mut engine = MotionEngine::new(anchor_config(), chrono_tz::UTC);
        let outcomes = run(&mut engine, &[0, 1500, 1800, 900, 0, 0, 0]);

        let hits: Vec<u64> = outcomes.iter().map(|(_, o)| o.evaluation.hit_metric).collect();
        assert_eq!(hits, vec![0, 1500, 1800, 900, 0, 0, 0]);

        let closures: Vec<(u64, &EventClosure)> = outcomes
            .iter()
            .filter_map(|(id, o)| o.closure.as_ref().map(|c| (*id, c)))
            .collect();
        assert_eq!(closures.len(), 1);

        let (id, closure) = closures[0];
        assert_eq!(id, 5);
        match closure {
            EventClosure::Closed(closed) => {
                let metrics: Vec<u64> = closed.event.hits().iter().map(|h| h.hit_metric).collect();
                assert_eq!(metrics, vec![1500, 1800]);
                assert_eq!(closed.summary.mean_hits, 1650.0);
                assert_eq!(closed.summary.mean_color, [255.0, 255.0, 255.0]);
                assert_eq!(closed.reason, FlushReason::Timeout);
                assert_eq!(closed.closed_at, UNIX_EPOCH + Duration::from_secs(5));
            }
            other => panic!("expected closed event, got {:?}", other),
        }
    }

    #[test]
    fn test_continuous_motion_flushes_at_max_length() {
        let mut config = anchor_config();
        config.max_event_length = 3;
        let mut engine = MotionEngine::new(config, chrono_tz::UTC);

        let outcomes = run(&mut engine, &[0, 2000, 2000, 2000, 2000, 2000]);
        let closures: Vec<u64> = outcomes
            .iter()
            .filter(|(_, o)| matches!(o.closure, Some(EventClosure::Closed(_))))
            .map(|(id, _)| *id)
            .collect();
        assert_eq!(closures, vec![3]);
        assert_eq!(engine.accumulator().buffered(), 2);

        match engine.finish() {
            Some(EventClosure::Closed(closed)) => {
                assert_eq!(closed.reason, FlushReason::Shutdown);
                assert_eq!(closed.event.len(), 2);
            }
            other => panic!("expected shutdown flush, got {:?}", other),
        }
        assert!(engine.finish().is_none());
    }

    #[test]
    fn test_single_motion_frame_is_discarded() {
        let mut engine = MotionEngine::new(anchor_config(), chrono_tz::UTC);
        let outcomes = run(&mut engine, &[0, 2000, 0, 0, 0]);
        let closure = outcomes.iter().find_map(|(_, o)| o.closure.clone());
        assert!(matches!(
            closure,
            Some(EventClosure::Discarded {
                frames: 1,
                reason: FlushReason::Timeout
            })
        ));
    }

    #[test]
    fn test_rolling_reference_compares_consecutive_frames() {
        let mut config = anchor_config();
        config.reference_mode = ReferenceMode::Rolling;
        let mut engine = MotionEngine::new(config, chrono_tz::UTC);

        let outcomes = run(&mut engine, &[0, 1500, 1800, 1800]);
        let hits: Vec<u64> = outcomes.iter().map(|(_, o)| o.evaluation.hit_metric).collect();
        assert_eq!(hits, vec![0, 1500, 300, 0]);
    }

    #[test]
    fn test_dimension_mismatch_skips_cycle() {
        let mut engine = MotionEngine::new(anchor_config(), chrono_tz::UTC);
        engine.process(lit_frame(0, 0)).unwrap();

        let odd = Frame::new(1, UNIX_EPOCH, RgbImage::new(WIDTH + 1, HEIGHT));
        let result = engine.process(odd);
        assert!(matches!(
            result,
            Err(ChaincamError::Analyzer(AnalyzerError::DimensionMismatch { .. }))
        ));
        assert_eq!(engine.cycles(), 1);

        // Reference is still the original black frame
        let outcome = engine.process(lit_frame(2, 1200)).unwrap();
        assert_eq!(outcome.evaluation.hit_metric, 1200);
    }

    #[test]
    fn test_classification_labels_closed_events() {
        let mut config = anchor_config();
        config.classification_threshold = Some(1700.0);
        let mut engine = MotionEngine::new(config, chrono_tz::UTC);

        let outcomes = run(&mut engine, &[0, 1500, 1800, 0, 0, 0]);
        let closed = outcomes
            .into_iter()
            .find_map(|(_, o)| match o.closure {
                Some(EventClosure::Closed(closed)) => Some(closed),
                _ => None,
            })
            .unwrap();
        assert_eq!(closed.summary.label(), Some("low-activity"));
    }

    #[test]
    fn test_hour_of_day_follows_timezone() {
        let tz: Tz = "America/New_York".parse().unwrap();
        let mut config = anchor_config();
        config.event_timeout_seconds = 10_000.0;
        let mut engine = MotionEngine::new(config, tz);
        engine.process(at_hour(lit_frame(0, 0))).unwrap();
        engine.process(at_hour(lit_frame(1, 2000))).unwrap();
        engine.process(at_hour(lit_frame(2, 2000))).unwrap();

        match engine.finish() {
            Some(EventClosure::Closed(closed)) => {
                // 01:00 and 02:00 UTC on 1970-01-01 are 20:00 and 21:00 in New York
                let hours: Vec<u8> = closed.event.hits().iter().map(|h| h.hour_of_day).collect();
                assert_eq!(hours, vec![20, 21]);
            }
            other => panic!("expected closed event, got {:?}", other),
        }
    }

    #[test]
    fn test_rerun_is_deterministic() {
        let counts = [0, 1500, 2500, 1800, 0, 0, 0, 0, 3000, 3100, 0, 0, 0, 0];
        let collect = || {
            let mut engine = MotionEngine::new(anchor_config(), chrono_tz::UTC);
            let outcomes = run(&mut engine, &counts);
            let hits: Vec<u64> = outcomes.iter().map(|(_, o)| o.evaluation.hit_metric).collect();
            let means: Vec<u64> = outcomes
                .iter()
                .filter_map(|(_, o)| match &o.closure {
                    Some(EventClosure::Closed(closed)) => Some(closed.summary.mean_hits.to_bits()),
                    _ => None,
                })
                .collect();
            (hits, means)
        };

        let first = collect();
        let second = collect();
        assert_eq!(first.1.len(), 2);
        assert_eq!(first, second);
    }
}
