use super::types::{LoopReport, LoopStats, ShutdownReason};
use crate::analyzer::{EventClosure, MotionEngine};
use crate::camera::FrameSource;
use crate::config::SourceConfig;
use crate::error::Result;
use crate::events::{ChaincamEvent, EventBus};
use crate::export::{write_snapshot, EventNamer, ExportJob, ExportQueue};
use crate::frame::Frame;

use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Where the loop keeps `latest.jpg`
#[derive(Debug, Clone)]
pub struct SnapshotTarget {
    pub root: PathBuf,
    pub quality: u8,
}

/// Drives one detection session: capture, analyze, and hand closed events
/// to the export queue.
///
/// Live sources are paced by the cycle interval. Finite sources are drained
/// as fast as the engine allows, since their timestamps are synthetic.
pub struct DetectionLoop {
    engine: MotionEngine,
    source: Box<dyn FrameSource>,
    namer: EventNamer,
    queue: ExportQueue,
    event_bus: EventBus,
    cycle_interval: Duration,
    retry_backoff: Duration,
    max_consecutive_failures: u32,
    snapshot: Option<SnapshotTarget>,
    pending_snapshot: Option<JoinHandle<()>>,
    stats: LoopStats,
}

impl DetectionLoop {
    pub fn new(
        engine: MotionEngine,
        source: Box<dyn FrameSource>,
        namer: EventNamer,
        queue: ExportQueue,
        event_bus: EventBus,
        source_config: &SourceConfig,
    ) -> Self {
        let cycle_interval = engine.config().cycle_interval();
        Self {
            engine,
            source,
            namer,
            queue,
            event_bus,
            cycle_interval,
            retry_backoff: Duration::from_millis(source_config.retry_backoff_ms),
            max_consecutive_failures: source_config.max_consecutive_failures.max(1),
            snapshot: None,
            pending_snapshot: None,
            stats: LoopStats::default(),
        }
    }

    pub fn with_snapshot(mut self, target: SnapshotTarget) -> Self {
        self.snapshot = Some(target);
        self
    }

    /// Run until the source ends, fails for good, or `cancel` fires.
    ///
    /// An event still open at that point is flushed before returning, and
    /// the export queue handle is dropped so the worker can drain.
    pub async fn run(mut self, cancel: CancellationToken) -> LoopReport {
        info!("Detection loop started on {}", self.source.describe());

        let live = self.source.is_live();
        let mut ticker = interval(self.cycle_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut consecutive_failures: u32 = 0;

        let reason = loop {
            if live {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break ShutdownReason::UserRequest,
                    _ = ticker.tick() => {}
                }
            } else if cancel.is_cancelled() {
                break ShutdownReason::UserRequest;
            }

            let captured = tokio::select! {
                biased;
                _ = cancel.cancelled() => break ShutdownReason::UserRequest,
                captured = self.source.capture() => captured,
            };

            match captured {
                Ok(Some(frame)) => {
                    consecutive_failures = 0;
                    if let Err(e) = self.process_frame(frame).await {
                        error!("Detection loop cannot continue: {}", e);
                        break ShutdownReason::Error(e.to_string());
                    }
                }
                Ok(None) => {
                    info!("Frame source exhausted after {} cycles", self.stats.cycles);
                    break ShutdownReason::SourceExhausted;
                }
                Err(e) => {
                    consecutive_failures += 1;
                    self.stats.capture_failures += 1;
                    let _ = self
                        .event_bus
                        .publish(ChaincamEvent::CaptureFailed {
                            error: e.to_string(),
                            consecutive: consecutive_failures,
                        })
                        .await;

                    if consecutive_failures >= self.max_consecutive_failures {
                        error!(
                            "Giving up after {} consecutive capture failures",
                            consecutive_failures
                        );
                        break ShutdownReason::SourceFailed(e.to_string());
                    }

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break ShutdownReason::UserRequest,
                        _ = sleep(self.retry_backoff) => {}
                    }
                }
            }
        };

        self.finish().await;

        info!(
            "Detection loop stopped ({}): {} cycles, {} events closed, {} discarded",
            reason, self.stats.cycles, self.stats.events_closed, self.stats.events_discarded
        );

        LoopReport {
            stats: self.stats,
            reason,
        }
    }

    async fn process_frame(&mut self, frame: Frame) -> Result<()> {
        self.stats.cycles += 1;

        if let Some(target) = self.snapshot.clone() {
            self.refresh_snapshot(target, frame.clone());
        }

        let frame_id = frame.id;
        let timestamp = frame.timestamp;
        let outcome = match self.engine.process(frame) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.stats.skipped_cycles += 1;
                warn!("Skipping frame {}: {}", frame_id, e);
                return Ok(());
            }
        };

        if outcome.evaluation.is_motion {
            self.stats.motion_frames += 1;
            let _ = self
                .event_bus
                .publish(ChaincamEvent::MotionDetected {
                    frame_id,
                    hit_metric: outcome.evaluation.hit_metric,
                    timestamp,
                })
                .await;
        }

        if let Some(closure) = outcome.closure {
            self.dispatch(closure).await?;
        }
        Ok(())
    }

    async fn dispatch(&mut self, closure: EventClosure) -> Result<()> {
        match closure {
            EventClosure::Closed(closed) => {
                let event_id = self.namer.name(closed.closed_at, closed.summary.label());
                self.stats.events_closed += 1;

                let _ = self
                    .event_bus
                    .publish(ChaincamEvent::EventClosed {
                        event_id: event_id.clone(),
                        frame_count: closed.summary.frame_count,
                        mean_hits: closed.summary.mean_hits,
                    })
                    .await;

                self.queue
                    .submit(ExportJob {
                        event_id,
                        event: closed.event,
                        summary: closed.summary,
                        reason: closed.reason,
                    })
                    .await
            }
            EventClosure::Discarded { frames, reason } => {
                self.stats.events_discarded += 1;
                debug!("Discarded {} frame event on {}", frames, reason);
                let _ = self
                    .event_bus
                    .publish(ChaincamEvent::EventDiscarded { frame_count: frames })
                    .await;
                Ok(())
            }
        }
    }

    /// Best effort; a snapshot still being written makes this frame skip it
    fn refresh_snapshot(&mut self, target: SnapshotTarget, frame: Frame) {
        if self
            .pending_snapshot
            .as_ref()
            .is_some_and(|pending| !pending.is_finished())
        {
            debug!("Snapshot still being written, skipping frame {}", frame.id);
            return;
        }

        self.pending_snapshot = Some(tokio::spawn(async move {
            if let Err(e) = write_snapshot(&target.root, frame, target.quality).await {
                warn!("Failed to update snapshot: {}", e);
            }
        }));
    }

    async fn finish(&mut self) {
        if let Some(closure) = self.engine.finish() {
            if let Err(e) = self.dispatch(closure).await {
                error!("Failed to queue final event: {}", e);
            }
        }

        if let Some(pending) = self.pending_snapshot.take() {
            let _ = pending.await;
        }

        if let Err(e) = self.source.stop().await {
            warn!("Error stopping frame source: {}", e);
        }
    }
}
