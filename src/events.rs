use crate::error::EventBusError;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Events published while a detection session runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChaincamEvent {
    /// A cycle classified its frame as motion
    MotionDetected {
        frame_id: u64,
        hit_metric: u64,
        timestamp: SystemTime,
    },
    /// An event closed with enough frames to export
    EventClosed {
        event_id: String,
        frame_count: usize,
        mean_hits: f64,
    },
    /// An event closed too short to export
    EventDiscarded { frame_count: usize },
    /// All artifacts for an event were written
    ExportCompleted {
        event_id: String,
        artifacts: Vec<String>,
    },
    /// One artifact kind failed for an event
    ExportFailed {
        event_id: String,
        artifact: String,
        error: String,
    },
    /// The frame source failed to deliver a frame
    CaptureFailed { error: String, consecutive: u32 },
    /// System shutdown requested
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl ChaincamEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            ChaincamEvent::MotionDetected {
                frame_id,
                hit_metric,
                ..
            } => format!("Motion in frame {} ({} hits)", frame_id, hit_metric),
            ChaincamEvent::EventClosed {
                event_id,
                frame_count,
                mean_hits,
            } => format!(
                "Event {} closed with {} frames (mean hits {:.1})",
                event_id, frame_count, mean_hits
            ),
            ChaincamEvent::EventDiscarded { frame_count } => {
                format!("Event discarded with {} frame(s)", frame_count)
            }
            ChaincamEvent::ExportCompleted {
                event_id,
                artifacts,
            } => format!("Export completed: {} ({} artifacts)", event_id, artifacts.len()),
            ChaincamEvent::ExportFailed {
                event_id,
                artifact,
                error,
            } => format!("Export of {} for {} failed: {}", artifact, event_id, error),
            ChaincamEvent::CaptureFailed { error, consecutive } => {
                format!("Capture failed ({} in a row): {}", consecutive, error)
            }
            ChaincamEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            ChaincamEvent::MotionDetected { .. } => "motion_detected",
            ChaincamEvent::EventClosed { .. } => "event_closed",
            ChaincamEvent::EventDiscarded { .. } => "event_discarded",
            ChaincamEvent::ExportCompleted { .. } => "export_completed",
            ChaincamEvent::ExportFailed { .. } => "export_failed",
            ChaincamEvent::CaptureFailed { .. } => "capture_failed",
            ChaincamEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Async event bus for component coordination using broadcast channels
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ChaincamEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<ChaincamEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers.
    ///
    /// Fails when nobody is subscribed; callers that publish for observers
    /// only are free to ignore that.
    pub async fn publish(&self, event: ChaincamEvent) -> Result<usize, EventBusError> {
        match &event {
            ChaincamEvent::EventClosed { .. } | ChaincamEvent::ExportCompleted { .. } => {
                info!("{}", event.description());
            }
            ChaincamEvent::ExportFailed { .. } => {
                warn!("{}", event.description());
            }
            ChaincamEvent::CaptureFailed { .. } => {
                error!("{}", event.description());
            }
            ChaincamEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => debug!("Event: {}", event.description()),
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Custom filter function
    Custom(fn(&ChaincamEvent) -> bool),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &ChaincamEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Event receiver that skips events its filter rejects
pub struct EventReceiver {
    receiver: broadcast::Receiver<ChaincamEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<ChaincamEvent>,
        filter: EventFilter,
        name: impl Into<String>,
    ) -> Self {
        Self {
            receiver,
            filter,
            name: name.into(),
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<ChaincamEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::PublishFailed {
                        details: format!("Receiver lagged behind by {} events", n),
                    });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}
