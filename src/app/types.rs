use std::fmt;

/// Component lifecycle states
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// Why a detection session ended
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    Signal(String),
    /// Cancelled through the orchestrator's token
    UserRequest,
    /// A finite source delivered its last frame
    SourceExhausted,
    /// Too many consecutive capture failures
    SourceFailed(String),
    Error(String),
}

impl ShutdownReason {
    /// Whether the session ended the way it was asked to
    pub fn is_clean(&self) -> bool {
        matches!(
            self,
            ShutdownReason::Signal(_) | ShutdownReason::UserRequest | ShutdownReason::SourceExhausted
        )
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal(signal) => write!(f, "signal {}", signal),
            ShutdownReason::UserRequest => f.write_str("user request"),
            ShutdownReason::SourceExhausted => f.write_str("source exhausted"),
            ShutdownReason::SourceFailed(details) => write!(f, "source failed: {}", details),
            ShutdownReason::Error(details) => write!(f, "error: {}", details),
        }
    }
}

/// Counters kept by the detection loop
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopStats {
    pub cycles: u64,
    pub motion_frames: u64,
    pub events_closed: u64,
    pub events_discarded: u64,
    pub capture_failures: u64,
    pub skipped_cycles: u64,
}

/// Result of a finished detection loop
#[derive(Debug, Clone)]
pub struct LoopReport {
    pub stats: LoopStats,
    pub reason: ShutdownReason,
}
