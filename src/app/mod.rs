mod detection;
mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;


pub use detection::{DetectionLoop, SnapshotTarget};
pub use orchestrator::ChaincamOrchestrator;
pub use types::{ComponentState, LoopReport, LoopStats, ShutdownReason};
