pub mod analyzer;
pub mod app;
pub mod camera;
pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod export;
pub mod frame;

pub use analyzer::{Differencer, MotionEngine};
pub use app::{ChaincamOrchestrator, ComponentState, LoopReport, ShutdownReason};
pub use camera::{open_source, DirectorySource, FrameSource, MockFrameSource};
pub use capture::{EventAccumulator, EventStatistics, EventSummary, HitRecord, MotionEvent};
pub use config::ChaincamConfig;
pub use error::{ChaincamError, Result};
pub use events::{ChaincamEvent, EventBus, EventFilter, EventReceiver};
pub use export::{EventExporter, ExportJob, ExportReport, FileExporter};
pub use frame::{Frame, FrameFormat};
