mod color;
mod difference;
mod engine;
mod frame_buffer;
mod hits;

pub use difference::{Delta, Difference, DifferenceMap, Differencer, MotionMask, Region};
pub use engine::{ClosedEvent, CycleOutcome, EventClosure, MotionEngine};
pub use frame_buffer::FrameBuffer;
pub use hits::{HitEvaluation, HitEvaluator};
