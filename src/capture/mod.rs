mod accumulator;
mod statistics;

pub use accumulator::{
    AccumulatorState, EventAccumulator, FlushOutcome, FlushReason, HitRecord, MotionEvent,
    MotionSample,
};
pub use statistics::{Classification, EventStatistics, EventSummary};
