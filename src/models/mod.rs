pub mod interval;
pub mod sample;
pub mod session;

pub use interval::{IntervalPhase, IntervalPlan, IntervalRuntimeState};
pub use sample::PositionSample;
pub use session::{SessionSummary, TrackingStatus};
