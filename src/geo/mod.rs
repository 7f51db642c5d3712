pub mod accumulator;
pub mod config;
pub mod haversine;
pub mod pace;
pub mod reorder;

pub use accumulator::{DistanceAccumulator, RejectReason, RejectionCounts, SampleDecision};
pub use config::AccumulatorConfig;
pub use haversine::{accumulate, haversine_meters, EARTH_RADIUS_METERS};
pub use pace::{current_pace, format_pace};
pub use reorder::ReorderBuffer;
