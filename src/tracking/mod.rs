pub mod controller;
pub mod events;
pub mod interval;
pub mod state;

pub use controller::TrackingController;
pub use events::TrackingEvent;
pub use interval::{IntervalEvent, IntervalTimer};
pub use state::{active_elapsed, StateEvent, TrackingSnapshot, TrackingState};
