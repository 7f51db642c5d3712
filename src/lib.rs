//! Live run-tracking engine.
//!
//! Position fixes from a [`source::GeoSampleSource`] are folded into
//! distance and pace while a pause-aware clock and an optional work/rest
//! interval timer run alongside. [`tracking::TrackingController`] is the
//! entry point; finished sessions go to a [`db::SessionRecorder`].

mod utils;

pub mod db;
pub mod error;
pub mod geo;
pub mod metrics;
pub mod models;
pub mod settings;
pub mod source;
pub mod tracking;

pub use error::{SourceError, TrackingError, Transition};
pub use models::{IntervalPlan, PositionSample, SessionSummary, TrackingStatus};
pub use settings::{EngineConfig, SettingsStore, TrackerSettings};
pub use tracking::{TrackingController, TrackingEvent, TrackingSnapshot};

/// Initializes `env_logger`, honoring `RUST_LOG` and defaulting to `info`.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
