//! Position sources the engine can subscribe to.
//!
//! A source owns however it obtains fixes; the engine only sees the
//! [`SampleSink`] it hands over and the [`Subscription`] it gets back.

pub mod channel;
pub mod replay;
pub mod simulated;
pub mod sink;

pub use channel::ChannelSource;
pub use replay::ReplaySource;
pub use simulated::SimulatedRun;
pub use sink::{SampleSink, SourceEnvelope, SourceEvent, Subscription};

use crate::error::SourceError;

/// Capability that delivers position fixes asynchronously.
///
/// Implementations must stop delivering once the returned subscription is
/// cancelled. Failures after subscribing go through [`SampleSink::on_error`].
pub trait GeoSampleSource: Send + Sync + 'static {
    fn subscribe(&self, sink: SampleSink) -> Result<Subscription, SourceError>;
}
