use serde::Serialize;

use crate::error::SourceError;
use crate::geo::RejectReason;
use crate::models::{PositionSample, SessionSummary};

use super::interval::IntervalEvent;
use super::state::TrackingSnapshot;

/// Everything the engine publishes on its event bus.
///
/// Delivery is fire-and-forget: a lagging or absent subscriber never holds
/// the engine back.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "payload")]
pub enum TrackingEvent {
    StateChanged(TrackingSnapshot),
    Heartbeat(TrackingSnapshot),
    Interval(IntervalEvent),
    SampleRejected {
        sample: PositionSample,
        reason: RejectReason,
    },
    SourceUnavailable(SourceError),
    SessionCompleted {
        summary: SessionSummary,
        persisted: bool,
    },
}
