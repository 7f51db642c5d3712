use serde::{Deserialize, Serialize};

use crate::geo::RejectionCounts;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub sessions_started: u64,
    pub sessions_stopped: u64,
    pub accepted_samples: u64,
    pub rejected: RejectionCounts,
    /// Fixes that arrived while no session was active.
    pub dropped_inactive: u64,
    /// Fixes from a subscription that had already been replaced.
    pub dropped_stale_subscription: u64,
    /// Source events refused because the engine queue was full.
    pub queue_overflow: u64,
    pub source_errors: u64,
    pub persistence_failures: u64,
}
