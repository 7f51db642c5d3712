use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{IntervalRuntimeState, PositionSample};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TrackingStatus {
    /// No session exists.
    #[default]
    Idle,
    Active,
    Paused,
    Stopped,
}

impl TrackingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingStatus::Idle => "Idle",
            TrackingStatus::Active => "Active",
            TrackingStatus::Paused => "Paused",
            TrackingStatus::Stopped => "Stopped",
        }
    }
}

impl fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frozen result of a session, handed to the recorder on stop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub paused_seconds: f64,
    pub distance_meters: f64,
    /// `None` when no distance was covered.
    pub average_pace_seconds_per_km: Option<f64>,
    pub samples: Vec<PositionSample>,
    pub rejected_samples: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<IntervalRuntimeState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}
