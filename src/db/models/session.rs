use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Row from the `sessions` table without its sample sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub distance_meters: f64,
    pub average_pace_seconds_per_km: Option<f64>,
    pub sample_count: u64,
    pub notes: Option<String>,
}
