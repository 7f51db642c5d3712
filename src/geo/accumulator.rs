use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::geo::config::AccumulatorConfig;
use crate::geo::haversine::accumulate;
use crate::models::PositionSample;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "reason")]
pub enum RejectReason {
    /// Non-finite, or latitude/longitude outside ±90/±180 degrees.
    InvalidCoordinate,
    /// Captured before the last accepted fix.
    Stale,
    /// Same capture time as the last accepted fix.
    Duplicate,
    LowAccuracy { accuracy_meters: f64 },
    ImplausibleSpeed { speed_mps: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleDecision {
    Accepted { meters: f64 },
    Rejected(RejectReason),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionCounts {
    pub invalid_coordinate: u64,
    pub stale: u64,
    pub duplicate: u64,
    pub low_accuracy: u64,
    pub implausible_speed: u64,
}

impl RejectionCounts {
    pub fn total(&self) -> u64 {
        self.invalid_coordinate
            + self.stale
            + self.duplicate
            + self.low_accuracy
            + self.implausible_speed
    }

    fn record(&mut self, reason: &RejectReason) {
        match reason {
            RejectReason::InvalidCoordinate => self.invalid_coordinate += 1,
            RejectReason::Stale => self.stale += 1,
            RejectReason::Duplicate => self.duplicate += 1,
            RejectReason::LowAccuracy { .. } => self.low_accuracy += 1,
            RejectReason::ImplausibleSpeed { .. } => self.implausible_speed += 1,
        }
    }
}

fn has_valid_coordinates(sample: &PositionSample) -> bool {
    sample.latitude.is_finite()
        && sample.longitude.is_finite()
        && (-90.0..=90.0).contains(&sample.latitude)
        && (-180.0..=180.0).contains(&sample.longitude)
}

/// Folds accepted fixes into a monotonically non-decreasing path length.
///
/// Decisions depend only on the sample sequence and the config, so replaying
/// the same fixes always accepts and rejects the same ones. Rejected fixes
/// never become the basis point for the next distance.
#[derive(Debug, Clone)]
pub struct DistanceAccumulator {
    config: AccumulatorConfig,
    last_accepted: Option<PositionSample>,
    total_meters: f64,
    accepted: u64,
    rejected: RejectionCounts,
}

impl DistanceAccumulator {
    pub fn new(config: AccumulatorConfig) -> Self {
        Self {
            config,
            last_accepted: None,
            total_meters: 0.0,
            accepted: 0,
            rejected: RejectionCounts::default(),
        }
    }

    pub fn offer(&mut self, sample: &PositionSample) -> SampleDecision {
        let decision = self.evaluate(sample);
        match decision {
            SampleDecision::Accepted { meters } => {
                self.total_meters += meters;
                self.last_accepted = Some(*sample);
                self.accepted += 1;
            }
            SampleDecision::Rejected(ref reason) => self.rejected.record(reason),
        }
        decision
    }

    fn evaluate(&self, sample: &PositionSample) -> SampleDecision {
        if !has_valid_coordinates(sample) {
            return SampleDecision::Rejected(RejectReason::InvalidCoordinate);
        }
        if let (Some(limit), Some(accuracy)) =
            (self.config.max_accuracy_meters, sample.accuracy_meters)
        {
            if accuracy > limit {
                return SampleDecision::Rejected(RejectReason::LowAccuracy {
                    accuracy_meters: accuracy,
                });
            }
        }

        let Some(previous) = self.last_accepted else {
            return SampleDecision::Accepted { meters: 0.0 };
        };

        match sample.captured_at_millis.cmp(&previous.captured_at_millis) {
            Ordering::Less => return SampleDecision::Rejected(RejectReason::Stale),
            Ordering::Equal => return SampleDecision::Rejected(RejectReason::Duplicate),
            Ordering::Greater => {}
        }
        let delta_ms = sample.captured_at_millis.abs_diff(previous.captured_at_millis);

        let meters = accumulate(&previous, sample);
        if let Some(max_speed) = self.config.max_speed_mps {
            let speed_mps = meters / (delta_ms as f64 / 1000.0);
            if speed_mps > max_speed {
                return SampleDecision::Rejected(RejectReason::ImplausibleSpeed { speed_mps });
            }
        }

        SampleDecision::Accepted { meters }
    }

    pub fn total_meters(&self) -> f64 {
        self.total_meters
    }

    pub fn last_accepted(&self) -> Option<&PositionSample> {
        self.last_accepted.as_ref()
    }

    pub fn accepted_count(&self) -> u64 {
        self.accepted
    }

    pub fn rejections(&self) -> RejectionCounts {
        self.rejected
    }
}
