use serde::{Deserialize, Serialize};

use crate::error::TrackingError;

/// Work/rest schedule attached to a session before it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalPlan {
    pub work_seconds: u32,
    pub rest_seconds: u32,
    /// Number of work+rest rounds; 0 repeats until the session stops.
    #[serde(default)]
    pub total_intervals: u32,
}

impl IntervalPlan {
    pub fn new(work_seconds: u32, rest_seconds: u32, total_intervals: u32) -> Self {
        Self {
            work_seconds,
            rest_seconds,
            total_intervals,
        }
    }

    pub fn validate(&self) -> Result<(), TrackingError> {
        if self.work_seconds == 0 {
            return Err(TrackingError::InvalidPlan(
                "work_seconds must be greater than zero".into(),
            ));
        }
        if self.rest_seconds == 0 {
            return Err(TrackingError::InvalidPlan(
                "rest_seconds must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn is_unbounded(&self) -> bool {
        self.total_intervals == 0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum IntervalPhase {
    Work,
    Rest,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IntervalRuntimeState {
    pub phase: IntervalPhase,
    pub remaining_seconds: u32,
    pub completed_intervals: u32,
    /// Set once a bounded plan has run all of its rounds.
    pub finished: bool,
}

impl IntervalRuntimeState {
    pub fn initial(plan: &IntervalPlan) -> Self {
        Self {
            phase: IntervalPhase::Work,
            remaining_seconds: plan.work_seconds,
            completed_intervals: 0,
            finished: false,
        }
    }
}
