use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{SessionSummary, TrackingStatus};

/// Lifecycle operation a caller attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Start,
    Pause,
    Resume,
    Stop,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transition::Start => "start",
            Transition::Pause => "pause",
            Transition::Resume => "resume",
            Transition::Stop => "stop",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("cannot {action} a session while {from}")]
    InvalidTransition {
        action: Transition,
        from: TrackingStatus,
    },

    #[error("invalid interval plan: {0}")]
    InvalidPlan(String),

    /// The session is already frozen; `summary` is returned so the caller can retry.
    #[error("failed to persist session {}: {source}", summary.id)]
    PersistenceFailure {
        summary: Box<SessionSummary>,
        #[source]
        source: anyhow::Error,
    },

    #[error("tracking engine is not running")]
    EngineUnavailable,
}

impl TrackingError {
    pub fn invalid(action: Transition, from: TrackingStatus) -> Self {
        TrackingError::InvalidTransition { action, from }
    }

    /// Recovers the frozen summary from a persistence failure.
    pub fn into_summary(self) -> Option<SessionSummary> {
        match self {
            TrackingError::PersistenceFailure { summary, .. } => Some(*summary),
            _ => None,
        }
    }
}

/// Capability failures reported by a position source.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("position signal lost")]
    SignalLost,

    #[error("{0}")]
    Unavailable(String),
}
