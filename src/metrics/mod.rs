mod types;

pub use types::MetricsSnapshot;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::geo::{RejectReason, RejectionCounts};

#[derive(Debug, Default)]
struct MetricsState {
    sessions_started: AtomicU64,
    sessions_stopped: AtomicU64,
    accepted: AtomicU64,
    invalid_coordinate: AtomicU64,
    stale: AtomicU64,
    duplicate: AtomicU64,
    low_accuracy: AtomicU64,
    implausible_speed: AtomicU64,
    dropped_inactive: AtomicU64,
    dropped_stale_subscription: AtomicU64,
    queue_overflow: Arc<AtomicU64>,
    source_errors: AtomicU64,
    persistence_failures: AtomicU64,
}

/// Diagnostics counters for the engine.
///
/// Counters are atomics because source callbacks bump the overflow count
/// from outside the engine task.
#[derive(Debug, Clone, Default)]
pub struct EngineMetrics {
    inner: Arc<MetricsState>,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_session_started(&self) {
        self.inner.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_stopped(&self) {
        self.inner.sessions_stopped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_accepted(&self) {
        self.inner.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self, reason: &RejectReason) {
        let counter = match reason {
            RejectReason::InvalidCoordinate => &self.inner.invalid_coordinate,
            RejectReason::Stale => &self.inner.stale,
            RejectReason::Duplicate => &self.inner.duplicate,
            RejectReason::LowAccuracy { .. } => &self.inner.low_accuracy,
            RejectReason::ImplausibleSpeed { .. } => &self.inner.implausible_speed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_inactive(&self) {
        self.inner.dropped_inactive.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_stale_subscription(&self) {
        self.inner
            .dropped_stale_subscription
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_source_error(&self) {
        self.inner.source_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persistence_failure(&self) {
        self.inner.persistence_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Counter shared with sample sinks for queue overflow.
    pub fn overflow_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.inner.queue_overflow)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let state = &self.inner;
        MetricsSnapshot {
            sessions_started: load(&state.sessions_started),
            sessions_stopped: load(&state.sessions_stopped),
            accepted_samples: load(&state.accepted),
            rejected: RejectionCounts {
                invalid_coordinate: load(&state.invalid_coordinate),
                stale: load(&state.stale),
                duplicate: load(&state.duplicate),
                low_accuracy: load(&state.low_accuracy),
                implausible_speed: load(&state.implausible_speed),
            },
            dropped_inactive: load(&state.dropped_inactive),
            dropped_stale_subscription: load(&state.dropped_stale_subscription),
            queue_overflow: load(state.queue_overflow.as_ref()),
            source_errors: load(&state.source_errors),
            persistence_failures: load(&state.persistence_failures),
        }
    }
}
