use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{TrackingError, Transition};
use crate::geo::{
    current_pace, AccumulatorConfig, DistanceAccumulator, RejectReason, ReorderBuffer,
    SampleDecision,
};
use crate::models::{
    IntervalPlan, IntervalRuntimeState, PositionSample, SessionSummary, TrackingStatus,
};

use super::interval::{IntervalEvent, IntervalTimer};

/// Active time for a session: wall-clock span minus everything spent paused.
///
/// While paused the span ends at `pause_started_at`, which freezes the result.
pub fn active_elapsed(
    started_at: Instant,
    now: Instant,
    paused_total: Duration,
    pause_started_at: Option<Instant>,
) -> Duration {
    let end = pause_started_at.unwrap_or(now);
    end.saturating_duration_since(started_at)
        .saturating_sub(paused_total)
}

/// Observable view of the engine; building one has no side effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingSnapshot {
    pub status: TrackingStatus,
    pub session_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub distance_meters: f64,
    pub active_elapsed_seconds: f64,
    pub paused_seconds: f64,
    pub current_pace_seconds_per_km: Option<f64>,
    pub accepted_samples: u64,
    pub rejected_samples: u64,
    pub pending_samples: usize,
    pub interval: Option<IntervalRuntimeState>,
}

impl TrackingSnapshot {
    /// Final view of a session that has just been stopped.
    pub fn stopped(summary: &SessionSummary) -> Self {
        Self {
            status: TrackingStatus::Stopped,
            session_id: Some(summary.id.clone()),
            started_at: Some(summary.started_at),
            distance_meters: summary.distance_meters,
            active_elapsed_seconds: summary.duration_seconds,
            paused_seconds: summary.paused_seconds,
            current_pace_seconds_per_km: summary.average_pace_seconds_per_km,
            accepted_samples: summary.samples.len() as u64,
            rejected_samples: summary.rejected_samples,
            pending_samples: 0,
            interval: summary.interval,
        }
    }

    fn idle() -> Self {
        Self {
            status: TrackingStatus::Idle,
            session_id: None,
            started_at: None,
            distance_meters: 0.0,
            active_elapsed_seconds: 0.0,
            paused_seconds: 0.0,
            current_pace_seconds_per_km: None,
            accepted_samples: 0,
            rejected_samples: 0,
            pending_samples: 0,
            interval: None,
        }
    }
}

/// Side effects of a transition, for the caller to publish.
#[derive(Debug, Clone, PartialEq)]
pub enum StateEvent {
    Accepted { sample: PositionSample, meters: f64 },
    Rejected { sample: PositionSample, reason: RejectReason },
    /// Arrived while no session was active; never buffered or replayed.
    Dropped { sample: PositionSample, status: TrackingStatus },
    Interval(IntervalEvent),
}

#[derive(Debug, Clone)]
struct LiveSession {
    id: String,
    started_at_wall: DateTime<Utc>,
    started_at: Instant,
    status: TrackingStatus,
    pause_started_at: Option<Instant>,
    paused_total: Duration,
    samples: Vec<PositionSample>,
    accumulator: DistanceAccumulator,
    reorder: ReorderBuffer,
    // arrival count last seen by `tick`, and when it last changed
    seen_arrivals: u64,
    quiet_since: Instant,
    interval: Option<IntervalTimer>,
}

impl LiveSession {
    fn active_elapsed(&self, now: Instant) -> Duration {
        active_elapsed(
            self.started_at,
            now,
            self.paused_total,
            self.pause_started_at,
        )
    }

    fn paused_elapsed(&self, now: Instant) -> Duration {
        let current = self
            .pause_started_at
            .map(|since| now.saturating_duration_since(since))
            .unwrap_or_default();
        self.paused_total + current
    }

    fn fold(&mut self, released: Vec<PositionSample>, events: &mut Vec<StateEvent>) {
        for sample in released {
            match self.accumulator.offer(&sample) {
                SampleDecision::Accepted { meters } => {
                    self.samples.push(sample);
                    events.push(StateEvent::Accepted { sample, meters });
                }
                SampleDecision::Rejected(reason) => {
                    events.push(StateEvent::Rejected { sample, reason });
                }
            }
        }
    }

    fn flush(&mut self, events: &mut Vec<StateEvent>) {
        let pending = self.reorder.drain();
        self.fold(pending, events);
    }

    /// Drains the reorder buffer once the source has been quiet for a whole window.
    fn release_stalled(&mut self, now: Instant, events: &mut Vec<StateEvent>) {
        let arrivals = self.reorder.arrivals();
        if arrivals != self.seen_arrivals {
            self.seen_arrivals = arrivals;
            self.quiet_since = now;
            return;
        }
        let window = Duration::from_millis(self.reorder.window_ms());
        if self.reorder.pending_len() > 0
            && now.saturating_duration_since(self.quiet_since) >= window
        {
            self.flush(events);
        }
    }

    fn catch_up_interval(&mut self, now: Instant, events: &mut Vec<StateEvent>) {
        let whole_seconds = self.active_elapsed(now).as_secs();
        if let Some(timer) = self.interval.as_mut() {
            events.extend(
                timer
                    .advance_to(whole_seconds)
                    .into_iter()
                    .map(StateEvent::Interval),
            );
        }
    }
}

/// Session lifecycle state machine.
///
/// Every mutation of a live session goes through the methods here, each of
/// which takes the current instant explicitly. The struct itself does no
/// I/O and holds no clock.
#[derive(Debug, Clone)]
pub struct TrackingState {
    config: AccumulatorConfig,
    session: Option<LiveSession>,
}

impl TrackingState {
    pub fn new(config: AccumulatorConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    pub fn status(&self) -> TrackingStatus {
        self.session
            .as_ref()
            .map(|session| session.status)
            .unwrap_or(TrackingStatus::Idle)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.id.as_str())
    }

    pub fn start(
        &mut self,
        plan: Option<IntervalPlan>,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> Result<Vec<StateEvent>, TrackingError> {
        if self.session.is_some() {
            return Err(TrackingError::invalid(Transition::Start, self.status()));
        }
        if let Some(plan) = plan.as_ref() {
            plan.validate()?;
        }

        let interval = plan.map(IntervalTimer::new);
        let events = interval
            .as_ref()
            .map(|timer| vec![StateEvent::Interval(timer.opening_event())])
            .unwrap_or_default();

        self.session = Some(LiveSession {
            id: Uuid::new_v4().to_string(),
            started_at_wall: wall,
            started_at: now,
            status: TrackingStatus::Active,
            pause_started_at: None,
            paused_total: Duration::ZERO,
            samples: Vec::new(),
            accumulator: DistanceAccumulator::new(self.config),
            reorder: ReorderBuffer::new(self.config.reorder_window_ms),
            seen_arrivals: 0,
            quiet_since: now,
            interval,
        });

        Ok(events)
    }

    /// Folds a fix into the session if it is active; otherwise drops it.
    pub fn on_sample(&mut self, sample: PositionSample) -> Vec<StateEvent> {
        let status = self.status();
        let Some(session) = self
            .session
            .as_mut()
            .filter(|session| session.status == TrackingStatus::Active)
        else {
            return vec![StateEvent::Dropped { sample, status }];
        };

        let mut events = Vec::new();
        let released = session.reorder.push(sample);
        session.fold(released, &mut events);
        events
    }

    pub fn pause(&mut self, now: Instant) -> Result<Vec<StateEvent>, TrackingError> {
        let status = self.status();
        let session = self
            .session
            .as_mut()
            .filter(|session| session.status == TrackingStatus::Active)
            .ok_or(TrackingError::invalid(Transition::Pause, status))?;

        let mut events = Vec::new();
        session.flush(&mut events);
        session.catch_up_interval(now, &mut events);
        session.status = TrackingStatus::Paused;
        session.pause_started_at = Some(now);
        Ok(events)
    }

    pub fn resume(&mut self, now: Instant) -> Result<(), TrackingError> {
        let status = self.status();
        let session = self
            .session
            .as_mut()
            .filter(|session| session.status == TrackingStatus::Paused)
            .ok_or(TrackingError::invalid(Transition::Resume, status))?;

        if let Some(since) = session.pause_started_at.take() {
            session.paused_total += now.saturating_duration_since(since);
        }
        session.status = TrackingStatus::Active;
        Ok(())
    }

    /// Brings the interval timer up to the current whole active second and
    /// releases fixes held back by a source that has gone quiet.
    pub fn tick(&mut self, now: Instant) -> Vec<StateEvent> {
        let mut events = Vec::new();
        if let Some(session) = self
            .session
            .as_mut()
            .filter(|session| session.status == TrackingStatus::Active)
        {
            session.release_stalled(now, &mut events);
            session.catch_up_interval(now, &mut events);
        }
        events
    }

    /// Freezes the session, discards it from live state and returns its summary.
    pub fn stop(
        &mut self,
        notes: Option<String>,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> Result<(SessionSummary, Vec<StateEvent>), TrackingError> {
        let Some(mut session) = self.session.take() else {
            return Err(TrackingError::invalid(
                Transition::Stop,
                TrackingStatus::Idle,
            ));
        };

        let mut events = Vec::new();
        if session.status == TrackingStatus::Active {
            session.flush(&mut events);
            session.catch_up_interval(now, &mut events);
        }

        let duration_seconds = session.active_elapsed(now).as_secs_f64();
        let paused_seconds = session.paused_elapsed(now).as_secs_f64();
        let distance_meters = session.accumulator.total_meters();
        let summary = SessionSummary {
            id: session.id,
            started_at: session.started_at_wall,
            stopped_at: wall,
            duration_seconds,
            paused_seconds,
            distance_meters,
            average_pace_seconds_per_km: current_pace(distance_meters, duration_seconds),
            rejected_samples: session.accumulator.rejections().total(),
            samples: session.samples,
            interval: session.interval.map(|timer| timer.state()),
            notes: notes.filter(|text| !text.trim().is_empty()),
        };

        Ok((summary, events))
    }

    pub fn snapshot(&self, now: Instant) -> TrackingSnapshot {
        let Some(session) = self.session.as_ref() else {
            return TrackingSnapshot::idle();
        };

        let active_elapsed_seconds = session.active_elapsed(now).as_secs_f64();
        let distance_meters = session.accumulator.total_meters();
        TrackingSnapshot {
            status: session.status,
            session_id: Some(session.id.clone()),
            started_at: Some(session.started_at_wall),
            distance_meters,
            active_elapsed_seconds,
            paused_seconds: session.paused_elapsed(now).as_secs_f64(),
            current_pace_seconds_per_km: current_pace(distance_meters, active_elapsed_seconds),
            accepted_samples: session.accumulator.accepted_count(),
            rejected_samples: session.accumulator.rejections().total(),
            pending_samples: session.reorder.pending_len(),
            interval: session.interval.as_ref().map(|timer| timer.state()),
        }
    }

    /// Ticks the interval timer has received in the current session.
    pub fn interval_ticks(&self) -> Option<u64> {
        self.session
            .as_ref()
            .and_then(|session| session.interval.as_ref())
            .map(|timer| timer.ticks_delivered())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IntervalPhase;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn engine() -> TrackingState {
        TrackingState::new(AccumulatorConfig::default())
    }

    #[test]
    fn active_elapsed_excludes_paused_time() {
        let t0 = Instant::now();
        assert_eq!(active_elapsed(t0, t0 + secs(50), secs(20), None), secs(30));
        // frozen while paused, whatever "now" is
        assert_eq!(
            active_elapsed(t0, t0 + secs(500), secs(20), Some(t0 + secs(40))),
            secs(20)
        );
        assert_eq!(active_elapsed(t0 + secs(5), t0, Duration::ZERO, None), Duration::ZERO);
    }

    #[test]
    fn transitions_from_wrong_state_fail_loudly() {
        let t0 = Instant::now();
        let mut state = engine();
        assert!(matches!(
            state.pause(t0),
            Err(TrackingError::InvalidTransition {
                action: Transition::Pause,
                from: TrackingStatus::Idle
            })
        ));
        assert!(state.resume(t0).is_err());
        assert!(state.stop(None, t0, Utc::now()).is_err());

        state.start(None, t0, Utc::now()).unwrap();
        assert!(matches!(
            state.start(None, t0, Utc::now()),
            Err(TrackingError::InvalidTransition {
                action: Transition::Start,
                from: TrackingStatus::Active
            })
        ));
        assert!(state.resume(t0).is_err());

        state.pause(t0).unwrap();
        assert!(state.pause(t0).is_err());
        assert!(state.start(None, t0, Utc::now()).is_err());
    }

    #[test]
    fn invalid_plan_leaves_engine_idle() {
        let mut state = engine();
        let result = state.start(Some(IntervalPlan::new(0, 10, 1)), Instant::now(), Utc::now());
        assert!(matches!(result, Err(TrackingError::InvalidPlan(_))));
        assert_eq!(state.status(), TrackingStatus::Idle);
    }

    #[test]
    fn run_pause_resume_stop_scenario() {
        let t0 = Instant::now();
        let mut state = engine();
        state.start(None, t0, Utc::now()).unwrap();

        state.on_sample(PositionSample::new(40.0, -74.0, 0));
        state.on_sample(PositionSample::new(40.0009, -74.0, 10_000));

        let at_ten = state.snapshot(t0 + secs(10));
        assert!((at_ten.distance_meters - 100.0).abs() < 2.0);
        let pace = at_ten.current_pace_seconds_per_km.unwrap();
        assert!((pace - 100.0).abs() < 2.0, "pace {pace}");

        state.pause(t0 + secs(10)).unwrap();
        state.resume(t0 + secs(30)).unwrap();
        let resumed = state.snapshot(t0 + secs(30));
        assert!((resumed.active_elapsed_seconds - 10.0).abs() < 1e-6);
        assert!((resumed.paused_seconds - 20.0).abs() < 1e-6);

        let (summary, _) = state.stop(None, t0 + secs(30), Utc::now()).unwrap();
        assert!((summary.duration_seconds - 10.0).abs() < 1.0);
        assert!((summary.distance_meters - 100.0).abs() < 2.0);
        assert_eq!(summary.samples.len(), 2);
        assert_eq!(state.status(), TrackingStatus::Idle);
    }

    #[test]
    fn samples_while_paused_are_dropped_and_do_not_move_basis() {
        let t0 = Instant::now();
        let mut state = engine();
        state.start(None, t0, Utc::now()).unwrap();
        state.on_sample(PositionSample::new(40.0, -74.0, 0));
        state.pause(t0 + secs(5)).unwrap();

        let events = state.on_sample(PositionSample::new(40.0005, -74.0, 8_000));
        assert!(matches!(
            events.as_slice(),
            [StateEvent::Dropped {
                status: TrackingStatus::Paused,
                ..
            }]
        ));
        assert_eq!(state.snapshot(t0 + secs(6)).distance_meters, 0.0);

        state.resume(t0 + secs(20)).unwrap();
        // measured from the pre-pause fix, not the dropped one
        state.on_sample(PositionSample::new(40.0001, -74.0, 30_000));
        let snap = state.snapshot(t0 + secs(21));
        assert!((snap.distance_meters - 11.1).abs() < 0.5, "{}", snap.distance_meters);
    }

    #[test]
    fn samples_while_idle_are_dropped() {
        let mut state = engine();
        let events = state.on_sample(PositionSample::new(1.0, 1.0, 0));
        assert!(matches!(
            events.as_slice(),
            [StateEvent::Dropped {
                status: TrackingStatus::Idle,
                ..
            }]
        ));
    }

    #[test]
    fn stop_while_paused_uses_frozen_duration() {
        let t0 = Instant::now();
        let mut state = engine();
        state.start(None, t0, Utc::now()).unwrap();
        state.pause(t0 + secs(42)).unwrap();
        let (summary, _) = state.stop(Some("  ".into()), t0 + secs(100), Utc::now()).unwrap();
        assert!((summary.duration_seconds - 42.0).abs() < 1e-6);
        assert!((summary.paused_seconds - 58.0).abs() < 1e-6);
        assert_eq!(summary.average_pace_seconds_per_km, None);
        assert_eq!(summary.notes, None);
    }

    #[test]
    fn interval_ticks_track_whole_active_seconds_across_pauses() {
        let t0 = Instant::now();
        let mut state = engine();
        let opening = state
            .start(Some(IntervalPlan::new(60, 30, 2)), t0, Utc::now())
            .unwrap();
        assert_eq!(
            opening,
            vec![StateEvent::Interval(IntervalEvent::WorkStarted { interval: 1 })]
        );

        state.tick(t0 + Duration::from_millis(45_500));
        state.pause(t0 + Duration::from_millis(45_700)).unwrap();
        // ticking while paused changes nothing
        assert!(state.tick(t0 + secs(400)).is_empty());
        assert_eq!(state.interval_ticks(), Some(45));

        state.resume(t0 + secs(100)).unwrap();
        // active = 45.7 + (281.3 - 100) = 227.0 -> well past the 180 s plan
        let events = state.tick(t0 + Duration::from_millis(281_300));
        assert!(events.contains(&StateEvent::Interval(IntervalEvent::IntervalsComplete {
            completed: 2
        })));

        let snap = state.snapshot(t0 + Duration::from_millis(281_300));
        assert_eq!(state.interval_ticks(), Some(snap.active_elapsed_seconds.floor() as u64));
        let interval = snap.interval.unwrap();
        assert!(interval.finished);
        assert_eq!(interval.phase, IntervalPhase::Rest);
        assert_eq!(interval.completed_intervals, 2);
    }

    #[test]
    fn reorder_window_slots_late_fix_and_flushes_on_stop() {
        let t0 = Instant::now();
        let mut state = TrackingState::new(AccumulatorConfig {
            reorder_window_ms: 5_000,
            ..AccumulatorConfig::default()
        });
        state.start(None, t0, Utc::now()).unwrap();

        state.on_sample(PositionSample::new(40.0, -74.0, 0));
        state.on_sample(PositionSample::new(40.0002, -74.0, 4_000));
        // arrives late but within the window
        state.on_sample(PositionSample::new(40.0001, -74.0, 2_000));
        assert_eq!(state.snapshot(t0).pending_samples, 3);

        let (summary, events) = state.stop(None, t0 + secs(4), Utc::now()).unwrap();
        let order: Vec<i64> = summary
            .samples
            .iter()
            .map(|s| s.captured_at_millis)
            .collect();
        assert_eq!(order, vec![0, 2_000, 4_000]);
        assert_eq!(summary.rejected_samples, 0);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, StateEvent::Accepted { .. }))
                .count(),
            3
        );
    }

    #[test]
    fn quiet_source_releases_held_fixes_after_a_window() {
        let t0 = Instant::now();
        let mut state = TrackingState::new(AccumulatorConfig {
            reorder_window_ms: 5_000,
            ..AccumulatorConfig::default()
        });
        state.start(None, t0, Utc::now()).unwrap();

        state.on_sample(PositionSample::new(40.0, -74.0, 0));
        state.on_sample(PositionSample::new(40.0002, -74.0, 4_000));
        assert!(state.tick(t0 + secs(1)).is_empty());
        assert!(state.tick(t0 + secs(5)).is_empty());
        assert_eq!(state.snapshot(t0 + secs(5)).pending_samples, 2);

        let events = state.tick(t0 + secs(6));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, StateEvent::Accepted { .. }))
                .count(),
            2
        );
        let snap = state.snapshot(t0 + secs(6));
        assert_eq!(snap.pending_samples, 0);
        assert!((snap.distance_meters - 22.2).abs() < 0.5, "{}", snap.distance_meters);

        // a fresh arrival restarts the quiet period
        state.on_sample(PositionSample::new(40.0004, -74.0, 9_000));
        assert!(state.tick(t0 + secs(7)).is_empty());
        assert!(state.tick(t0 + secs(11)).is_empty());
        assert_eq!(state.tick(t0 + secs(12)).len(), 1);
    }

    #[test]
    fn strict_ordering_rejects_late_fix() {
        let t0 = Instant::now();
        let mut state = engine();
        state.start(None, t0, Utc::now()).unwrap();
        state.on_sample(PositionSample::new(40.0, -74.0, 0));
        state.on_sample(PositionSample::new(40.0002, -74.0, 4_000));
        let events = state.on_sample(PositionSample::new(40.0001, -74.0, 2_000));
        assert!(matches!(
            events.as_slice(),
            [StateEvent::Rejected {
                reason: RejectReason::Stale,
                ..
            }]
        ));
        assert_eq!(state.snapshot(t0).rejected_samples, 1);
    }
}
