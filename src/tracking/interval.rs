use serde::{Deserialize, Serialize};

use crate::models::{IntervalPhase, IntervalPlan, IntervalRuntimeState};

/// Phase-change notifications for the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum IntervalEvent {
    WorkStarted { interval: u32 },
    RestStarted { interval: u32 },
    IntervalsComplete { completed: u32 },
}

/// One-second countdown alternating work and rest phases.
///
/// The timer has no clock of its own. The owner feeds it the number of whole
/// active seconds elapsed, so ticks delivered always equal
/// `floor(active_elapsed_seconds)` regardless of ticker jitter or pauses.
#[derive(Debug, Clone)]
pub struct IntervalTimer {
    plan: IntervalPlan,
    state: IntervalRuntimeState,
    ticks_delivered: u64,
}

impl IntervalTimer {
    pub fn new(plan: IntervalPlan) -> Self {
        Self {
            state: IntervalRuntimeState::initial(&plan),
            plan,
            ticks_delivered: 0,
        }
    }

    /// Event announcing the first work phase.
    pub fn opening_event(&self) -> IntervalEvent {
        IntervalEvent::WorkStarted { interval: 1 }
    }

    pub fn state(&self) -> IntervalRuntimeState {
        self.state
    }

    pub fn ticks_delivered(&self) -> u64 {
        self.ticks_delivered
    }

    /// Delivers ticks until `total_ticks` have been seen since the session began.
    pub fn advance_to(&mut self, total_ticks: u64) -> Vec<IntervalEvent> {
        let mut events = Vec::new();
        while self.ticks_delivered < total_ticks {
            if let Some(event) = self.tick() {
                events.push(event);
            }
        }
        events
    }

    pub fn tick(&mut self) -> Option<IntervalEvent> {
        self.ticks_delivered += 1;
        if self.state.finished {
            return None;
        }

        self.state.remaining_seconds = self.state.remaining_seconds.saturating_sub(1);
        if self.state.remaining_seconds > 0 {
            return None;
        }

        match self.state.phase {
            IntervalPhase::Work => {
                self.state.phase = IntervalPhase::Rest;
                self.state.remaining_seconds = self.plan.rest_seconds;
                Some(IntervalEvent::RestStarted {
                    interval: self.state.completed_intervals + 1,
                })
            }
            IntervalPhase::Rest => {
                self.state.completed_intervals += 1;
                let completed = self.state.completed_intervals;
                if !self.plan.is_unbounded() && completed >= self.plan.total_intervals {
                    self.state.finished = true;
                    return Some(IntervalEvent::IntervalsComplete { completed });
                }
                self.state.phase = IntervalPhase::Work;
                self.state.remaining_seconds = self.plan.work_seconds;
                Some(IntervalEvent::WorkStarted {
                    interval: completed + 1,
                })
            }
        }
    }
}
