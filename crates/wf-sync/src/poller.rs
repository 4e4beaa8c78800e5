//! Fallback status polling.
//!
//! [`PollScheduler`] is a pure state machine: it decides *when* the next
//! poll is due and never touches a clock itself. The reconciler feeds it
//! transport health on every health tick and arms the actual timer.

use std::time::Duration;

use chrono::{DateTime, Utc};
use wf_api_types::{Task, TaskStatus};
use wf_core::config::SyncConfig;
use wf_core::view_state::recently_updated;

/// Steps during which the backend is expected to keep streaming events.
pub const BUSY_STEPS: &[&str] = &[
    "content_generation",
    "tutorial_generation",
    "resource_recommendation",
    "quiz_generation",
];

pub fn is_busy_step(step: Option<&str>) -> bool {
    step.is_some_and(|s| BUSY_STEPS.contains(&s))
}

/// Non-terminal status and a busy step.
pub fn is_active_phase(task: &Task) -> bool {
    !task.status.is_terminal() && is_busy_step(task.current_step.as_deref())
}

/// Whether a freshly loaded task deserves a live event channel: it is
/// still running, or it failed so recently that a retry may be under way.
pub fn should_track(task: &Task, now: DateTime<Utc>, retry_window: Duration) -> bool {
    task.status.is_active()
        || (task.status == TaskStatus::Failed && recently_updated(task, now, retry_window))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub initial: Duration,
    pub max: Duration,
    pub factor: u32,
    pub silence_threshold: Duration,
}

impl PollConfig {
    pub fn from_sync(cfg: &SyncConfig) -> Self {
        Self {
            initial: cfg.poll_initial(),
            max: cfg.poll_max(),
            factor: cfg.poll_backoff_factor,
            silence_threshold: cfg.silence_threshold(),
        }
    }

    /// `initial * factor^attempt`, capped at `max`.
    pub fn interval_for(&self, attempt: u32) -> Duration {
        let mult = self.factor.saturating_pow(attempt);
        self.initial.saturating_mul(mult).min(self.max)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::from_sync(&SyncConfig::default())
    }
}

/// What the reconciler knows about the event channel at a health tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportHealth {
    pub connected: bool,
    /// Time since the last message of any kind.
    pub silent_for: Duration,
}

impl TransportHealth {
    pub fn needs_fallback(&self, silence_threshold: Duration) -> bool {
        !self.connected || self.silent_for > silence_threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling { interval: Duration, attempt: u32 },
    /// Terminal state reached; only [`PollScheduler::reset`] leaves it.
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The task is still running.
    Pending,
    /// The request failed; treated like a non-terminal answer.
    Failed,
    Terminal,
}

#[derive(Debug, Clone)]
pub struct PollScheduler {
    config: PollConfig,
    state: PollState,
}

impl PollScheduler {
    pub fn new(config: PollConfig) -> Self {
        Self {
            config,
            state: PollState::Idle,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn is_polling(&self) -> bool {
        matches!(self.state, PollState::Polling { .. })
    }

    /// Health-check tick. Returns the delay until the first poll when
    /// polling starts on this tick.
    pub fn observe(&mut self, health: TransportHealth, active: bool) -> Option<Duration> {
        match self.state {
            PollState::Stopped => None,
            PollState::Idle => {
                if active && health.needs_fallback(self.config.silence_threshold) {
                    let interval = self.config.interval_for(0);
                    self.state = PollState::Polling {
                        interval,
                        attempt: 0,
                    };
                    Some(interval)
                } else {
                    None
                }
            }
            PollState::Polling { .. } => {
                if !active {
                    self.state = PollState::Idle;
                }
                None
            }
        }
    }

    /// Any inbound transport message puts polling back to rest.
    pub fn on_transport_message(&mut self) {
        if self.is_polling() {
            self.state = PollState::Idle;
        }
    }

    /// Record a poll answer. Returns the delay until the next poll, if any.
    pub fn on_poll_result(&mut self, outcome: PollOutcome) -> Option<Duration> {
        let PollState::Polling { attempt, .. } = self.state else {
            return None;
        };
        if outcome == PollOutcome::Terminal {
            self.state = PollState::Stopped;
            return None;
        }
        let attempt = attempt.saturating_add(1);
        let interval = self.config.interval_for(attempt);
        self.state = PollState::Polling { interval, attempt };
        Some(interval)
    }

    pub fn stop(&mut self) {
        self.state = PollState::Stopped;
    }

    pub fn reset(&mut self) {
        self.state = PollState::Idle;
    }
}
