//! Shared countdown state.
//!
//! One countdown exists per process. Whichever timer mode started it last
//! owns it; starting another mode overwrites it wholesale.
//!
//! The store is wall-clock based: while running, the remaining time is always
//! recomputed from `target_end_time` and the clock, so it does not matter how
//! often (or how irregularly) `tick()` is called.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -start-> Running -pause-> Paused -resume-> Running
//!   Running/Paused -reset|complete_phase-> Paused (full duration)
//! ```
//!
//! Mutators never perform I/O. Operations that affect the pending completion
//! notification return a [`NotificationCommand`] for the caller to execute.
//!
//! `tick()` never completes a phase. When the countdown reaches zero the
//! consumer decides what happens next (sound, navigation, next phase) and
//! calls [`CountdownStore::complete_phase`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::error::ValidationError;

/// Which logical timer owns the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerMode {
    Pomodoro,
    Ignite,
    FogCutter,
    Anchor,
}

impl TimerMode {
    pub const ALL: [TimerMode; 4] = [
        TimerMode::Pomodoro,
        TimerMode::Ignite,
        TimerMode::FogCutter,
        TimerMode::Anchor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TimerMode::Pomodoro => "pomodoro",
            TimerMode::Ignite => "ignite",
            TimerMode::FogCutter => "fog_cutter",
            TimerMode::Anchor => "anchor",
        }
    }
}

impl fmt::Display for TimerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimerMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "pomodoro" => Ok(TimerMode::Pomodoro),
            "ignite" => Ok(TimerMode::Ignite),
            "fog_cutter" | "fogcutter" => Ok(TimerMode::FogCutter),
            "anchor" => Ok(TimerMode::Anchor),
            other => Err(ValidationError::InvalidValue {
                field: "mode".into(),
                message: format!("unknown timer mode '{other}'"),
            }),
        }
    }
}

/// The single shared countdown record. Persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CountdownState {
    pub active_mode: Option<TimerMode>,
    pub is_running: bool,
    /// Absolute end of the countdown, ms since epoch. Only set while running.
    pub target_end_time: Option<i64>,
    pub remaining_seconds: u64,
    pub duration_seconds: u64,
    /// Work vs break phase. Only meaningful for pomodoro.
    pub is_working: bool,
    /// Completed work phases.
    pub sessions: u64,
}

impl Default for CountdownState {
    fn default() -> Self {
        Self {
            active_mode: None,
            is_running: false,
            target_end_time: None,
            remaining_seconds: 0,
            duration_seconds: 0,
            is_working: true,
            sessions: 0,
        }
    }
}

impl CountdownState {
    /// The countdown hit zero while running and is waiting for the consumer
    /// to complete the phase.
    pub fn phase_finished(&self) -> bool {
        self.is_running && self.remaining_seconds == 0
    }

    /// Restore the running/target invariant on a record read from storage.
    /// Returns true if anything had to change.
    pub fn repair(&mut self) -> bool {
        match (self.is_running, self.target_end_time) {
            (true, None) => {
                self.is_running = false;
                true
            }
            (false, Some(_)) => {
                self.target_end_time = None;
                true
            }
            _ => false,
        }
    }

    /// `mm:ss` rendering of the remaining time.
    pub fn formatted_remaining(&self) -> String {
        format_clock(self.remaining_seconds)
    }
}

/// Side effect requested by a countdown mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationCommand {
    /// Replace any pending completion notification with one firing at
    /// `trigger_at_ms`.
    Schedule {
        title: String,
        body: String,
        trigger_at_ms: i64,
    },
    /// Drop the pending completion notification, if any.
    Cancel,
}

/// Countdown state plus the clock it is measured against.
#[derive(Debug, Clone)]
pub struct CountdownStore<C: Clock = SystemClock> {
    state: CountdownState,
    clock: C,
}

impl CountdownStore<SystemClock> {
    pub fn system() -> Self {
        Self::new(SystemClock)
    }
}

impl<C: Clock> CountdownStore<C> {
    pub fn new(clock: C) -> Self {
        Self {
            state: CountdownState::default(),
            clock,
        }
    }

    /// Wrap a previously persisted state, repairing the running invariant.
    pub fn with_state(mut state: CountdownState, clock: C) -> Self {
        if state.repair() {
            tracing::warn!("repaired inconsistent countdown state on load");
        }
        Self { state, clock }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> &CountdownState {
        &self.state
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Begin a new countdown, replacing whatever was there.
    ///
    /// # Errors
    /// Returns an error if `duration_seconds` is zero.
    pub fn start(
        &mut self,
        mode: TimerMode,
        duration_seconds: u64,
        is_working: bool,
    ) -> Result<NotificationCommand, ValidationError> {
        if duration_seconds == 0 {
            return Err(ValidationError::InvalidValue {
                field: "duration_seconds".into(),
                message: "must be greater than zero".into(),
            });
        }
        let target = self.clock.now_ms().saturating_add(secs_to_ms(duration_seconds));
        self.state = CountdownState {
            active_mode: Some(mode),
            is_running: true,
            target_end_time: Some(target),
            remaining_seconds: duration_seconds,
            duration_seconds,
            is_working,
            sessions: self.state.sessions,
        };
        Ok(self.schedule_command(target))
    }

    /// Freeze the countdown at its last computed value.
    pub fn pause(&mut self) -> Option<NotificationCommand> {
        if !self.state.is_running {
            return None;
        }
        self.state.is_running = false;
        self.state.target_end_time = None;
        Some(NotificationCommand::Cancel)
    }

    pub fn resume(&mut self) -> Option<NotificationCommand> {
        if self.state.is_running || self.state.remaining_seconds == 0 {
            return None;
        }
        let target = self
            .clock
            .now_ms()
            .saturating_add(secs_to_ms(self.state.remaining_seconds));
        self.state.is_running = true;
        self.state.target_end_time = Some(target);
        Some(self.schedule_command(target))
    }

    /// Recompute `remaining_seconds` from the clock.
    ///
    /// Returns true if the value changed.
    pub fn tick(&mut self) -> bool {
        let Some(target) = self.state.target_end_time else {
            return false;
        };
        if !self.state.is_running {
            return false;
        }
        let next = remaining_secs(target, self.clock.now_ms()).min(self.state.remaining_seconds);
        if next == self.state.remaining_seconds {
            return false;
        }
        self.state.remaining_seconds = next;
        true
    }

    /// Set up a fresh, paused countdown for the next phase.
    pub fn complete_phase(
        &mut self,
        next_duration_seconds: u64,
        next_is_working: bool,
    ) -> Option<NotificationCommand> {
        self.state.is_running = false;
        self.state.target_end_time = None;
        self.state.remaining_seconds = next_duration_seconds;
        self.state.duration_seconds = next_duration_seconds;
        self.state.is_working = next_is_working;
        Some(NotificationCommand::Cancel)
    }

    /// Back to the full configured duration, stopped.
    pub fn reset(&mut self) -> Option<NotificationCommand> {
        self.state.is_running = false;
        self.state.remaining_seconds = self.state.duration_seconds;
        self.state.target_end_time = None;
        Some(NotificationCommand::Cancel)
    }

    pub fn increment_session(&mut self) {
        self.state.sessions = self.state.sessions.saturating_add(1);
    }

    /// Skip ahead by `seconds`. Anything that is not a positive finite
    /// number is ignored.
    pub fn fast_forward(&mut self, seconds: f64) -> Option<NotificationCommand> {
        if !seconds.is_finite() || seconds <= 0.0 {
            return None;
        }
        // `as` saturates for out-of-range floats.
        let amount_ms = (seconds * 1000.0).round() as i64;

        match (self.state.is_running, self.state.target_end_time) {
            (true, Some(target)) => {
                let target = target.saturating_sub(amount_ms);
                self.state.target_end_time = Some(target);
                self.tick();
                Some(self.schedule_command(target))
            }
            _ => {
                let amount_secs = seconds as u64;
                self.state.remaining_seconds =
                    self.state.remaining_seconds.saturating_sub(amount_secs);
                None
            }
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn schedule_command(&self, trigger_at_ms: i64) -> NotificationCommand {
        let (title, body) = completion_message(self.state.active_mode, self.state.is_working);
        NotificationCommand::Schedule {
            title: title.to_string(),
            body: body.to_string(),
            trigger_at_ms,
        }
    }
}

/// `max(0, ceil((target - now) / 1000))`
pub fn remaining_secs(target_end_ms: i64, now_ms: i64) -> u64 {
    if target_end_ms <= now_ms {
        return 0;
    }
    let diff = target_end_ms.saturating_sub(now_ms) as u64;
    diff.div_ceil(1000)
}

fn secs_to_ms(secs: u64) -> i64 {
    i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX)
}

fn completion_message(mode: Option<TimerMode>, is_working: bool) -> (&'static str, &'static str) {
    match (mode, is_working) {
        (Some(TimerMode::Pomodoro), true) => ("Focus block complete", "Time for a recovery break."),
        (Some(TimerMode::Pomodoro), false) => ("Break is over", "Ready for the next focus block?"),
        (Some(TimerMode::Ignite), _) => ("Ignite complete", "Five minutes done. Keep the momentum."),
        (Some(TimerMode::FogCutter), _) => ("Fog Cutter session complete", "Check off your next micro-step."),
        (Some(TimerMode::Anchor), _) => ("Anchor complete", "Notice how you feel now."),
        (None, _) => ("Timer complete", "Your countdown has finished."),
    }
}

/// Render seconds as `mm:ss` (minutes are not wrapped at 60).
pub fn format_clock(total_secs: u64) -> String {
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}
