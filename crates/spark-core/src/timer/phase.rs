use serde::Serialize;

use super::countdown::{CountdownState, TimerMode};
use crate::storage::TimerConfig;

/// What follows a finished phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextPhase {
    pub duration_seconds: u64,
    pub is_working: bool,
    /// The finished phase was a focus block and counts as a session.
    pub counts_session: bool,
}

/// Phase lengths per mode, in seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhasePlan {
    pub focus_secs: u64,
    pub short_break_secs: u64,
    pub long_break_secs: u64,
    pub long_break_every: u64,
    pub ignite_secs: u64,
    pub anchor_secs: u64,
    pub fog_cutter_secs: u64,
}

impl Default for PhasePlan {
    fn default() -> Self {
        Self::from_config(&TimerConfig::default())
    }
}

impl PhasePlan {
    pub fn from_config(config: &TimerConfig) -> Self {
        let secs = |min: u32| u64::from(min) * 60;
        Self {
            focus_secs: secs(config.focus_duration),
            short_break_secs: secs(config.short_break),
            long_break_secs: secs(config.long_break),
            long_break_every: u64::from(config.long_break_every),
            ignite_secs: secs(config.ignite_duration),
            anchor_secs: secs(config.anchor_duration),
            fog_cutter_secs: secs(config.fog_cutter_duration),
        }
    }

    /// Length of the first phase when a mode is started fresh.
    pub fn initial_duration(&self, mode: TimerMode) -> u64 {
        match mode {
            TimerMode::Pomodoro => self.focus_secs,
            TimerMode::Ignite => self.ignite_secs,
            TimerMode::Anchor => self.anchor_secs,
            TimerMode::FogCutter => self.fog_cutter_secs,
        }
    }

    /// Decide the phase after the one described by `state`.
    ///
    /// Pomodoro alternates focus and break, with a long break after every
    /// `long_break_every` sessions. Other modes are single-phase and simply
    /// re-arm with their own length.
    pub fn next(&self, state: &CountdownState) -> NextPhase {
        match state.active_mode {
            Some(TimerMode::Pomodoro) if state.is_working => {
                let sessions = state.sessions.saturating_add(1);
                let long = self.long_break_every > 0 && sessions % self.long_break_every == 0;
                NextPhase {
                    duration_seconds: if long {
                        self.long_break_secs
                    } else {
                        self.short_break_secs
                    },
                    is_working: false,
                    counts_session: true,
                }
            }
            Some(TimerMode::Pomodoro) => NextPhase {
                duration_seconds: self.focus_secs,
                is_working: true,
                counts_session: false,
            },
            Some(mode) => NextPhase {
                duration_seconds: self.initial_duration(mode),
                is_working: true,
                counts_session: false,
            },
            None => NextPhase {
                duration_seconds: state.duration_seconds,
                is_working: true,
                counts_session: false,
            },
        }
    }
}
