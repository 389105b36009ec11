//! Countdown store wired to its collaborators.
//!
//! [`TimerService`] is what timer consumers talk to. Each operation runs the
//! pure store mutation, then carries out the requested notification change and
//! persists the new state. Both follow-ups are best-effort.

use super::coordinator::TickTarget;
use super::countdown::{CountdownState, CountdownStore, TimerMode};
use super::phase::{NextPhase, PhasePlan};
use crate::clock::{Clock, SystemClock};
use crate::error::ValidationError;
use crate::log::{LogRecord, SharedErrorLog};
use crate::notify::NotificationGateway;
use crate::storage::KvStore;

use super::countdown::NotificationCommand;

/// Storage key of the persisted countdown.
pub const TIMER_STORAGE_KEY: &str = "timer-storage";

pub struct TimerService<C: Clock = SystemClock> {
    store: CountdownStore<C>,
    kv: Box<dyn KvStore>,
    notifications: NotificationGateway,
    log: SharedErrorLog,
}

impl<C: Clock> TimerService<C> {
    /// Rehydrate the countdown from `kv`, falling back to a fresh state if
    /// nothing usable is stored.
    pub fn load(
        clock: C,
        kv: Box<dyn KvStore>,
        notifications: NotificationGateway,
        log: SharedErrorLog,
    ) -> Self {
        let state = rehydrate(kv.as_ref(), &log);
        Self {
            store: CountdownStore::with_state(state, clock),
            kv,
            notifications,
            log,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> &CountdownState {
        self.store.state()
    }

    pub fn is_running(&self) -> bool {
        self.store.is_running()
    }

    pub fn now_ms(&self) -> i64 {
        self.store.clock().now_ms()
    }

    pub fn notifications(&self) -> &NotificationGateway {
        &self.notifications
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// # Errors
    /// Returns an error if `duration_seconds` is zero.
    pub fn start(
        &mut self,
        mode: TimerMode,
        duration_seconds: u64,
        is_working: bool,
    ) -> Result<&CountdownState, ValidationError> {
        let command = self.store.start(mode, duration_seconds, is_working)?;
        tracing::debug!(%mode, duration_seconds, is_working, "countdown started");
        self.apply(Some(command));
        Ok(self.state())
    }

    pub fn pause(&mut self) -> &CountdownState {
        let command = self.store.pause();
        self.apply(command);
        self.state()
    }

    pub fn resume(&mut self) -> &CountdownState {
        let command = self.store.resume();
        self.apply(command);
        self.state()
    }

    /// Returns true if `remaining_seconds` changed.
    pub fn tick(&mut self) -> bool {
        let changed = self.store.tick();
        if changed {
            self.persist();
        }
        changed
    }

    pub fn complete_phase(&mut self, next_duration_seconds: u64, next_is_working: bool) -> &CountdownState {
        let command = self.store.complete_phase(next_duration_seconds, next_is_working);
        self.apply(command);
        self.state()
    }

    /// Complete the current phase according to `plan`, counting a session
    /// when a focus block ends.
    pub fn advance_phase(&mut self, plan: &PhasePlan) -> NextPhase {
        let next = plan.next(self.state());
        if next.counts_session {
            self.store.increment_session();
        }
        self.complete_phase(next.duration_seconds, next.is_working);
        next
    }

    pub fn reset(&mut self) -> &CountdownState {
        let command = self.store.reset();
        self.apply(command);
        self.state()
    }

    pub fn increment_session(&mut self) -> &CountdownState {
        self.store.increment_session();
        self.persist();
        self.state()
    }

    pub fn fast_forward(&mut self, seconds: f64) -> &CountdownState {
        let before = self.store.state().clone();
        let command = self.store.fast_forward(seconds);
        if command.is_some() || &before != self.store.state() {
            self.apply(command);
        }
        self.state()
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn apply(&mut self, command: Option<NotificationCommand>) {
        if let Some(command) = command {
            let now = self.now_ms();
            self.notifications.execute(command, now);
        }
        self.persist();
    }

    fn persist(&self) {
        let result = serde_json::to_string(self.store.state())
            .map_err(crate::error::CoreError::from)
            .and_then(|json| self.kv.set(TIMER_STORAGE_KEY, &json));
        if let Err(e) = result {
            self.log.error(
                &LogRecord::new("TimerService", "persist", "Failed to persist countdown state").with_error(e),
            );
        }
    }
}

impl<C: Clock + 'static> TickTarget for TimerService<C> {
    fn is_running(&self) -> bool {
        self.store.is_running()
    }

    fn tick(&mut self) {
        TimerService::tick(self);
    }
}

fn rehydrate(kv: &dyn KvStore, log: &SharedErrorLog) -> CountdownState {
    let raw = match kv.get(TIMER_STORAGE_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return CountdownState::default(),
        Err(e) => {
            log.error(&LogRecord::new("TimerService", "rehydrate", "Failed to read countdown state").with_error(e));
            return CountdownState::default();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(state) => state,
        Err(e) => {
            tracing::warn!("discarding unreadable countdown state: {e}");
            CountdownState::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::{CoreError, DatabaseError, Result};
    use crate::log::RecordingErrorLog;
    use crate::notify::NoopNotifier;
    use crate::storage::MemoryKv;
    use std::sync::Arc;

    const T0: i64 = 1_700_000_000_000;

    struct BrokenKv;

    impl KvStore for BrokenKv {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(DatabaseError::Locked.into())
        }

        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(CoreError::from(DatabaseError::Locked))
        }
    }

    fn service(kv: impl KvStore + 'static, log: &RecordingErrorLog) -> (TimerService<ManualClock>, ManualClock) {
        let clock = ManualClock::new(T0);
        let log: SharedErrorLog = Arc::new(log.clone());
        let gateway = NotificationGateway::new(Box::new(NoopNotifier), Arc::clone(&log));
        (TimerService::load(clock.clone(), Box::new(kv), gateway, log), clock)
    }

    #[test]
    fn every_mutation_is_persisted() {
        let kv = MemoryKv::new();
        let log = RecordingErrorLog::new();
        let (mut timer, clock) = service(kv.clone(), &log);

        timer.start(TimerMode::Pomodoro, 1500, true).unwrap();
        clock.advance(2_000);
        timer.tick();
        timer.pause();

        let saved: CountdownState =
            serde_json::from_str(&kv.get(TIMER_STORAGE_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(&saved, timer.state());
        assert_eq!(saved.remaining_seconds, 1498);
        assert!(log.is_empty());
    }

    #[test]
    fn rehydrates_previous_state() {
        let kv = MemoryKv::new();
        let log = RecordingErrorLog::new();
        {
            let (mut timer, _) = service(kv.clone(), &log);
            timer.start(TimerMode::Ignite, 300, true).unwrap();
            timer.increment_session();
        }
        let (timer, clock) = service(kv, &log);
        assert_eq!(timer.state().active_mode, Some(TimerMode::Ignite));
        assert_eq!(timer.state().sessions, 1);
        assert!(timer.is_running());
        assert_eq!(timer.state().target_end_time, Some(clock.now_ms() + 300_000));
    }

    #[test]
    fn corrupt_record_falls_back_to_default() {
        let kv = MemoryKv::new();
        kv.set(TIMER_STORAGE_KEY, "{not json").unwrap();
        let log = RecordingErrorLog::new();
        let (timer, _) = service(kv, &log);
        assert_eq!(timer.state(), &CountdownState::default());
    }

    #[test]
    fn storage_failures_never_surface() {
        let log = RecordingErrorLog::new();
        let (mut timer, _) = service(BrokenKv, &log);
        assert_eq!(timer.state(), &CountdownState::default());

        let state = timer.start(TimerMode::Pomodoro, 60, true).unwrap();
        assert!(state.is_running);
        // one failed read, one failed write
        assert_eq!(log.len(), 2);
        assert_eq!(log.records()[1].operation, "persist");
    }

    #[test]
    fn advance_phase_counts_sessions() {
        let log = RecordingErrorLog::new();
        let (mut timer, clock) = service(MemoryKv::new(), &log);
        let plan = PhasePlan::default();

        timer.start(TimerMode::Pomodoro, plan.focus_secs, true).unwrap();
        clock.advance(plan.focus_secs as i64 * 1000);
        timer.tick();
        assert!(timer.state().phase_finished());

        let next = timer.advance_phase(&plan);
        assert!(next.counts_session);
        assert_eq!(timer.state().sessions, 1);
        assert!(!timer.state().is_working);
        assert_eq!(timer.state().remaining_seconds, plan.short_break_secs);
        assert!(!timer.is_running());

        timer.resume();
        clock.advance(plan.short_break_secs as i64 * 1000);
        timer.tick();
        let next = timer.advance_phase(&plan);
        assert!(!next.counts_session);
        assert!(timer.state().is_working);
        assert_eq!(timer.state().sessions, 1);
    }

    #[test]
    fn invalid_fast_forward_leaves_state_alone() {
        let log = RecordingErrorLog::new();
        let (mut timer, _) = service(MemoryKv::new(), &log);
        timer.start(TimerMode::Pomodoro, 100, true).unwrap();
        let before = timer.state().clone();
        timer.fast_forward(-1.0);
        timer.fast_forward(f64::NAN);
        assert_eq!(timer.state(), &before);
        timer.fast_forward(10.0);
        assert_eq!(timer.state().remaining_seconds, 90);
    }
}
