//! The one recurring tick shared by every timer consumer.
//!
//! Consumers never create their own intervals. They start the coordinator,
//! which owns at most one scheduled callback and uses it to tick the shared
//! countdown while it is running.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::storage::TickerConfig;

/// Normal cadence.
pub const DEFAULT_TICK_MS: u64 = 1000;
/// Cadence under test mode.
pub const TEST_TICK_MS: u64 = 100;

/// Something the coordinator can drive.
pub trait TickTarget: Send + 'static {
    fn is_running(&self) -> bool;
    fn tick(&mut self);
}

/// Recurring-callback primitive underneath the coordinator.
pub trait TickScheduler: Send + Sync + 'static {
    type Handle: Send + 'static;

    fn schedule_repeating(&self, period: Duration, task: Box<dyn FnMut() + Send + 'static>) -> Self::Handle;

    fn cancel(&self, handle: Self::Handle);
}

/// Object-safe view of a coordinator, for consumers that only need to
/// switch the tick on and off.
pub trait Ticker: Send + Sync {
    fn start(&self);
    fn stop(&self);
}

/// Schedules ticks as a tokio task driven by [`tokio::time::interval`].
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    runtime: tokio::runtime::Handle,
}

impl TokioScheduler {
    pub fn new(runtime: tokio::runtime::Handle) -> Self {
        Self { runtime }
    }

    /// Use the runtime of the calling context.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

impl TickScheduler for TokioScheduler {
    type Handle = JoinHandle<()>;

    fn schedule_repeating(&self, period: Duration, mut task: Box<dyn FnMut() + Send + 'static>) -> JoinHandle<()> {
        self.runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; the first callback fires one period in.
            interval.tick().await;
            loop {
                interval.tick().await;
                task();
            }
        })
    }

    fn cancel(&self, handle: JoinHandle<()>) {
        handle.abort();
    }
}

struct Slot<H> {
    tick_ms: u64,
    active: Option<H>,
}

/// Owns the single recurring tick for a shared [`TickTarget`].
pub struct TickCoordinator<S: TickScheduler, T: TickTarget> {
    scheduler: S,
    target: Arc<Mutex<T>>,
    slot: Mutex<Slot<S::Handle>>,
}

impl<S: TickScheduler, T: TickTarget> TickCoordinator<S, T> {
    /// Cadence is 1000 ms, or 100 ms when `test_mode` is set.
    pub fn new(scheduler: S, target: Arc<Mutex<T>>, test_mode: bool) -> Self {
        let tick_ms = if test_mode { TEST_TICK_MS } else { DEFAULT_TICK_MS };
        Self::with_tick_ms(scheduler, target, tick_ms)
    }

    pub fn from_config(scheduler: S, target: Arc<Mutex<T>>, config: &TickerConfig) -> Self {
        Self::with_tick_ms(scheduler, target, config.effective_tick_ms())
    }

    pub fn with_tick_ms(scheduler: S, target: Arc<Mutex<T>>, tick_ms: u64) -> Self {
        Self {
            scheduler,
            target,
            slot: Mutex::new(Slot {
                tick_ms: tick_ms.max(1),
                active: None,
            }),
        }
    }

    pub fn target(&self) -> &Arc<Mutex<T>> {
        &self.target
    }

    pub fn tick_ms(&self) -> u64 {
        self.slot().tick_ms
    }

    pub fn is_scheduled(&self) -> bool {
        self.slot().active.is_some()
    }

    /// Schedule the recurring tick unless it already exists.
    pub fn start(&self) {
        let mut slot = self.slot();
        self.start_locked(&mut slot);
    }

    /// Cancel the recurring tick. Safe to call in any state.
    pub fn stop(&self) {
        let mut slot = self.slot();
        self.stop_locked(&mut slot);
    }

    /// Change the cadence. A scheduled tick is replaced at the new rate;
    /// otherwise the rate is only stored for the next `start()`.
    pub fn update_tick_rate(&self, ms: u64) {
        let mut slot = self.slot();
        slot.tick_ms = ms.max(1);
        if slot.active.is_some() {
            self.stop_locked(&mut slot);
            self.start_locked(&mut slot);
        }
    }

    fn start_locked(&self, slot: &mut Slot<S::Handle>) {
        if slot.active.is_some() {
            return;
        }
        let target = Arc::clone(&self.target);
        let task = move || {
            let mut target = target.lock().unwrap_or_else(PoisonError::into_inner);
            if target.is_running() {
                target.tick();
            }
        };
        let period = Duration::from_millis(slot.tick_ms);
        slot.active = Some(self.scheduler.schedule_repeating(period, Box::new(task)));
        tracing::debug!(tick_ms = slot.tick_ms, "tick scheduled");
    }

    fn stop_locked(&self, slot: &mut Slot<S::Handle>) {
        if let Some(handle) = slot.active.take() {
            self.scheduler.cancel(handle);
            tracing::debug!("tick cancelled");
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Slot<S::Handle>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: TickScheduler, T: TickTarget> Ticker for TickCoordinator<S, T> {
    fn start(&self) {
        TickCoordinator::start(self);
    }

    fn stop(&self) {
        TickCoordinator::stop(self);
    }
}

impl<S: TickScheduler, T: TickTarget> Drop for TickCoordinator<S, T> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Task = Box<dyn FnMut() + Send + 'static>;

    /// Hands out sequential handles and keeps the live tasks so tests can
    /// fire them by hand.
    #[derive(Clone, Default)]
    struct ManualScheduler {
        scheduled: Arc<AtomicUsize>,
        cancelled: Arc<AtomicUsize>,
        live: Arc<Mutex<Vec<(usize, Duration, Task)>>>,
    }

    impl ManualScheduler {
        fn live_periods(&self) -> Vec<Duration> {
            self.live.lock().unwrap().iter().map(|(_, p, _)| *p).collect()
        }

        fn fire(&self) {
            for (_, _, task) in self.live.lock().unwrap().iter_mut() {
                task();
            }
        }
    }

    impl TickScheduler for ManualScheduler {
        type Handle = usize;

        fn schedule_repeating(&self, period: Duration, task: Task) -> usize {
            let id = self.scheduled.fetch_add(1, Ordering::SeqCst);
            self.live.lock().unwrap().push((id, period, task));
            id
        }

        fn cancel(&self, handle: usize) {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
            self.live.lock().unwrap().retain(|(id, _, _)| *id != handle);
        }
    }

    #[derive(Default)]
    struct Counter {
        running: bool,
        ticks: usize,
    }

    impl TickTarget for Counter {
        fn is_running(&self) -> bool {
            self.running
        }

        fn tick(&mut self) {
            self.ticks += 1;
        }
    }

    fn coordinator(test_mode: bool) -> (TickCoordinator<ManualScheduler, Counter>, ManualScheduler, Arc<Mutex<Counter>>) {
        let scheduler = ManualScheduler::default();
        let target = Arc::new(Mutex::new(Counter::default()));
        let coordinator = TickCoordinator::new(scheduler.clone(), Arc::clone(&target), test_mode);
        (coordinator, scheduler, target)
    }

    #[test]
    fn repeated_start_schedules_once() {
        let (coordinator, scheduler, _) = coordinator(false);
        coordinator.start();
        coordinator.start();
        coordinator.start();
        assert_eq!(scheduler.scheduled.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.live_periods(), vec![Duration::from_millis(1000)]);
        assert!(coordinator.is_scheduled());
    }

    #[test]
    fn repeated_stop_leaves_nothing_scheduled() {
        let (coordinator, scheduler, _) = coordinator(false);
        coordinator.stop();
        coordinator.start();
        coordinator.stop();
        coordinator.stop();
        coordinator.stop();
        assert_eq!(scheduler.cancelled.load(Ordering::SeqCst), 1);
        assert!(scheduler.live_periods().is_empty());
        assert!(!coordinator.is_scheduled());
    }

    #[test]
    fn test_mode_uses_fast_cadence() {
        let (coordinator, scheduler, _) = coordinator(true);
        assert_eq!(coordinator.tick_ms(), TEST_TICK_MS);
        coordinator.start();
        assert_eq!(scheduler.live_periods(), vec![Duration::from_millis(100)]);
    }

    #[test]
    fn update_tick_rate_while_running_reschedules_once() {
        let (coordinator, scheduler, _) = coordinator(false);
        coordinator.start();
        coordinator.update_tick_rate(250);
        assert_eq!(scheduler.scheduled.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.cancelled.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.live_periods(), vec![Duration::from_millis(250)]);
    }

    #[test]
    fn update_tick_rate_while_stopped_only_stores() {
        let (coordinator, scheduler, _) = coordinator(false);
        coordinator.update_tick_rate(250);
        assert_eq!(scheduler.scheduled.load(Ordering::SeqCst), 0);
        assert_eq!(coordinator.tick_ms(), 250);

        coordinator.start();
        assert_eq!(scheduler.live_periods(), vec![Duration::from_millis(250)]);
    }

    #[test]
    fn ticks_only_while_target_runs() {
        let (coordinator, scheduler, target) = coordinator(false);
        coordinator.start();
        scheduler.fire();
        assert_eq!(target.lock().unwrap().ticks, 0);

        target.lock().unwrap().running = true;
        scheduler.fire();
        scheduler.fire();
        assert_eq!(target.lock().unwrap().ticks, 2);
    }

    #[test]
    fn drop_cancels_the_tick() {
        let (coordinator, scheduler, _) = coordinator(false);
        coordinator.start();
        drop(coordinator);
        assert!(scheduler.live_periods().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_scheduler_ticks_at_cadence() {
        let target = Arc::new(Mutex::new(Counter {
            running: true,
            ticks: 0,
        }));
        let coordinator = TickCoordinator::new(TokioScheduler::current(), Arc::clone(&target), false);
        coordinator.start();
        coordinator.start();

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(target.lock().unwrap().ticks, 3);

        coordinator.stop();
        tokio::time::sleep(Duration::from_millis(5_000)).await;
        assert_eq!(target.lock().unwrap().ticks, 3);
    }
}
