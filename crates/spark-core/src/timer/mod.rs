mod coordinator;
mod countdown;
mod phase;
mod service;

pub use coordinator::{
    TickCoordinator, TickScheduler, TickTarget, Ticker, TokioScheduler, DEFAULT_TICK_MS, TEST_TICK_MS,
};
pub use countdown::{
    format_clock, remaining_secs, CountdownState, CountdownStore, NotificationCommand, TimerMode,
};
pub use phase::{NextPhase, PhasePlan};
pub use service::{TimerService, TIMER_STORAGE_KEY};
