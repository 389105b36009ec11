use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use clap::Subcommand;
use serde::Serialize;
use spark_core::timer::{CountdownState, NextPhase, PhasePlan, TickCoordinator, TimerMode, TokioScheduler};
use spark_core::Config;

use super::{open_timer, print_json};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start a countdown, replacing any current one
    Start {
        /// pomodoro, ignite, fog_cutter or anchor
        #[arg(long, default_value = "pomodoro")]
        mode: TimerMode,
        /// Length in seconds (defaults to the configured length for the mode)
        #[arg(long)]
        duration: Option<u64>,
        /// Start a break phase instead of a work phase
        #[arg(long = "break")]
        is_break: bool,
    },
    /// Pause the running countdown
    Pause,
    /// Resume a paused countdown
    Resume,
    /// Clear the countdown (session count is kept)
    Reset,
    /// Recompute remaining time from the wall clock
    Tick,
    /// Print current countdown state as JSON
    Status,
    /// Finish the current phase and set up the next one
    Complete,
    /// Count one more completed session
    Session,
    /// Skip ahead by a number of seconds
    FastForward {
        /// Non-positive amounts are ignored
        #[arg(allow_negative_numbers = true)]
        seconds: f64,
    },
    /// Drive the countdown live until phases complete
    Watch {
        /// Number of phase completions to wait for
        #[arg(long, default_value = "1")]
        phases: u32,
    },
}

#[derive(Serialize)]
struct StatusView<'a> {
    #[serde(flatten)]
    state: &'a CountdownState,
    formatted: String,
}

impl<'a> StatusView<'a> {
    fn new(state: &'a CountdownState) -> Self {
        Self {
            state,
            formatted: state.formatted_remaining(),
        }
    }
}

#[derive(Serialize)]
struct PhaseView<'a> {
    next: NextPhase,
    state: StatusView<'a>,
}

pub fn run(action: TimerAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let plan = PhasePlan::from_config(&config.timer);
    let mut timer = open_timer(&config)?;

    match action {
        TimerAction::Start {
            mode,
            duration,
            is_break,
        } => {
            let duration = duration.unwrap_or(if is_break {
                plan.short_break_secs
            } else {
                plan.initial_duration(mode)
            });
            let state = timer.start(mode, duration, !is_break)?;
            print_json(&StatusView::new(state))?;
        }
        TimerAction::Pause => {
            timer.tick();
            print_json(&StatusView::new(timer.pause()))?;
        }
        TimerAction::Resume => print_json(&StatusView::new(timer.resume()))?,
        TimerAction::Reset => print_json(&StatusView::new(timer.reset()))?,
        TimerAction::Tick | TimerAction::Status => {
            timer.tick();
            print_json(&StatusView::new(timer.state()))?;
        }
        TimerAction::Complete => {
            timer.tick();
            let next = timer.advance_phase(&plan);
            if config.auto_advance {
                timer.resume();
            }
            print_json(&PhaseView {
                next,
                state: StatusView::new(timer.state()),
            })?;
        }
        TimerAction::Session => print_json(&StatusView::new(timer.increment_session()))?,
        TimerAction::FastForward { seconds } => {
            timer.tick();
            print_json(&StatusView::new(timer.fast_forward(seconds)))?;
        }
        TimerAction::Watch { phases } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(watch(Arc::new(Mutex::new(timer)), &config, &plan, phases))?;
        }
    }
    Ok(())
}

/// Run the shared tick and print the state on every change, applying the
/// phase plan whenever a phase runs out.
async fn watch(
    timer: Arc<Mutex<spark_core::TimerService>>,
    config: &Config,
    plan: &PhasePlan,
    phases: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let coordinator = TickCoordinator::from_config(TokioScheduler::current(), Arc::clone(&timer), &config.ticker);
    let poll = Duration::from_millis(coordinator.tick_ms());
    coordinator.start();

    let mut completed = 0;
    let mut last_printed = None;
    loop {
        {
            let mut timer = timer.lock().unwrap_or_else(PoisonError::into_inner);
            let remaining = timer.state().remaining_seconds;
            if last_printed != Some(remaining) {
                println!("{}", serde_json::to_string(&StatusView::new(timer.state()))?);
                last_printed = Some(remaining);
            }

            if timer.state().phase_finished() {
                let next = timer.advance_phase(plan);
                completed += 1;
                tracing::info!(completed, ?next, "phase finished");
                if completed >= phases {
                    if config.auto_advance {
                        timer.resume();
                    }
                    println!("{}", serde_json::to_string(&StatusView::new(timer.state()))?);
                    break;
                }
                timer.resume();
                last_printed = None;
            } else if !timer.is_running() {
                tracing::warn!("no running countdown to watch");
                break;
            }
        }
        tokio::time::sleep(poll).await;
    }

    coordinator.stop();
    Ok(())
}
