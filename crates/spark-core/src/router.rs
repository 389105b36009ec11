//! Applies agent events to the running app.
//!
//! The router is the consumer side of the [`AgentEventBus`]: it starts timers,
//! tracks navigation and keeps the items an agent dropped in for the UI.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::clock::Clock;
use crate::events::{AgentEvent, AgentEventBus, AgentEventKind, ListenerResult, Screen, Subscription};
use crate::timer::{PhasePlan, Ticker, TimerService};

/// UI-facing state the router maintains.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub current_screen: Screen,
    /// Brain-dump texts added by an agent and not yet shown.
    pub inbox: Vec<String>,
    /// Task title the fog-cutter screen should open with.
    pub fog_cutter_seed: Option<String>,
}

/// Holds the bus subscriptions. Dropping the router removes them.
pub struct AgentRouter {
    view: Arc<Mutex<ViewState>>,
    subscriptions: Vec<Subscription>,
}

impl AgentRouter {
    pub fn attach<C: Clock + 'static>(
        bus: &AgentEventBus,
        timer: Arc<Mutex<TimerService<C>>>,
        plan: PhasePlan,
        ticker: Option<Arc<dyn Ticker>>,
    ) -> Self {
        let view = Arc::new(Mutex::new(ViewState::default()));
        let mut subscriptions = Vec::with_capacity(AgentEventKind::ALL.len());

        subscriptions.push(bus.on(AgentEventKind::TimerStart, move |event| {
            let AgentEvent::TimerStart { timer_type } = event else {
                return Ok(());
            };
            let mode = timer_type.mode();
            {
                let mut timer = timer.lock().unwrap_or_else(PoisonError::into_inner);
                timer.start(mode, plan.initial_duration(mode), true)?;
            }
            if let Some(ticker) = &ticker {
                ticker.start();
            }
            tracing::info!(%mode, "timer started by agent");
            Ok(())
        }));

        subscriptions.push(on_view(bus, &view, AgentEventKind::NavigateScreen, |view, event| {
            if let AgentEvent::NavigateScreen { screen } = event {
                view.current_screen = *screen;
            }
        }));
        subscriptions.push(on_view(bus, &view, AgentEventKind::BrainDumpAdd, |view, event| {
            if let AgentEvent::BrainDumpAdd { text } = event {
                view.inbox.push(text.clone());
            }
        }));
        subscriptions.push(on_view(bus, &view, AgentEventKind::FogCutterCreate, |view, event| {
            if let AgentEvent::FogCutterCreate { task_title } = event {
                view.fog_cutter_seed = Some(task_title.clone());
            }
        }));

        Self { view, subscriptions }
    }

    pub fn view(&self) -> ViewState {
        lock(&self.view).clone()
    }

    /// Hand the inbox to the UI and clear it.
    pub fn take_inbox(&self) -> Vec<String> {
        std::mem::take(&mut lock(&self.view).inbox)
    }

    /// Consume the fog-cutter seed, if any.
    pub fn take_fog_cutter_seed(&self) -> Option<String> {
        lock(&self.view).fog_cutter_seed.take()
    }
}

impl Drop for AgentRouter {
    fn drop(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
    }
}

fn on_view(
    bus: &AgentEventBus,
    view: &Arc<Mutex<ViewState>>,
    kind: AgentEventKind,
    apply: fn(&mut ViewState, &AgentEvent),
) -> Subscription {
    let view = Arc::clone(view);
    bus.on(kind, move |event| -> ListenerResult {
        apply(&mut lock(&view), event);
        Ok(())
    })
}

fn lock(view: &Mutex<ViewState>) -> MutexGuard<'_, ViewState> {
    view.lock().unwrap_or_else(PoisonError::into_inner)
}
