//! Agent event bus.
//!
//! External agent tools publish [`AgentEvent`]s; app-side consumers subscribe
//! per [`AgentEventKind`]. Neither side knows about the other.
//!
//! Dispatch is synchronous and in registration order. A listener that fails
//! (returns `Err` or panics) is reported to the error log and the remaining
//! listeners still run. `emit` itself never fails.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::log::{tracing_log, LogRecord, SharedErrorLog};
use crate::timer::TimerMode;

/// Timers an agent may ask to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerType {
    Pomodoro,
    Ignite,
    Anchor,
}

impl TimerType {
    pub fn mode(self) -> TimerMode {
        match self {
            TimerType::Pomodoro => TimerMode::Pomodoro,
            TimerType::Ignite => TimerMode::Ignite,
            TimerType::Anchor => TimerMode::Anchor,
        }
    }

    pub fn screen(self) -> Screen {
        match self {
            TimerType::Pomodoro => Screen::Pomodoro,
            TimerType::Ignite => Screen::Ignite,
            TimerType::Anchor => Screen::Anchor,
        }
    }
}

/// Navigable screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Screen {
    #[default]
    Home,
    Ignite,
    Pomodoro,
    Anchor,
    BrainDump,
    FogCutter,
    CheckIn,
    Calendar,
    Chat,
}

impl Screen {
    pub const ALL: [Screen; 9] = [
        Screen::Home,
        Screen::Ignite,
        Screen::Pomodoro,
        Screen::Anchor,
        Screen::BrainDump,
        Screen::FogCutter,
        Screen::CheckIn,
        Screen::Calendar,
        Screen::Chat,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Screen::Home => "Home",
            Screen::Ignite => "Ignite",
            Screen::Pomodoro => "Pomodoro",
            Screen::Anchor => "Anchor",
            Screen::BrainDump => "BrainDump",
            Screen::FogCutter => "FogCutter",
            Screen::CheckIn => "CheckIn",
            Screen::Calendar => "Calendar",
            Screen::Chat => "Chat",
        }
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Screen {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Screen::ALL
            .into_iter()
            .find(|screen| screen.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "screen".into(),
                message: format!("unknown screen '{s}'"),
            })
    }
}

/// Every event an agent can trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentEvent {
    #[serde(rename = "timer:start", rename_all = "camelCase")]
    TimerStart { timer_type: TimerType },
    #[serde(rename = "navigate:screen")]
    NavigateScreen { screen: Screen },
    #[serde(rename = "braindump:add")]
    BrainDumpAdd { text: String },
    #[serde(rename = "fogcutter:create", rename_all = "camelCase")]
    FogCutterCreate { task_title: String },
}

impl AgentEvent {
    pub fn kind(&self) -> AgentEventKind {
        match self {
            AgentEvent::TimerStart { .. } => AgentEventKind::TimerStart,
            AgentEvent::NavigateScreen { .. } => AgentEventKind::NavigateScreen,
            AgentEvent::BrainDumpAdd { .. } => AgentEventKind::BrainDumpAdd,
            AgentEvent::FogCutterCreate { .. } => AgentEventKind::FogCutterCreate,
        }
    }
}

/// Event names, used as subscription keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentEventKind {
    TimerStart,
    NavigateScreen,
    BrainDumpAdd,
    FogCutterCreate,
}

impl AgentEventKind {
    pub const ALL: [AgentEventKind; 4] = [
        AgentEventKind::TimerStart,
        AgentEventKind::NavigateScreen,
        AgentEventKind::BrainDumpAdd,
        AgentEventKind::FogCutterCreate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AgentEventKind::TimerStart => "timer:start",
            AgentEventKind::NavigateScreen => "navigate:screen",
            AgentEventKind::BrainDumpAdd => "braindump:add",
            AgentEventKind::FogCutterCreate => "fogcutter:create",
        }
    }
}

impl fmt::Display for AgentEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a listener returns. `Err` is logged, never propagated.
pub type ListenerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type Listener = Arc<dyn Fn(&AgentEvent) -> ListenerResult + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: HashMap<AgentEventKind, Vec<(u64, Listener)>>,
}

impl Registry {
    fn contains(&self, kind: AgentEventKind, id: u64) -> bool {
        self.listeners
            .get(&kind)
            .is_some_and(|list| list.iter().any(|(lid, _)| *lid == id))
    }

    fn remove(&mut self, kind: AgentEventKind, id: u64) {
        if let Some(list) = self.listeners.get_mut(&kind) {
            list.retain(|(lid, _)| *lid != id);
            if list.is_empty() {
                self.listeners.remove(&kind);
            }
        }
    }
}

/// In-process publish/subscribe registry. Clones share the same registry.
#[derive(Clone)]
pub struct AgentEventBus {
    registry: Arc<Mutex<Registry>>,
    log: SharedErrorLog,
}

impl Default for AgentEventBus {
    fn default() -> Self {
        Self::new(tracing_log())
    }
}

impl fmt::Debug for AgentEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry();
        let counts: HashMap<&str, usize> = registry
            .listeners
            .iter()
            .map(|(kind, list)| (kind.as_str(), list.len()))
            .collect();
        f.debug_struct("AgentEventBus").field("listeners", &counts).finish()
    }
}

impl AgentEventBus {
    pub fn new(log: SharedErrorLog) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            log,
        }
    }

    /// Register `listener` for one kind of event.
    pub fn on<F>(&self, kind: AgentEventKind, listener: F) -> Subscription
    where
        F: Fn(&AgentEvent) -> ListenerResult + Send + Sync + 'static,
    {
        let mut registry = self.registry();
        let id = registry.next_id;
        registry.next_id += 1;
        registry
            .listeners
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));
        Subscription {
            registry: Arc::downgrade(&self.registry),
            kind,
            id,
        }
    }

    /// Deliver `event` to every listener registered for its kind.
    pub fn emit(&self, event: &AgentEvent) {
        let kind = event.kind();
        let snapshot: Vec<(u64, Listener)> = match self.registry().listeners.get(&kind) {
            Some(list) => list.clone(),
            None => return,
        };

        for (id, listener) in snapshot {
            // A listener earlier in this dispatch may have unsubscribed it.
            if !self.registry().contains(kind, id) {
                continue;
            }
            match panic::catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => self.report(kind, &e),
                Err(payload) => self.report(kind, &panic_message(payload.as_ref())),
            }
        }
    }

    /// Drop the listeners of one kind, or of every kind.
    pub fn remove_all_listeners(&self, kind: Option<AgentEventKind>) {
        let mut registry = self.registry();
        match kind {
            Some(kind) => {
                registry.listeners.remove(&kind);
            }
            None => registry.listeners.clear(),
        }
    }

    pub fn listener_count(&self, kind: AgentEventKind) -> usize {
        self.registry().listeners.get(&kind).map_or(0, Vec::len)
    }

    fn report(&self, kind: AgentEventKind, error: &dyn fmt::Display) {
        self.log.error(
            &LogRecord::new("AgentEventBus", "emit", format!("Error in listener for '{kind}'")).with_error(error),
        );
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "listener panicked".to_string()
    }
}

/// Handle returned by [`AgentEventBus::on`].
///
/// Dropping it leaves the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    kind: AgentEventKind,
    id: u64,
}

impl Subscription {
    pub fn kind(&self) -> AgentEventKind {
        self.kind
    }

    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(self.kind, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::RecordingErrorLog;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn bus() -> (AgentEventBus, RecordingErrorLog) {
        let log = RecordingErrorLog::new();
        (AgentEventBus::new(Arc::new(log.clone())), log)
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&AgentEvent) -> ListenerResult + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (count, move |_: &AgentEvent| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn navigate(screen: Screen) -> AgentEvent {
        AgentEvent::NavigateScreen { screen }
    }

    #[test]
    fn emits_payload_to_subscribers() {
        let (bus, _) = bus();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _sub = bus.on(AgentEventKind::TimerStart, move |event| {
            s.lock().unwrap().push(event.clone());
            Ok(())
        });

        bus.emit(&AgentEvent::TimerStart {
            timer_type: TimerType::Pomodoro,
        });

        assert_eq!(
            *seen.lock().unwrap(),
            vec![AgentEvent::TimerStart {
                timer_type: TimerType::Pomodoro
            }]
        );
    }

    #[test]
    fn emit_without_subscribers_is_a_noop() {
        let (bus, log) = bus();
        bus.emit(&AgentEvent::BrainDumpAdd { text: "hello".into() });
        assert!(log.is_empty());
    }

    #[test]
    fn only_matching_kind_is_invoked() {
        let (bus, _) = bus();
        let (count, listener) = counter();
        let _sub = bus.on(AgentEventKind::BrainDumpAdd, listener);
        bus.emit(&navigate(Screen::Home));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let (bus, _) = bus();
        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..4 {
            let order = Arc::clone(&order);
            let _ = bus.on(AgentEventKind::NavigateScreen, move |_| {
                order.lock().unwrap().push(n);
                Ok(())
            });
        }
        bus.emit(&navigate(Screen::Chat));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let (bus, _) = bus();
        let (count, listener) = counter();
        let sub = bus.on(AgentEventKind::BrainDumpAdd, listener);

        sub.unsubscribe();
        bus.emit(&AgentEvent::BrainDumpAdd { text: "hello".into() });

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(bus.listener_count(AgentEventKind::BrainDumpAdd), 0);
    }

    #[test]
    fn failing_listener_does_not_block_siblings() {
        let (bus, log) = bus();
        let _bad = bus.on(AgentEventKind::NavigateScreen, |_| Err("boom".into()));
        let (good_count, good) = counter();
        let _good = bus.on(AgentEventKind::NavigateScreen, good);

        bus.emit(&navigate(Screen::Home));

        assert_eq!(good_count.load(Ordering::SeqCst), 1);
        let records = log.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].service, "AgentEventBus");
        assert_eq!(records[0].message, "Error in listener for 'navigate:screen'");
        assert_eq!(records[0].error.as_deref(), Some("boom"));
    }

    #[test]
    fn panicking_listener_is_contained() {
        let (bus, log) = bus();
        let _bad = bus.on(AgentEventKind::FogCutterCreate, |_| panic!("listener exploded"));
        let (count, good) = counter();
        let _good = bus.on(AgentEventKind::FogCutterCreate, good);

        bus.emit(&AgentEvent::FogCutterCreate {
            task_title: "taxes".into(),
        });

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(log.records()[0].error.as_deref(), Some("listener exploded"));
    }

    #[test]
    fn release_profile_keeps_unwinding() {
        // Listener panics are only contained when the binary unwinds.
        let manifest: toml::Value = toml::from_str(include_str!("../../../Cargo.toml")).unwrap();
        let panic = manifest
            .get("profile")
            .and_then(|p| p.get("release"))
            .and_then(|r| r.get("panic"))
            .and_then(toml::Value::as_str);
        assert_ne!(panic, Some("abort"));
    }

    #[test]
    fn listener_may_emit_reentrantly() {
        let (bus, _) = bus();
        let (nav_count, nav) = counter();
        let _nav = bus.on(AgentEventKind::NavigateScreen, nav);

        let inner = bus.clone();
        let _start = bus.on(AgentEventKind::TimerStart, move |event| {
            if let AgentEvent::TimerStart { timer_type } = event {
                inner.emit(&navigate(timer_type.screen()));
            }
            Ok(())
        });

        bus.emit(&AgentEvent::TimerStart {
            timer_type: TimerType::Ignite,
        });
        assert_eq!(nav_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_during_dispatch_skips_pending_listener() {
        let (bus, _) = bus();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let s = Arc::clone(&slot);
        let _first = bus.on(AgentEventKind::NavigateScreen, move |_| {
            if let Some(sub) = s.lock().unwrap().take() {
                sub.unsubscribe();
            }
            Ok(())
        });
        let (count, second) = counter();
        *slot.lock().unwrap() = Some(bus.on(AgentEventKind::NavigateScreen, second));

        bus.emit(&navigate(Screen::Home));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn remove_all_listeners_by_kind_and_globally() {
        let (bus, _) = bus();
        for kind in AgentEventKind::ALL {
            let _ = bus.on(kind, |_| Ok(()));
        }
        bus.remove_all_listeners(Some(AgentEventKind::TimerStart));
        assert_eq!(bus.listener_count(AgentEventKind::TimerStart), 0);
        assert_eq!(bus.listener_count(AgentEventKind::NavigateScreen), 1);

        bus.remove_all_listeners(None);
        for kind in AgentEventKind::ALL {
            assert_eq!(bus.listener_count(kind), 0);
        }
    }

    #[test]
    fn events_serialize_with_kind_tag() {
        let json = serde_json::to_value(AgentEvent::FogCutterCreate {
            task_title: "Clean garage".into(),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "fogcutter:create", "taskTitle": "Clean garage"})
        );
        let event: AgentEvent =
            serde_json::from_str(r#"{"type":"timer:start","timerType":"anchor"}"#).unwrap();
        assert_eq!(event.kind().as_str(), "timer:start");
    }

    #[test]
    fn screen_parses_case_insensitively() {
        assert_eq!("braindump".parse::<Screen>().unwrap(), Screen::BrainDump);
        assert!("Settings".parse::<Screen>().is_err());
    }
}
