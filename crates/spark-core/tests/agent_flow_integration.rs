//! Integration tests for the agent flow.
//!
//! Covers a tool call travelling through the event bus into the router and
//! the shared countdown, the tokio tick driving it, and state surviving a
//! reopen of the SQLite store.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use spark_core::log::{RecordingErrorLog, SharedErrorLog};
use spark_core::notify::NoopNotifier;
use spark_core::timer::TIMER_STORAGE_KEY;
use spark_core::{
    AgentEventBus, AgentRouter, AgentTools, Database, KvStore, ManualClock, NotificationGateway, PhasePlan, Screen,
    TickCoordinator, Ticker, TimerMode, TimerService, TokioScheduler,
};

const T0: i64 = 1_700_000_000_000;

fn timer_at(path: &std::path::Path, clock: &ManualClock, log: &SharedErrorLog) -> TimerService<ManualClock> {
    let gateway = NotificationGateway::new(Box::new(NoopNotifier), Arc::clone(log));
    TimerService::load(
        clock.clone(),
        Box::new(Database::open_at(path).unwrap()),
        gateway,
        Arc::clone(log),
    )
}

#[test]
fn test_start_timer_tool_starts_shared_countdown() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spark.db");
    let recorded = RecordingErrorLog::new();
    let log: SharedErrorLog = Arc::new(recorded.clone());
    let clock = ManualClock::new(T0);

    let bus = AgentEventBus::new(Arc::clone(&log));
    let timer = Arc::new(Mutex::new(timer_at(&path, &clock, &log)));
    let router = AgentRouter::attach(&bus, Arc::clone(&timer), PhasePlan::default(), None);
    let tools = AgentTools::new(bus.clone(), Box::new(Database::open_at(&path).unwrap()), clock.clone());

    let out = tools.call("start_timer", json!({"timerType": "pomodoro"})).unwrap();
    assert_eq!(out["success"], true);
    assert_eq!(router.view().current_screen, Screen::Pomodoro);

    {
        let mut timer = timer.lock().unwrap();
        assert!(timer.is_running());
        assert_eq!(timer.state().remaining_seconds, 25 * 60);
        clock.advance(90_000);
        assert!(timer.tick());
        assert_eq!(timer.state().formatted_remaining(), "23:30");
    }

    // A second process sees the same countdown.
    let reopened = timer_at(&path, &clock, &log);
    assert_eq!(reopened.state().active_mode, Some(TimerMode::Pomodoro));
    assert_eq!(reopened.state().remaining_seconds, 23 * 60 + 30);
    assert!(reopened.is_running());
    assert!(recorded.is_empty());
}

#[test]
fn test_brain_dump_tool_persists_and_notifies_router() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spark.db");
    let log: SharedErrorLog = Arc::new(RecordingErrorLog::new());
    let clock = ManualClock::new(T0);

    let bus = AgentEventBus::new(Arc::clone(&log));
    let timer = Arc::new(Mutex::new(timer_at(&path, &clock, &log)));
    let router = AgentRouter::attach(&bus, timer, PhasePlan::default(), None);
    let tools = AgentTools::new(bus, Box::new(Database::open_at(&path).unwrap()), clock);

    tools.call("add_brain_dump", json!({"text": "renew passport"})).unwrap();
    tools
        .call("create_fog_cutter_task", json!({"taskTitle": "Plan the move"}))
        .unwrap();

    let view = router.view();
    assert_eq!(view.inbox, vec!["renew passport".to_string()]);
    assert_eq!(view.fog_cutter_seed.as_deref(), Some("Plan the move"));
    assert_eq!(view.current_screen, Screen::FogCutter);

    let raw = Database::open_at(&path).unwrap().get("brainDump").unwrap().unwrap();
    let stored: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(stored[0]["text"], "renew passport");
    assert_eq!(stored[0]["type"], "text");
}

#[tokio::test(start_paused = true)]
async fn test_coordinator_drives_agent_started_timer() {
    let log: SharedErrorLog = Arc::new(RecordingErrorLog::new());
    let clock = ManualClock::new(T0);
    let gateway = NotificationGateway::new(Box::new(NoopNotifier), Arc::clone(&log));
    let kv = spark_core::MemoryKv::new();
    let timer = Arc::new(Mutex::new(TimerService::load(
        clock.clone(),
        Box::new(kv.clone()),
        gateway,
        Arc::clone(&log),
    )));

    let coordinator = Arc::new(TickCoordinator::new(TokioScheduler::current(), Arc::clone(&timer), false));
    let bus = AgentEventBus::new(Arc::clone(&log));
    let _router = AgentRouter::attach(
        &bus,
        Arc::clone(&timer),
        PhasePlan::default(),
        Some(Arc::clone(&coordinator) as Arc<dyn Ticker>),
    );
    let tools = AgentTools::new(bus, Box::new(kv.clone()), clock.clone());

    tools.call("start_timer", json!({"timerType": "ignite"})).unwrap();
    assert!(coordinator.is_scheduled());

    clock.advance(3_000);
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(timer.lock().unwrap().state().remaining_seconds, 297);

    let saved: serde_json::Value = serde_json::from_str(&kv.get(TIMER_STORAGE_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(saved["remainingSeconds"], 297);

    coordinator.stop();
    assert!(!coordinator.is_scheduled());
}
