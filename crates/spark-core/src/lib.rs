//! # Spark Core Library
//!
//! This library provides the timing and agent-integration core of the Spark
//! focus app. Every operation is available through the standalone `spark`
//! CLI, which is a thin layer over the same core library.
//!
//! ## Architecture
//!
//! - **Timer**: A wall-clock countdown store, the single shared tick that drives
//!   it, and the phase plan applied when a phase runs out
//! - **Events**: A typed publish/subscribe bus carrying requests from AI agents
//! - **Tools**: The agent-facing tool surface that validates input and emits events
//! - **Storage**: SQLite key-value persistence and TOML-based configuration
//!
//! ## Key Components
//!
//! - [`TimerService`]: Countdown store wired to persistence and notifications
//! - [`TickCoordinator`]: Owner of the one recurring tick
//! - [`AgentEventBus`]: Event registry shared by producers and consumers
//! - [`AgentTools`]: Tool calls an agent may make
//! - [`Config`]: Application configuration management

pub mod clock;
pub mod error;
pub mod events;
pub mod log;
pub mod notify;
pub mod router;
pub mod storage;
pub mod timer;
pub mod tools;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, CoreError, DatabaseError, ToolError, ValidationError};
pub use events::{AgentEvent, AgentEventBus, AgentEventKind, Screen, Subscription, TimerType};
pub use notify::{LogNotifier, NotificationGateway, Notifier};
pub use router::{AgentRouter, ViewState};
pub use storage::{Config, Database, KvStore, MemoryKv};
pub use timer::{
    CountdownState, CountdownStore, PhasePlan, TickCoordinator, Ticker, TimerMode, TimerService, TokioScheduler,
};
pub use tools::{AgentTools, ToolDefinition};
