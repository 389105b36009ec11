//! Tools exposed to external AI agents.
//!
//! Each tool validates its JSON arguments, does any storage work it needs,
//! and announces the outcome on the [`AgentEventBus`]. Tools never touch
//! navigation or the timer directly; whoever listens on the bus does.

use chrono::{Local, TimeZone, Timelike};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::clock::{Clock, SystemClock};
use crate::error::{Result, ToolError};
use crate::events::{AgentEvent, AgentEventBus, Screen, TimerType};
use crate::storage::KvStore;

/// Storage key of the brain-dump list.
pub const BRAIN_DUMP_KEY: &str = "brainDump";
/// Storage key of the check-in list.
pub const CHECK_INS_KEY: &str = "checkIns";
/// Upper bound for `read_check_ins`.
pub const MAX_CHECK_INS: usize = 7;

/// Description of one tool, as advertised to agents.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// A captured brain-dump item. Unknown fields written by other clients are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrainDumpEntry {
    pub id: String,
    pub text: String,
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartTimerArgs {
    timer_type: TimerType,
}

#[derive(Deserialize)]
struct NavigateArgs {
    screen: Screen,
}

#[derive(Deserialize)]
struct BrainDumpArgs {
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FogCutterArgs {
    task_title: String,
}

#[derive(Deserialize)]
struct ReadCheckInsArgs {
    #[serde(default)]
    limit: Option<usize>,
}

pub struct AgentTools<C: Clock = SystemClock> {
    bus: AgentEventBus,
    kv: Box<dyn KvStore>,
    clock: C,
}

impl<C: Clock> AgentTools<C> {
    pub fn new(bus: AgentEventBus, kv: Box<dyn KvStore>, clock: C) -> Self {
        Self { bus, kv, clock }
    }

    pub fn definitions() -> Vec<ToolDefinition> {
        let screens: Vec<&str> = Screen::ALL.iter().map(|s| s.as_str()).collect();
        vec![
            ToolDefinition {
                name: "start_timer",
                description: "Navigates to and starts a specific focus or breathing timer.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "timerType": {
                            "type": "string",
                            "enum": ["pomodoro", "ignite", "anchor"],
                            "description": "The type of timer to start"
                        }
                    },
                    "required": ["timerType"]
                }),
            },
            ToolDefinition {
                name: "navigate_to_screen",
                description: "Navigates the app to the specified screen.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "screen": {
                            "type": "string",
                            "enum": screens,
                            "description": "The screen to navigate to"
                        }
                    },
                    "required": ["screen"]
                }),
            },
            ToolDefinition {
                name: "add_brain_dump",
                description: "Adds a new item to the user's brain dump list.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "text": { "type": "string", "description": "The text content to save" }
                    },
                    "required": ["text"]
                }),
            },
            ToolDefinition {
                name: "create_fog_cutter_task",
                description: "Seeds the Fog Cutter screen with a task title so the user can break it down.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "taskTitle": { "type": "string", "description": "The task title to break down" }
                    },
                    "required": ["taskTitle"]
                }),
            },
            ToolDefinition {
                name: "read_check_ins",
                description: "Returns the user's last N check-in entries (mood, energy, timestamp).",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "limit": { "type": "number", "description": "Number of check-ins to return (max 7)" }
                    }
                }),
            },
            ToolDefinition {
                name: "get_app_state",
                description: "Returns a lightweight snapshot of the app's current state (time of day, last check-in mood).",
                parameters: json!({ "type": "object", "properties": {} }),
            },
        ]
    }

    /// Run a tool by name.
    ///
    /// # Errors
    /// Returns an error for unknown tools and arguments that do not match the
    /// tool's parameters.
    pub fn call(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let args = if args.is_null() { json!({}) } else { args };
        match name {
            "start_timer" => {
                let StartTimerArgs { timer_type } = parse_args(name, args)?;
                self.bus.emit(&AgentEvent::TimerStart { timer_type });
                self.bus.emit(&AgentEvent::NavigateScreen {
                    screen: timer_type.screen(),
                });
                let label = serde_json::to_value(timer_type)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default();
                Ok(json!({ "success": true, "message": format!("{label} timer requested") }))
            }
            "navigate_to_screen" => {
                let NavigateArgs { screen } = parse_args(name, args)?;
                self.bus.emit(&AgentEvent::NavigateScreen { screen });
                Ok(json!({ "success": true, "screen": screen }))
            }
            "add_brain_dump" => {
                let BrainDumpArgs { text } = parse_args(name, args)?;
                if text.trim().is_empty() {
                    return Err(invalid(name, "text must not be empty"));
                }
                match self.add_brain_dump(&text) {
                    Ok(item) => {
                        self.bus.emit(&AgentEvent::BrainDumpAdd { text });
                        Ok(json!({ "success": true, "item": item }))
                    }
                    Err(e) => Ok(json!({ "success": false, "error": e.to_string() })),
                }
            }
            "create_fog_cutter_task" => {
                let FogCutterArgs { task_title } = parse_args(name, args)?;
                if task_title.trim().is_empty() {
                    return Err(invalid(name, "taskTitle must not be empty"));
                }
                self.bus.emit(&AgentEvent::FogCutterCreate {
                    task_title: task_title.clone(),
                });
                self.bus.emit(&AgentEvent::NavigateScreen {
                    screen: Screen::FogCutter,
                });
                Ok(json!({ "success": true, "taskTitle": task_title }))
            }
            "read_check_ins" => {
                let ReadCheckInsArgs { limit } = parse_args(name, args)?;
                let limit = limit.unwrap_or(MAX_CHECK_INS).min(MAX_CHECK_INS);
                match self.read_list(CHECK_INS_KEY) {
                    Ok(entries) => {
                        let entries: Vec<Value> = entries.into_iter().take(limit).collect();
                        Ok(json!({ "success": true, "entries": entries }))
                    }
                    Err(e) => {
                        tracing::warn!("read_check_ins failed: {e}");
                        Ok(json!({ "success": false, "entries": [] }))
                    }
                }
            }
            "get_app_state" => {
                let time_of_day = Local
                    .timestamp_millis_opt(self.clock.now_ms())
                    .single()
                    .map_or("morning", |t| time_of_day(t.hour()));
                let last_check_in = self
                    .read_list(CHECK_INS_KEY)
                    .ok()
                    .and_then(|entries| entries.into_iter().next())
                    .unwrap_or(Value::Null);
                Ok(json!({ "success": true, "timeOfDay": time_of_day, "lastCheckIn": last_check_in }))
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    /// Brain-dump items, newest first.
    ///
    /// # Errors
    /// Returns an error if storage cannot be read.
    pub fn brain_dump(&self) -> Result<Vec<BrainDumpEntry>> {
        Ok(self
            .read_list(BRAIN_DUMP_KEY)?
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect())
    }

    fn add_brain_dump(&self, text: &str) -> Result<BrainDumpEntry> {
        let mut items = self.read_list(BRAIN_DUMP_KEY)?;
        let now = self.clock.now_ms();
        let item = BrainDumpEntry {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.to_string(),
            timestamp: now,
            kind: "text".into(),
            extra: Map::new(),
        };
        items.insert(0, serde_json::to_value(&item)?);
        self.kv.set(BRAIN_DUMP_KEY, &serde_json::to_string(&items)?)?;
        Ok(item)
    }

    /// A stored JSON array, or empty if missing or unreadable.
    fn read_list(&self, key: &str) -> Result<Vec<Value>> {
        let Some(raw) = self.kv.get(key)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(items)) => Ok(items),
            _ => {
                tracing::warn!(key, "ignoring malformed list in storage");
                Ok(Vec::new())
            }
        }
    }
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| invalid(tool, e.to_string()))
}

fn invalid(tool: &str, message: impl Into<String>) -> ToolError {
    ToolError::InvalidArguments {
        tool: tool.to_string(),
        message: message.into(),
    }
}

/// Bucket an hour of the day.
pub fn time_of_day(hour: u32) -> &'static str {
    match hour {
        0..=11 => "morning",
        12..=16 => "afternoon",
        _ => "evening",
    }
}
