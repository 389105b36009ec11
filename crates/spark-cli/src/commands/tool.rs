use std::sync::{Arc, Mutex};

use clap::Subcommand;
use serde_json::{json, Value};
use spark_core::log::tracing_log;
use spark_core::timer::PhasePlan;
use spark_core::{AgentEventBus, AgentRouter, AgentTools, Config, Database, SystemClock};

use super::{open_timer, print_json};

#[derive(Subcommand)]
pub enum ToolAction {
    /// List the tools available to agents
    List,
    /// Call a tool the way an agent would
    Call {
        /// Tool name (see `tool list`)
        name: String,
        /// Arguments as a JSON object
        #[arg(long)]
        args: Option<String>,
    },
}

pub fn run(action: ToolAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ToolAction::List => print_json(&AgentTools::<SystemClock>::definitions())?,
        ToolAction::Call { name, args } => {
            let args: Value = match args {
                Some(raw) => serde_json::from_str(&raw)?,
                None => Value::Null,
            };

            let config = Config::load_or_default();
            let timer = Arc::new(Mutex::new(open_timer(&config)?));
            let bus = AgentEventBus::new(tracing_log());
            let router = AgentRouter::attach(&bus, Arc::clone(&timer), PhasePlan::from_config(&config.timer), None);
            let tools = AgentTools::new(bus, Box::new(Database::open()?), SystemClock);

            let result = tools.call(&name, args)?;
            print_json(&json!({ "result": result, "view": router.view() }))?;
        }
    }
    Ok(())
}
