pub mod config;
pub mod timer;
pub mod tool;

use spark_core::log::tracing_log;
use spark_core::{Config, Database, LogNotifier, NotificationGateway, TimerService};

/// Open the persisted countdown with the CLI's collaborators.
pub fn open_timer(config: &Config) -> Result<TimerService, Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let log = tracing_log();
    let gateway =
        NotificationGateway::new(Box::new(LogNotifier), log.clone()).with_enabled(config.notifications.enabled);
    Ok(TimerService::load(spark_core::SystemClock, Box::new(db), gateway, log))
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
