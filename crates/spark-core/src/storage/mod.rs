mod config;
pub mod database;
mod kv;

pub use config::{Config, NotificationsConfig, TickerConfig, TimerConfig};
pub use database::Database;
pub use kv::{KvStore, MemoryKv};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the Spark data directory, creating it if needed.
///
/// - `SPARK_DATA_DIR` overrides the location entirely.
/// - Otherwise `~/.config/spark`, or `~/.config/spark-dev` when `SPARK_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("SPARK_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("SPARK_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("spark-dev")
            } else {
                base_dir.join("spark")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
