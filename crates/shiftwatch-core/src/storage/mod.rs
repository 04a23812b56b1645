mod config;
pub mod database;
pub mod migrations;

pub use config::{Channels, ChatsConfig, Config, EngineConfig, MonitorConfig, ShiftsConfig, TelegramConfig};
pub use database::ActivityDb;

use std::path::PathBuf;

/// Returns `~/.config/shiftwatch[-dev]/` based on SHIFTWATCH_ENV.
///
/// Set SHIFTWATCH_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("SHIFTWATCH_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("shiftwatch-dev")
    } else {
        base_dir.join("shiftwatch")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
