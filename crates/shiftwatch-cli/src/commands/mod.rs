pub mod config;
pub mod participants;
pub mod report;
pub mod run;

use std::path::Path;
use std::sync::Arc;

use shiftwatch_core::integrations::TelegramClient;
use shiftwatch_core::{
    ActivityDb, ActivityEngine, Config, LogSink, NotificationSink, SystemClock,
};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Config file plus environment overlay.
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load_from(&Config::default_path()?)?,
    };
    config.apply_env(|key| std::env::var(key).ok())?;
    Ok(config)
}

/// Engine over the configured database, with the persisted timeout applied.
///
/// Warnings go to Telegram when a bot token is configured and to the log
/// otherwise; the report chat falls back to 0 when unset.
pub fn open_engine(config: &Config) -> Result<ActivityEngine, Box<dyn std::error::Error>> {
    let db = ActivityDb::open_at(&config.database_path()?)?;
    let sink: Arc<dyn NotificationSink> = match config.telegram.bot_token.as_deref() {
        Some(token) => Arc::new(TelegramClient::new(&config.telegram.api_base, token)?),
        None => Arc::new(LogSink),
    };
    let engine = ActivityEngine::new(
        Arc::new(db),
        sink,
        Arc::new(SystemClock),
        config.engine_config()?,
        config.chats.report_chat_id.unwrap_or_default(),
    );
    engine.restore_settings();
    Ok(engine)
}

pub fn print_json<T: serde::Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
