use std::path::Path;

use clap::Subcommand;
use serde_json::json;
use shiftwatch_core::commands::parse_minutes;
use shiftwatch_core::Config;

use super::{open_engine, print_json, CliResult};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration (bot token redacted)
    Show,
    /// Print the config file path
    Path,
    /// Validate the configuration as the daemon would
    Check,
}

pub fn run(action: ConfigAction, config: &Config, path: Option<&Path>) -> CliResult {
    match action {
        ConfigAction::Show => {
            let mut shown = config.clone();
            if shown.telegram.bot_token.is_some() {
                shown.telegram.bot_token = Some("<redacted>".into());
            }
            print_json(&shown)
        }
        ConfigAction::Path => {
            let path = match path {
                Some(path) => path.to_path_buf(),
                None => Config::default_path()?,
            };
            println!("{}", path.display());
            Ok(())
        }
        ConfigAction::Check => {
            let engine = config.engine_config()?;
            let channels = config.channels()?;
            config.bot_token()?;
            print_json(&json!({
                "ok": true,
                "timeout_minutes": engine.timeout_minutes(),
                "check_interval_ms": engine.sweep_interval().as_millis() as u64,
                "shifts": engine.shifts().windows(),
                "admin_chat_id": channels.admin,
                "source_chat_id": channels.source,
                "report_chat_id": channels.report,
            }))
        }
    }
}

/// Show or change the persisted inactivity timeout.
pub fn timeout(config: &Config, minutes: Option<&str>) -> CliResult {
    let engine = open_engine(config)?;
    let current = match minutes {
        Some(raw) => engine.set_timeout(parse_minutes(raw)?)?,
        None => engine.config(),
    };
    print_json(&json!({ "timeout_minutes": current.timeout_minutes() }))
}
