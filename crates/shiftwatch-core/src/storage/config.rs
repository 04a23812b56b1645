//! TOML-based process configuration.
//!
//! Settings come from three layers, later ones winning:
//! - built-in defaults
//! - `~/.config/shiftwatch/config.toml` (or an explicit path)
//! - environment variables (`BOT_TOKEN`, `ADMIN_CHAT_ID`, `SOURCE_CHAT_ID`,
//!   `REPORT_CHAT_ID`, `CHECK_INTERVAL`, `TIMEOUT_MINUTES`,
//!   `SHIFTWATCH_TZ_OFFSET`, `SHIFTWATCH_SHIFTS`, `SHIFTWATCH_DB`)
//!
//! The loaded [`Config`] is raw input. [`Config::engine_config`] and
//! [`Config::channels`] validate it into the immutable values the engine
//! runs with.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;
use crate::shift::{default_windows, parse_offset, parse_windows, ShiftSchedule, ShiftWindow};

/// Telegram Bot API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Long-poll timeout for `getUpdates`.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

/// The three chats the bot talks to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_chat_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_chat_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_chat_id: Option<i64>,
}

/// Sweep timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: i64,
    /// How long a pending admin dialog waits for its follow-up input.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

/// Shift windows and the offset they are expressed in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftsConfig {
    #[serde(default = "default_timezone_offset")]
    pub timezone_offset: String,
    #[serde(default = "default_windows")]
    pub windows: Vec<ShiftWindow>,
}

/// Raw process configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub chats: ChatsConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub shifts: ShiftsConfig,
    /// SQLite file; defaults to `shiftwatch.db` in the data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

fn default_api_base() -> String {
    "https://api.telegram.org".into()
}
fn default_poll_timeout_secs() -> u64 {
    30
}
fn default_check_interval_ms() -> u64 {
    10 * 60 * 1000
}
fn default_timeout_minutes() -> i64 {
    45
}
fn default_session_ttl_secs() -> u64 {
    5 * 60
}
fn default_timezone_offset() -> String {
    "+00:00".into()
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base: default_api_base(),
            poll_timeout_secs: default_poll_timeout_secs(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: default_check_interval_ms(),
            timeout_minutes: default_timeout_minutes(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

impl Default for ShiftsConfig {
    fn default() -> Self {
        Self {
            timezone_offset: default_timezone_offset(),
            windows: default_windows(),
        }
    }
}

/// Validated chat routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Channels {
    pub admin: i64,
    pub source: i64,
    pub report: i64,
}

/// Validated engine settings with durations computed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    timeout: Duration,
    sweep_interval: std::time::Duration,
    session_ttl: Duration,
    shifts: ShiftSchedule,
}

impl EngineConfig {
    pub fn new(
        timeout_minutes: i64,
        sweep_interval: std::time::Duration,
        shifts: ShiftSchedule,
    ) -> Result<Self, ConfigError> {
        if sweep_interval.is_zero() {
            return Err(ConfigError::invalid("check_interval_ms", "must be positive"));
        }
        Ok(Self {
            timeout: validate_timeout(timeout_minutes)?,
            sweep_interval,
            session_ttl: Duration::seconds(default_session_ttl_secs() as i64),
            shifts,
        })
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Copy with a new timeout. This is the only runtime mutation.
    pub fn with_timeout_minutes(&self, minutes: i64) -> Result<Self, ConfigError> {
        Ok(Self {
            timeout: validate_timeout(minutes)?,
            ..self.clone()
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn timeout_minutes(&self) -> i64 {
        self.timeout.num_minutes()
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        self.sweep_interval
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    pub fn shifts(&self) -> &ShiftSchedule {
        &self.shifts
    }
}

fn validate_timeout(minutes: i64) -> Result<Duration, ConfigError> {
    if minutes <= 0 {
        return Err(ConfigError::invalid(
            "timeout_minutes",
            format!("must be positive, got {minutes}"),
        ));
    }
    Duration::try_minutes(minutes)
        .ok_or_else(|| ConfigError::invalid("timeout_minutes", format!("{minutes} is too large")))
}

impl Config {
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        data_dir()
            .map(|dir| dir.join("config.toml"))
            .map_err(|e| ConfigError::LoadFailed {
                path: PathBuf::from("config.toml"),
                message: e.to_string(),
            })
    }

    /// Load from the default location, then apply process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = Self::load_from(&Self::default_path()?)?;
        cfg.apply_env(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    /// Load from `path`. A missing file yields defaults and writes them out
    /// so there is something to edit.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::LoadFailed {
                path: parent.to_path_buf(),
                message: e.to_string(),
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Overlay environment variables read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(token) = get("BOT_TOKEN") {
            self.telegram.bot_token = Some(token);
        }
        if let Some(v) = get("ADMIN_CHAT_ID") {
            self.chats.admin_chat_id = Some(parse_env("ADMIN_CHAT_ID", &v)?);
        }
        if let Some(v) = get("SOURCE_CHAT_ID") {
            self.chats.source_chat_id = Some(parse_env("SOURCE_CHAT_ID", &v)?);
        }
        if let Some(v) = get("REPORT_CHAT_ID") {
            self.chats.report_chat_id = Some(parse_env("REPORT_CHAT_ID", &v)?);
        }
        if let Some(v) = get("CHECK_INTERVAL") {
            self.monitor.check_interval_ms = parse_env("CHECK_INTERVAL", &v)?;
        }
        if let Some(v) = get("TIMEOUT_MINUTES") {
            self.monitor.timeout_minutes = parse_env("TIMEOUT_MINUTES", &v)?;
        }
        if let Some(v) = get("SHIFTWATCH_TZ_OFFSET") {
            self.shifts.timezone_offset = v;
        }
        if let Some(v) = get("SHIFTWATCH_SHIFTS") {
            self.shifts.windows = parse_windows(&v)?;
        }
        if let Some(v) = get("SHIFTWATCH_DB") {
            self.database_path = Some(PathBuf::from(v));
        }
        Ok(())
    }

    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let offset = parse_offset(&self.shifts.timezone_offset)?;
        let shifts = ShiftSchedule::new(self.shifts.windows.clone(), offset)?;
        let ttl = i64::try_from(self.monitor.session_ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| ConfigError::invalid("session_ttl_secs", "out of range"))?;
        Ok(EngineConfig::new(
            self.monitor.timeout_minutes,
            std::time::Duration::from_millis(self.monitor.check_interval_ms),
            shifts,
        )?
        .with_session_ttl(ttl))
    }

    pub fn channels(&self) -> Result<Channels, ConfigError> {
        Ok(Channels {
            admin: self
                .chats
                .admin_chat_id
                .ok_or_else(|| ConfigError::MissingKey("ADMIN_CHAT_ID".into()))?,
            source: self
                .chats
                .source_chat_id
                .ok_or_else(|| ConfigError::MissingKey("SOURCE_CHAT_ID".into()))?,
            report: self
                .chats
                .report_chat_id
                .ok_or_else(|| ConfigError::MissingKey("REPORT_CHAT_ID".into()))?,
        })
    }

    pub fn bot_token(&self) -> Result<&str, ConfigError> {
        self.telegram
            .bot_token
            .as_deref()
            .ok_or_else(|| ConfigError::MissingKey("BOT_TOKEN".into()))
    }

    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => data_dir()
                .map(|dir| dir.join("shiftwatch.db"))
                .map_err(|e| ConfigError::LoadFailed {
                    path: PathBuf::from("shiftwatch.db"),
                    message: e.to_string(),
                }),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse::<T>()
        .map_err(|_| ConfigError::invalid(key, format!("cannot parse '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.monitor.timeout_minutes, 45);
        assert_eq!(parsed.monitor.check_interval_ms, 600_000);
        assert_eq!(parsed.shifts.windows.len(), 2);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg = Config::default();
        cfg.apply_env(env(&[
            ("ADMIN_CHAT_ID", "-100"),
            ("SOURCE_CHAT_ID", "-200"),
            ("REPORT_CHAT_ID", "-300"),
            ("TIMEOUT_MINUTES", "30"),
            ("CHECK_INTERVAL", "60000"),
            ("SHIFTWATCH_SHIFTS", "08-20:day,20-08:night"),
        ]))
        .unwrap();

        let channels = cfg.channels().unwrap();
        assert_eq!(channels, Channels { admin: -100, source: -200, report: -300 });

        let engine = cfg.engine_config().unwrap();
        assert_eq!(engine.timeout_minutes(), 30);
        assert_eq!(engine.sweep_interval(), std::time::Duration::from_secs(60));
        assert_eq!(engine.shifts().windows()[1].label, "night");
    }

    #[test]
    fn missing_chat_is_fatal() {
        let mut cfg = Config::default();
        cfg.apply_env(env(&[("ADMIN_CHAT_ID", "1"), ("SOURCE_CHAT_ID", "2")]))
            .unwrap();
        let err = cfg.channels().unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(ref k) if k == "REPORT_CHAT_ID"));
    }

    #[test]
    fn non_numeric_env_is_rejected() {
        let mut cfg = Config::default();
        let err = cfg.apply_env(env(&[("ADMIN_CHAT_ID", "admins")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "ADMIN_CHAT_ID"));
    }

    #[test]
    fn non_positive_timeout_is_rejected_at_load() {
        let mut cfg = Config::default();
        cfg.monitor.timeout_minutes = 0;
        assert!(cfg.engine_config().is_err());
        cfg.monitor.timeout_minutes = -5;
        assert!(cfg.engine_config().is_err());
    }

    #[test]
    fn with_timeout_keeps_other_settings() {
        let engine = Config::default().engine_config().unwrap();
        let updated = engine.with_timeout_minutes(90).unwrap();
        assert_eq!(updated.timeout(), Duration::minutes(90));
        assert_eq!(updated.sweep_interval(), engine.sweep_interval());
        assert!(engine.with_timeout_minutes(0).is_err());
    }

    #[test]
    fn load_from_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.monitor.timeout_minutes, 45);
        assert!(path.exists());
    }

    #[test]
    fn load_from_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[chats]
admin_chat_id = 1
source_chat_id = 2
report_chat_id = 3

[monitor]
timeout_minutes = 60

[shifts]
timezone_offset = "+03:00"

[[shifts.windows]]
start_hour = 9
end_hour = 18
label = "office"
"#,
        )
        .unwrap();
        let cfg = Config::load_from(&path).unwrap();
        let engine = cfg.engine_config().unwrap();
        assert_eq!(engine.timeout_minutes(), 60);
        assert_eq!(engine.shifts().offset().local_minus_utc(), 3 * 3600);
        assert_eq!(engine.shifts().windows()[0].label, "office");
        assert_eq!(cfg.monitor.check_interval_ms, 600_000);
    }
}
