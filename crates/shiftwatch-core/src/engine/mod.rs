//! Activity engine.
//!
//! Owns the policy that sits between the transport and the store:
//! recording photo activity, the periodic inactivity sweep, ignore-list
//! management, status and shift reports, and the runtime timeout.
//!
//! ## Usage
//!
//! ```ignore
//! let engine = ActivityEngine::new(store, sink, clock, config, report_chat);
//! engine.on_activity_signal(user_id, Some("alice"), now);
//! let report = engine.sweep().await; // normally driven by SweepScheduler
//! ```

mod report;
mod sweep;

pub use report::{DateSpec, ShiftEntry, ShiftReport, StatusEntry, StatusReport};
pub use sweep::{Escalation, SweepFailure, SweepReport, SweepStage};

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::Clock;
use crate::error::{CoreError, StorageError};
use crate::notify::NotificationSink;
use crate::storage::EngineConfig;
use crate::store::{ActivityStore, ParticipantId};

/// Settings-table key for the runtime timeout.
pub const TIMEOUT_SETTING_KEY: &str = "timeout_minutes";

/// Result of an ignore/unignore call. Both variants of each pair are success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreOutcome {
    Added,
    AlreadyIgnored,
    Removed,
    NotIgnored,
}

pub struct ActivityEngine {
    store: Arc<dyn ActivityStore>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    config: RwLock<EngineConfig>,
    report_chat: i64,
    /// Held for a whole sweep; a manual `/sweep` waits for a running tick.
    sweep_lock: tokio::sync::Mutex<()>,
}

impl ActivityEngine {
    pub fn new(
        store: Arc<dyn ActivityStore>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
        report_chat: i64,
    ) -> Self {
        Self {
            store,
            sink,
            clock,
            config: RwLock::new(config),
            report_chat,
            sweep_lock: tokio::sync::Mutex::new(()),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Snapshot of the current configuration.
    pub fn config(&self) -> EngineConfig {
        self.config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn report_chat(&self) -> i64 {
        self.report_chat
    }

    pub fn store(&self) -> &dyn ActivityStore {
        self.store.as_ref()
    }

    pub(crate) fn sink(&self) -> &dyn NotificationSink {
        self.sink.as_ref()
    }

    // ── Activity ─────────────────────────────────────────────────────

    /// Record a qualifying activity (photo) for `id`.
    ///
    /// Storage failures are logged and the signal is dropped; the return
    /// value tells the transport whether to acknowledge.
    pub fn on_activity_signal(
        &self,
        id: ParticipantId,
        display_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> bool {
        match self.store.record_activity(id, display_name, now) {
            Ok(()) => {
                tracing::debug!(participant = id, "activity recorded");
                true
            }
            Err(e) => {
                tracing::warn!(participant = id, error = %e, "failed to record activity; signal dropped");
                false
            }
        }
    }

    // ── Ignore list ──────────────────────────────────────────────────

    pub fn ignore(&self, id: ParticipantId) -> Result<IgnoreOutcome, StorageError> {
        let added = self.store.add_ignored(id)?;
        tracing::info!(participant = id, added, "ignore");
        Ok(if added {
            IgnoreOutcome::Added
        } else {
            IgnoreOutcome::AlreadyIgnored
        })
    }

    pub fn unignore(&self, id: ParticipantId) -> Result<IgnoreOutcome, StorageError> {
        let removed = self.store.remove_ignored(id)?;
        tracing::info!(participant = id, removed, "unignore");
        Ok(if removed {
            IgnoreOutcome::Removed
        } else {
            IgnoreOutcome::NotIgnored
        })
    }

    pub fn ignored(&self) -> Result<BTreeSet<ParticipantId>, StorageError> {
        self.store.list_ignored()
    }

    // ── Administration ───────────────────────────────────────────────

    /// Wipe all participants and ignore entries.
    pub fn reset_all(&self) -> Result<(), StorageError> {
        self.store.reset_all()?;
        tracing::warn!("all activity data reset");
        Ok(())
    }

    /// Replace the inactivity timeout and persist it.
    ///
    /// The value is validated before anything is written; on a storage
    /// failure the running configuration is left unchanged.
    pub fn set_timeout(&self, minutes: i64) -> Result<EngineConfig, CoreError> {
        let updated = self.config().with_timeout_minutes(minutes)?;
        self.store
            .save_setting(TIMEOUT_SETTING_KEY, &minutes.to_string())?;
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = updated.clone();
        tracing::info!(timeout_minutes = minutes, "inactivity timeout updated");
        Ok(updated)
    }

    /// Apply a timeout persisted by an earlier `set_timeout`.
    ///
    /// Invalid or unreadable values are logged and the configured timeout
    /// is kept.
    pub fn restore_settings(&self) {
        let stored = match self.store.load_setting(TIMEOUT_SETTING_KEY) {
            Ok(Some(v)) => v,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "could not read persisted settings");
                return;
            }
        };
        let parsed = stored
            .parse::<i64>()
            .map_err(|e| e.to_string())
            .and_then(|m| self.config().with_timeout_minutes(m).map_err(|e| e.to_string()));
        match parsed {
            Ok(cfg) => {
                tracing::info!(timeout_minutes = cfg.timeout_minutes(), "restored persisted timeout");
                *self.config.write().unwrap_or_else(|e| e.into_inner()) = cfg;
            }
            Err(e) => tracing::warn!(value = %stored, error = %e, "ignoring invalid persisted timeout"),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::clock::ManualClock;
    use crate::notify::RecordingSink;
    use crate::shift::ShiftSchedule;
    use crate::storage::ActivityDb;
    use chrono::TimeZone;

    pub const REPORT_CHAT: i64 = -500;

    pub struct Harness {
        pub engine: Arc<ActivityEngine>,
        pub db: Arc<ActivityDb>,
        pub sink: Arc<RecordingSink>,
        pub clock: Arc<ManualClock>,
    }

    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 2, 8, 0, 0).unwrap()
    }

    pub fn harness(timeout_minutes: i64) -> Harness {
        let db = Arc::new(ActivityDb::open_memory().unwrap());
        let sink = Arc::new(RecordingSink::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let config = EngineConfig::new(
            timeout_minutes,
            std::time::Duration::from_secs(600),
            ShiftSchedule::default(),
        )
        .unwrap();
        let engine = Arc::new(ActivityEngine::new(
            db.clone(),
            sink.clone(),
            clock.clone(),
            config,
            REPORT_CHAT,
        ));
        Harness {
            engine,
            db,
            sink,
            clock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use chrono::Duration;

    #[test]
    fn activity_resets_warning_count() {
        let h = harness(45);
        assert!(h.engine.on_activity_signal(1, Some("alice"), t0()));
        h.db.increment_warning(1, t0() + Duration::minutes(1)).unwrap();

        let later = t0() + Duration::minutes(3);
        assert!(h.engine.on_activity_signal(1, Some("alice"), later));
        let rec = &h.db.list_participants().unwrap()[0];
        assert_eq!(rec.warning_count, 0);
        assert_eq!(rec.last_active_at, later);
    }

    #[test]
    fn ignore_and_unignore_are_idempotent() {
        let h = harness(45);
        assert_eq!(h.engine.ignore(7).unwrap(), IgnoreOutcome::Added);
        assert_eq!(h.engine.ignore(7).unwrap(), IgnoreOutcome::AlreadyIgnored);
        assert_eq!(h.engine.ignored().unwrap().len(), 1);
        assert_eq!(h.engine.unignore(7).unwrap(), IgnoreOutcome::Removed);
        assert_eq!(h.engine.unignore(7).unwrap(), IgnoreOutcome::NotIgnored);
        assert!(h.engine.ignored().unwrap().is_empty());
    }

    #[test]
    fn ignoring_unknown_participant_is_allowed() {
        let h = harness(45);
        h.engine.ignore(99).unwrap();
        assert!(h.db.list_participants().unwrap().is_empty());
        assert!(h.engine.ignored().unwrap().contains(&99));
    }

    #[test]
    fn reset_all_empties_store() {
        let h = harness(45);
        h.engine.on_activity_signal(1, None, t0());
        h.engine.ignore(2).unwrap();
        h.engine.reset_all().unwrap();
        assert!(h.db.list_participants().unwrap().is_empty());
        assert!(h.engine.ignored().unwrap().is_empty());
    }

    #[test]
    fn set_timeout_validates_and_persists() {
        let h = harness(45);
        assert!(h.engine.set_timeout(0).is_err());
        assert_eq!(h.engine.config().timeout_minutes(), 45);

        h.engine.set_timeout(30).unwrap();
        assert_eq!(h.engine.config().timeout_minutes(), 30);
        assert_eq!(
            h.db.load_setting(TIMEOUT_SETTING_KEY).unwrap().as_deref(),
            Some("30")
        );
    }

    #[test]
    fn restore_settings_applies_valid_value_only() {
        let h = harness(45);
        h.db.save_setting(TIMEOUT_SETTING_KEY, "-3").unwrap();
        h.engine.restore_settings();
        assert_eq!(h.engine.config().timeout_minutes(), 45);

        h.db.save_setting(TIMEOUT_SETTING_KEY, "20").unwrap();
        h.engine.restore_settings();
        assert_eq!(h.engine.config().timeout_minutes(), 20);
    }
}
