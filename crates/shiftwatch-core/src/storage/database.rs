//! SQLite-backed activity store.
//!
//! Provides persistent storage for:
//! - Participant activity (last photo time, warning count)
//! - The ignore list
//! - Runtime-settable settings (key/value)
//!
//! One connection is shared behind a mutex. Every mutation is a single
//! statement, except `reset_all` which runs in one transaction.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::data_dir;
use super::migrations;
use crate::error::StorageError;
use crate::store::{ActivityStore, ParticipantId, ParticipantRecord};

/// SQLite database for participant activity.
pub struct ActivityDb {
    conn: Mutex<Connection>,
}

impl ActivityDb {
    /// Open the database at `~/.config/shiftwatch/shiftwatch.db`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, StorageError> {
        let dir = data_dir().map_err(|e| StorageError::QueryFailed(e.to_string()))?;
        Self::open_at(&dir.join("shiftwatch.db"))
    }

    /// Open (or create) the database file at `path`.
    pub fn open_at(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::QueryFailed(e.to_string()))?;
        }
        let conn = Connection::open(path).map_err(|source| StorageError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        migrations::migrate(&conn).map_err(|e| StorageError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }
}

fn to_ms(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_ms(ms: i64) -> Result<DateTime<Utc>, StorageError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StorageError::Corrupt {
            column: "last_active_ms".into(),
            message: format!("{ms} is not a valid timestamp"),
        })
}

impl ActivityStore for ActivityDb {
    fn record_activity(
        &self,
        id: ParticipantId,
        display_name: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.conn()?.execute(
            "INSERT INTO participants (participant_id, display_name, last_active_ms, warning_count)
             VALUES (?1, ?2, ?3, 0)
             ON CONFLICT(participant_id) DO UPDATE SET
                display_name   = COALESCE(excluded.display_name, participants.display_name),
                last_active_ms = excluded.last_active_ms,
                warning_count  = 0",
            params![id, display_name, to_ms(at)],
        )?;
        Ok(())
    }

    fn list_participants(&self) -> Result<Vec<ParticipantRecord>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT participant_id, display_name, last_active_ms, warning_count
             FROM participants
             ORDER BY participant_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, u32>(3)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, display_name, last_ms, warning_count) = row?;
            records.push(ParticipantRecord {
                id,
                display_name,
                last_active_at: from_ms(last_ms)?,
                warning_count,
            });
        }
        Ok(records)
    }

    fn increment_warning(
        &self,
        id: ParticipantId,
        overdue_before: DateTime<Utc>,
    ) -> Result<Option<u32>, StorageError> {
        let count = self
            .conn()?
            .query_row(
                "UPDATE participants SET warning_count = warning_count + 1
                 WHERE participant_id = ?1 AND last_active_ms < ?2
                 RETURNING warning_count",
                params![id, to_ms(overdue_before)],
                |row| row.get::<_, u32>(0),
            )
            .optional()?;
        Ok(count)
    }

    fn refresh_last_active(
        &self,
        id: ParticipantId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.conn()?.execute(
            "UPDATE participants SET last_active_ms = MAX(last_active_ms, ?2)
             WHERE participant_id = ?1",
            params![id, to_ms(at)],
        )?;
        Ok(())
    }

    fn add_ignored(&self, id: ParticipantId) -> Result<bool, StorageError> {
        let inserted = self.conn()?.execute(
            "INSERT OR IGNORE INTO ignore_list (participant_id) VALUES (?1)",
            params![id],
        )?;
        Ok(inserted > 0)
    }

    fn remove_ignored(&self, id: ParticipantId) -> Result<bool, StorageError> {
        let deleted = self
            .conn()?
            .execute("DELETE FROM ignore_list WHERE participant_id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn list_ignored(&self) -> Result<BTreeSet<ParticipantId>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT participant_id FROM ignore_list")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(ids)
    }

    fn reset_all(&self) -> Result<(), StorageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM participants", [])?;
        tx.execute("DELETE FROM ignore_list", [])?;
        tx.commit()?;
        Ok(())
    }

    fn load_setting(&self, key: &str) -> Result<Option<String>, StorageError> {
        let value = self
            .conn()?
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn save_setting(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}
