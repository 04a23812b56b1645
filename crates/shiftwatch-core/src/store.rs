//! Activity store contract.
//!
//! The engine only talks to storage through [`ActivityStore`]. Each method is
//! atomic on its own; there is no cross-record locking.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Participants are keyed by their numeric transport id.
pub type ParticipantId = i64;

/// One monitored participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub id: ParticipantId,
    /// Transport handle, kept for display only.
    pub display_name: Option<String>,
    pub last_active_at: DateTime<Utc>,
    /// Consecutive escalations since the last qualifying activity.
    pub warning_count: u32,
}

impl ParticipantRecord {
    /// `@handle` when known, otherwise `ID <id>`.
    pub fn display(&self) -> String {
        display_identity(self.id, self.display_name.as_deref())
    }
}

pub fn display_identity(id: ParticipantId, display_name: Option<&str>) -> String {
    match display_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("@{}", name.trim_start_matches('@')),
        None => format!("ID {id}"),
    }
}

pub trait ActivityStore: Send + Sync {
    /// Upsert the participant: set `last_active_at`, set the display name if
    /// given, reset `warning_count` to 0.
    fn record_activity(
        &self,
        id: ParticipantId,
        display_name: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// All participants, in no particular order.
    fn list_participants(&self) -> Result<Vec<ParticipantRecord>, StorageError>;

    /// Increment and return the warning count, but only while
    /// `last_active_at` is still before `overdue_before`. `None` when the
    /// participant no longer exists or is no longer overdue.
    fn increment_warning(
        &self,
        id: ParticipantId,
        overdue_before: DateTime<Utc>,
    ) -> Result<Option<u32>, StorageError>;

    /// Move `last_active_at` forward to `at`. Never moves it backwards and
    /// leaves the warning count alone.
    fn refresh_last_active(&self, id: ParticipantId, at: DateTime<Utc>)
        -> Result<(), StorageError>;

    fn add_ignored(&self, id: ParticipantId) -> Result<bool, StorageError>;

    fn remove_ignored(&self, id: ParticipantId) -> Result<bool, StorageError>;

    fn list_ignored(&self) -> Result<BTreeSet<ParticipantId>, StorageError>;

    /// Clear participants and ignore entries in one transaction.
    fn reset_all(&self) -> Result<(), StorageError>;

    fn load_setting(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn save_setting(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefers_handle() {
        assert_eq!(display_identity(7, Some("alice")), "@alice");
        assert_eq!(display_identity(7, Some("@alice")), "@alice");
        assert_eq!(display_identity(7, Some("  ")), "ID 7");
        assert_eq!(display_identity(7, None), "ID 7");
    }
}
