//! Admin dialog sessions.
//!
//! Some admin actions need a follow-up free-text message ("send me the user
//! id to ignore"). Each admin context holds at most one pending session.
//!
//! ## State Transitions
//!
//! ```text
//! Idle --start(kind)--> Awaiting(kind)
//! Awaiting(kind) --take (input arrives)--> Idle
//! Awaiting(kind) --cancel (direct command)--> Idle
//! Awaiting(kind) --expiry--> Idle
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// What the pending session is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    IgnoreTarget,
    UnignoreTarget,
    ReportDateSpec,
    TimeoutMinutes,
}

impl SessionKind {
    /// Prompt shown when the session starts.
    pub fn prompt(self) -> &'static str {
        match self {
            SessionKind::IgnoreTarget => "Send the user id to add to the ignore list.",
            SessionKind::UnignoreTarget => "Send the user id to remove from the ignore list.",
            SessionKind::ReportDateSpec => {
                "Send the report spec as YYYY-MM-DD <shift>, e.g. 2024-05-01 morning."
            }
            SessionKind::TimeoutMinutes => "Send the new inactivity timeout in minutes.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingSession {
    pub kind: SessionKind,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingSession {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Pending sessions keyed by admin context (chat id).
#[derive(Debug)]
pub struct AdminSessions {
    ttl: Duration,
    pending: Mutex<HashMap<i64, PendingSession>>,
}

impl AdminSessions {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<i64, PendingSession>> {
        // The map is never left half-updated, so a poisoned lock is still usable.
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start waiting for `kind`. Replaces any session already pending.
    pub fn start(&self, context: i64, kind: SessionKind, now: DateTime<Utc>) -> Option<SessionKind> {
        let session = PendingSession {
            kind,
            started_at: now,
            expires_at: now + self.ttl,
        };
        self.lock().insert(context, session).map(|prev| prev.kind)
    }

    /// Consume the pending session. Expired sessions are dropped and yield `None`.
    pub fn take(&self, context: i64, now: DateTime<Utc>) -> Option<SessionKind> {
        let session = self.lock().remove(&context)?;
        if session.is_expired(now) {
            tracing::debug!(context, kind = ?session.kind, "admin session expired");
            return None;
        }
        Some(session.kind)
    }

    /// Abandon the pending session without acting on it.
    pub fn cancel(&self, context: i64) -> Option<SessionKind> {
        self.lock().remove(&context).map(|s| s.kind)
    }

    pub fn pending(&self, context: i64, now: DateTime<Utc>) -> Option<PendingSession> {
        self.lock()
            .get(&context)
            .filter(|s| !s.is_expired(now))
            .cloned()
    }

    /// Drop every expired session, returning how many were removed.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut pending = self.lock();
        let before = pending.len();
        pending.retain(|_, s| !s.is_expired(now));
        before - pending.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn start_then_take_returns_kind_once() {
        let sessions = AdminSessions::new(Duration::minutes(5));
        sessions.start(1, SessionKind::IgnoreTarget, t0());
        assert_eq!(sessions.take(1, t0()), Some(SessionKind::IgnoreTarget));
        assert_eq!(sessions.take(1, t0()), None);
    }

    #[test]
    fn start_overwrites_previous_session() {
        let sessions = AdminSessions::new(Duration::minutes(5));
        sessions.start(1, SessionKind::IgnoreTarget, t0());
        let prev = sessions.start(1, SessionKind::UnignoreTarget, t0());
        assert_eq!(prev, Some(SessionKind::IgnoreTarget));
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions.take(1, t0()), Some(SessionKind::UnignoreTarget));
    }

    #[test]
    fn contexts_are_independent() {
        let sessions = AdminSessions::new(Duration::minutes(5));
        sessions.start(1, SessionKind::IgnoreTarget, t0());
        sessions.start(2, SessionKind::ReportDateSpec, t0());
        assert_eq!(sessions.cancel(1), Some(SessionKind::IgnoreTarget));
        assert_eq!(
            sessions.pending(2, t0()).map(|s| s.kind),
            Some(SessionKind::ReportDateSpec)
        );
    }

    #[test]
    fn expired_session_is_not_consumed_as_input() {
        let sessions = AdminSessions::new(Duration::minutes(5));
        sessions.start(1, SessionKind::IgnoreTarget, t0());
        let later = t0() + Duration::minutes(5);
        assert!(sessions.pending(1, later).is_none());
        assert_eq!(sessions.take(1, later), None);
        assert!(sessions.is_empty());
    }

    #[test]
    fn evict_expired_keeps_fresh_sessions() {
        let sessions = AdminSessions::new(Duration::minutes(5));
        sessions.start(1, SessionKind::IgnoreTarget, t0());
        sessions.start(2, SessionKind::IgnoreTarget, t0() + Duration::minutes(4));
        assert_eq!(sessions.evict_expired(t0() + Duration::minutes(6)), 1);
        assert!(sessions.pending(2, t0() + Duration::minutes(6)).is_some());
    }
}
