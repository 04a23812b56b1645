//! Inactivity sweep.
//!
//! One pass over every participant:
//!
//! 1. snapshot `now`, load participants and the ignore set
//! 2. skip ignored participants
//! 3. for each participant idle longer than the timeout: increment the
//!    warning count (only if the store still shows them overdue), notify the
//!    report chat, then move `last_active_at` to `now`
//!
//! Step 3 throttles repeat warnings to one per timeout window. Sweeps never
//! overlap. Failures are isolated per participant and recorded in the
//! [`SweepReport`].

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ActivityEngine;
use crate::store::{ParticipantId, ParticipantRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepStage {
    Snapshot,
    Increment,
    Notify,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    pub participant_id: Option<ParticipantId>,
    pub stage: SweepStage,
    pub message: String,
}

/// One overdue participant that was escalated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Escalation {
    pub participant_id: ParticipantId,
    pub display: String,
    pub elapsed_minutes: i64,
    pub warning_count: u32,
    /// Whether the report-chat notification went out.
    pub delivered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub at: DateTime<Utc>,
    pub timeout_minutes: i64,
    pub checked: usize,
    pub ignored_skipped: usize,
    pub escalated: Vec<Escalation>,
    pub failures: Vec<SweepFailure>,
    /// The snapshot could not be read; nothing was processed.
    pub aborted: bool,
}

impl SweepReport {
    fn empty(at: DateTime<Utc>, timeout_minutes: i64) -> Self {
        Self {
            at,
            timeout_minutes,
            checked: 0,
            ignored_skipped: 0,
            escalated: Vec::new(),
            failures: Vec::new(),
            aborted: false,
        }
    }

    /// Summary for an admin who triggered the sweep by hand.
    pub fn render(&self) -> String {
        if self.aborted {
            return "Sweep failed: activity data is unavailable. It will be retried on the next tick."
                .to_string();
        }
        let mut out = format!(
            "Sweep done: {} checked, {} ignored, {} overdue (timeout {} min).",
            self.checked,
            self.ignored_skipped,
            self.escalated.len(),
            self.timeout_minutes
        );
        for e in &self.escalated {
            let _ = write!(
                out,
                "\n• {} (ID {}): {} min, warning #{}",
                e.display, e.participant_id, e.elapsed_minutes, e.warning_count
            );
            if !e.delivered {
                out.push_str(" [not delivered]");
            }
        }
        if !self.failures.is_empty() {
            let _ = write!(out, "\n{} error(s), see logs.", self.failures.len());
        }
        out
    }
}

/// `1st`, `2nd`, `3rd`, `11th`, `22nd`, ...
pub(crate) fn ordinal(n: u32) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

/// Text posted to the report chat for one escalation.
pub(crate) fn warning_text(record: &ParticipantRecord, elapsed_minutes: i64, warning_count: u32) -> String {
    let mut text = format!(
        "⚠️ User {} (ID {}) has not sent a photo for {} min",
        record.display(),
        record.id,
        elapsed_minutes
    );
    if warning_count > 1 {
        let _ = write!(text, " ({} warning)", ordinal(warning_count));
    }
    text
}

impl ActivityEngine {
    /// Run one inactivity sweep.
    ///
    /// Never returns an error: every failure is logged and recorded in the
    /// report so the scheduler can keep going. Overlapping calls run one
    /// after the other, each with its own snapshot.
    pub async fn sweep(&self) -> SweepReport {
        let _running = self.sweep_lock.lock().await;
        let now = self.now();
        let config = self.config();
        let timeout = config.timeout();
        let mut report = SweepReport::empty(now, config.timeout_minutes());

        let snapshot = self
            .store()
            .list_participants()
            .and_then(|participants| Ok((participants, self.store().list_ignored()?)));
        let (participants, ignored) = match snapshot {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "sweep snapshot failed; skipping this tick");
                report.aborted = true;
                report.failures.push(SweepFailure {
                    participant_id: None,
                    stage: SweepStage::Snapshot,
                    message: e.to_string(),
                });
                return report;
            }
        };

        for record in participants {
            if ignored.contains(&record.id) {
                report.ignored_skipped += 1;
                continue;
            }
            report.checked += 1;

            let elapsed = now - record.last_active_at;
            if elapsed <= timeout {
                continue;
            }
            let overdue_before = now - timeout;
            if let Some(escalation) = self
                .escalate(&record, now, overdue_before, elapsed.num_minutes(), &mut report)
                .await
            {
                report.escalated.push(escalation);
            }
        }

        tracing::info!(
            checked = report.checked,
            ignored = report.ignored_skipped,
            escalated = report.escalated.len(),
            failures = report.failures.len(),
            "sweep complete"
        );
        report
    }

    async fn escalate(
        &self,
        record: &ParticipantRecord,
        now: DateTime<Utc>,
        overdue_before: DateTime<Utc>,
        elapsed_minutes: i64,
        report: &mut SweepReport,
    ) -> Option<Escalation> {
        let id = record.id;
        let warning_count = match self.store().increment_warning(id, overdue_before) {
            Ok(Some(count)) => count,
            Ok(None) => {
                tracing::debug!(participant = id, "participant active or gone since snapshot");
                return None;
            }
            Err(e) => {
                tracing::warn!(participant = id, error = %e, "failed to increment warning");
                report.failures.push(SweepFailure {
                    participant_id: Some(id),
                    stage: SweepStage::Increment,
                    message: e.to_string(),
                });
                return None;
            }
        };

        let text = warning_text(record, elapsed_minutes, warning_count);
        let delivered = match self.sink().send(self.report_chat(), &text).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(participant = id, error = %e, "warning notification not delivered");
                report.failures.push(SweepFailure {
                    participant_id: Some(id),
                    stage: SweepStage::Notify,
                    message: e.to_string(),
                });
                false
            }
        };

        if let Err(e) = self.store().refresh_last_active(id, now) {
            tracing::warn!(participant = id, error = %e, "failed to refresh last activity after warning");
            report.failures.push(SweepFailure {
                participant_id: Some(id),
                stage: SweepStage::Refresh,
                message: e.to_string(),
            });
        }

        tracing::info!(participant = id, elapsed_minutes, warning_count, delivered, "participant overdue");
        Some(Escalation {
            participant_id: id,
            display: record.display(),
            elapsed_minutes,
            warning_count,
            delivered,
        })
    }
}
