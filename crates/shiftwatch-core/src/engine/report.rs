//! Read-only projections: status and shift reports.

use std::fmt::Write as _;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::ActivityEngine;
use crate::error::{ReportError, StorageError, ValidationError};
use crate::shift::ShiftOccurrence;
use crate::store::ParticipantId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    pub participant_id: ParticipantId,
    pub display: String,
    pub minutes_ago: i64,
    pub warning_count: u32,
    pub ignored: bool,
}

/// Every participant with time since their last photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub at: DateTime<Utc>,
    pub timeout_minutes: i64,
    pub entries: Vec<StatusEntry>,
}

impl StatusReport {
    pub fn render(&self) -> String {
        if self.entries.is_empty() {
            return "No participant data yet.".to_string();
        }
        let mut out = String::from("📝 Activity status:\n");
        for e in &self.entries {
            let _ = write!(
                out,
                "\n• ID {}{}: {} min ago",
                e.participant_id,
                handle_suffix(&e.display),
                e.minutes_ago
            );
            if e.warning_count > 0 {
                let _ = write!(out, ", warnings: {}", e.warning_count);
            }
            if e.ignored {
                out.push_str(" [ignored]");
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShiftEntry {
    pub participant_id: ParticipantId,
    pub display: String,
    /// Minutes since the last photo when it falls inside the current shift.
    pub active_minutes_ago: Option<i64>,
    pub warning_count: u32,
    pub ignored: bool,
}

/// Participants' activity within the current shift occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShiftReport {
    pub shift: ShiftOccurrence,
    pub generated_at: DateTime<Utc>,
    /// Shift bounds in the configured offset, for display.
    pub local_start: String,
    pub local_end: String,
    pub entries: Vec<ShiftEntry>,
}

impl ShiftReport {
    pub fn active_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.active_minutes_ago.is_some())
            .count()
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "📊 Shift report: {} ({} to {})\nActive: {}/{}\n",
            self.shift.label,
            self.local_start,
            self.local_end,
            self.active_count(),
            self.entries.len()
        );
        if self.entries.is_empty() {
            out.push_str("\nNo participant data yet.");
            return out;
        }
        for e in &self.entries {
            let _ = write!(out, "\n• ID {}{}: ", e.participant_id, handle_suffix(&e.display));
            match e.active_minutes_ago {
                Some(m) => {
                    let _ = write!(out, "active {m} min ago");
                }
                None => out.push_str("not active this shift"),
            }
            let _ = write!(out, ", warnings: {}", e.warning_count);
            if e.ignored {
                out.push_str(" [ignored]");
            }
        }
        out
    }
}

fn handle_suffix(display: &str) -> String {
    if display.starts_with('@') {
        format!(" ({display})")
    } else {
        String::new()
    }
}

/// `YYYY-MM-DD <shift>` as typed by an admin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateSpec {
    pub date: NaiveDate,
    pub shift: String,
}

impl FromStr for DateSpec {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |message: &str| ValidationError::InvalidDateSpec {
            input: s.trim().to_string(),
            message: message.to_string(),
        };
        let mut parts = s.split_whitespace();
        let (Some(date), Some(shift), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid("expected YYYY-MM-DD <shift>"));
        };
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|_| invalid("date must be YYYY-MM-DD"))?;
        Ok(Self {
            date,
            shift: shift.to_lowercase(),
        })
    }
}

impl ActivityEngine {
    /// Minutes since last activity for every participant.
    pub fn status(&self) -> Result<StatusReport, StorageError> {
        let now = self.now();
        let ignored = self.store().list_ignored()?;
        let mut participants = self.store().list_participants()?;
        participants.sort_by_key(|p| p.id);

        let entries = participants
            .into_iter()
            .map(|p| StatusEntry {
                participant_id: p.id,
                display: p.display(),
                minutes_ago: (now - p.last_active_at).num_minutes(),
                warning_count: p.warning_count,
                ignored: ignored.contains(&p.id),
            })
            .collect();
        Ok(StatusReport {
            at: now,
            timeout_minutes: self.config().timeout_minutes(),
            entries,
        })
    }

    /// Report for the shift occurrence containing "now".
    ///
    /// Rejects with [`ReportError::NoActiveShift`] outside every window.
    pub fn shift_report(&self) -> Result<ShiftReport, ReportError> {
        let now = self.now();
        let config = self.config();
        let shifts = config.shifts();
        let occurrence = shifts
            .occurrence_at(now)
            .ok_or_else(|| ReportError::NoActiveShift {
                local_time: shifts.local_time(now),
            })?;

        let unavailable = |e: StorageError| {
            tracing::warn!(error = %e, "shift report could not read the store");
            ReportError::StoreUnavailable(e.to_string())
        };
        let ignored = self.store().list_ignored().map_err(unavailable)?;
        let mut participants = self.store().list_participants().map_err(unavailable)?;
        participants.sort_by_key(|p| p.id);

        let entries = participants
            .into_iter()
            .map(|p| ShiftEntry {
                participant_id: p.id,
                display: p.display(),
                active_minutes_ago: occurrence
                    .contains(p.last_active_at)
                    .then(|| (now - p.last_active_at).num_minutes()),
                warning_count: p.warning_count,
                ignored: ignored.contains(&p.id),
            })
            .collect();

        Ok(ShiftReport {
            local_start: shifts.local_time(occurrence.start),
            local_end: shifts.local_time(occurrence.end),
            shift: occurrence,
            generated_at: now,
            entries,
        })
    }

    /// Date-addressed report.
    ///
    /// Only the latest activity per participant is stored, so past shifts
    /// cannot be reconstructed. The request is still checked against the
    /// configured shifts so the admin gets a precise answer.
    pub fn historical_report(&self, spec: &DateSpec) -> Result<ShiftReport, ReportError> {
        let config = self.config();
        let window = config.shifts().window(&spec.shift).ok_or_else(|| {
            let known: Vec<&str> = config.shifts().windows().iter().map(|w| w.label.as_str()).collect();
            ValidationError::UnknownShift {
                shift: spec.shift.clone(),
                known: known.join(", "),
            }
        })?;
        if let Some(current) = config.shifts().occurrence_at(self.now()) {
            if current.date == spec.date && current.label == window.label {
                return self.shift_report();
            }
        }
        Err(ReportError::HistoricalUnsupported {
            date: spec.date.to_string(),
            shift: window.label.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::store::ActivityStore;
    use chrono::{Duration, TimeZone};

    #[test]
    fn status_lists_everyone_sorted() {
        let h = harness(45);
        h.engine.on_activity_signal(2, None, t0());
        h.engine.on_activity_signal(1, Some("alice"), t0() + Duration::minutes(10));
        h.engine.ignore(2).unwrap();
        h.clock.set(t0() + Duration::minutes(30));

        let status = h.engine.status().unwrap();
        assert_eq!(status.entries.len(), 2);
        assert_eq!(status.entries[0].participant_id, 1);
        assert_eq!(status.entries[0].minutes_ago, 20);
        assert!(status.entries[1].ignored);

        let text = status.render();
        assert!(text.contains("• ID 1 (@alice): 20 min ago"));
        assert!(text.contains("• ID 2: 30 min ago [ignored]"));
    }

    #[test]
    fn status_empty_store() {
        let h = harness(45);
        assert_eq!(h.engine.status().unwrap().render(), "No participant data yet.");
    }

    #[test]
    fn shift_report_outside_windows_is_rejected() {
        let h = harness(45);
        h.clock.set(Utc.with_ymd_and_hms(2024, 4, 2, 2, 0, 0).unwrap());
        let err = h.engine.shift_report().unwrap_err();
        assert!(matches!(err, ReportError::NoActiveShift { .. }));
    }

    #[test]
    fn shift_report_marks_activity_inside_current_shift() {
        let h = harness(45);
        // Evening before: outside today's morning shift.
        h.engine
            .on_activity_signal(1, Some("night_owl"), Utc.with_ymd_and_hms(2024, 4, 1, 20, 0, 0).unwrap());
        // 07:00 exactly is inside [07:00, 15:00).
        h.engine
            .on_activity_signal(2, None, Utc.with_ymd_and_hms(2024, 4, 2, 7, 0, 0).unwrap());
        h.db.increment_warning(1, t0()).unwrap();
        h.clock.set(Utc.with_ymd_and_hms(2024, 4, 2, 9, 0, 0).unwrap());

        let report = h.engine.shift_report().unwrap();
        assert_eq!(report.shift.label, "morning");
        assert_eq!(report.entries[0].active_minutes_ago, None);
        assert_eq!(report.entries[0].warning_count, 1);
        assert_eq!(report.entries[1].active_minutes_ago, Some(120));
        assert_eq!(report.active_count(), 1);

        let text = report.render();
        assert!(text.contains("Shift report: morning (2024-04-02 07:00 to 2024-04-02 15:00)"));
        assert!(text.contains("ID 1 (@night_owl): not active this shift, warnings: 1"));
        assert!(text.contains("ID 2: active 120 min ago, warnings: 0"));
    }

    #[test]
    fn shift_report_is_read_only() {
        let h = harness(45);
        h.engine.on_activity_signal(1, None, t0());
        h.clock.set(t0() + Duration::hours(5));
        let before = h.db.list_participants().unwrap();
        let first = h.engine.shift_report().unwrap();
        let second = h.engine.shift_report().unwrap();
        assert_eq!(first, second);
        assert_eq!(h.db.list_participants().unwrap(), before);
    }

    #[test]
    fn date_spec_parsing() {
        let spec: DateSpec = "2024-05-01 Morning".parse().unwrap();
        assert_eq!(spec.date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(spec.shift, "morning");

        assert!("2024-13-01 morning".parse::<DateSpec>().is_err());
        assert!("2024-05-01".parse::<DateSpec>().is_err());
        assert!("yesterday morning".parse::<DateSpec>().is_err());
        assert!("2024-05-01 morning extra".parse::<DateSpec>().is_err());
    }

    #[test]
    fn historical_report_is_a_documented_gap() {
        let h = harness(45);
        let spec: DateSpec = "2024-03-01 evening".parse().unwrap();
        let err = h.engine.historical_report(&spec).unwrap_err();
        assert_eq!(
            err,
            ReportError::HistoricalUnsupported {
                date: "2024-03-01".into(),
                shift: "evening".into()
            }
        );

        let night: DateSpec = "2024-03-01 night".parse().unwrap();
        assert_eq!(
            h.engine.historical_report(&night).unwrap_err(),
            ReportError::Invalid(ValidationError::UnknownShift {
                shift: "night".into(),
                known: "morning, evening".into()
            })
        );

        // The current occurrence is answerable.
        let today: DateSpec = "2024-04-02 morning".parse().unwrap();
        assert!(h.engine.historical_report(&today).is_ok());
    }
}
