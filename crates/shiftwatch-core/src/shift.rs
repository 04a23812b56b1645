//! Shift windows for activity reports.
//!
//! A shift is a daily half-open interval `[start_hour, end_hour)` in a single
//! fixed UTC offset. A window whose end is not after its start wraps past
//! midnight (`23-07` is a night shift). `end_hour = 24` means midnight.
//!
//! ```text
//! 00    07          15          23 24
//! |-----|--morning--|--evening--|--|
//! ```

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One configured shift window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftWindow {
    pub start_hour: u8,
    pub end_hour: u8,
    pub label: String,
}

impl ShiftWindow {
    pub fn new(start_hour: u8, end_hour: u8, label: impl Into<String>) -> Self {
        Self {
            start_hour,
            end_hour,
            label: label.into(),
        }
    }

    fn wraps(&self) -> bool {
        self.end_hour <= self.start_hour
    }

    /// Whether the local wall-clock hour falls inside this window.
    pub fn contains_hour(&self, hour: u8) -> bool {
        if self.wraps() {
            hour >= self.start_hour || hour < self.end_hour
        } else {
            hour >= self.start_hour && hour < self.end_hour
        }
    }

    /// Window length in hours.
    pub fn len_hours(&self) -> u8 {
        if self.wraps() {
            24 - self.start_hour + self.end_hour
        } else {
            self.end_hour - self.start_hour
        }
    }
}

/// A concrete occurrence of a shift window on a calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftOccurrence {
    pub label: String,
    /// Local calendar date the shift started on.
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ShiftOccurrence {
    /// Half-open containment: `start <= at < end`.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// Ordered, non-overlapping set of shift windows in one fixed offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftSchedule {
    windows: Vec<ShiftWindow>,
    offset: FixedOffset,
}

impl Default for ShiftSchedule {
    fn default() -> Self {
        Self {
            windows: default_windows(),
            offset: utc_offset(),
        }
    }
}

pub fn default_windows() -> Vec<ShiftWindow> {
    vec![
        ShiftWindow::new(7, 15, "morning"),
        ShiftWindow::new(15, 23, "evening"),
    ]
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

impl ShiftSchedule {
    /// Build a schedule, rejecting malformed or overlapping windows.
    pub fn new(windows: Vec<ShiftWindow>, offset: FixedOffset) -> Result<Self, ConfigError> {
        let mut covered = [None::<usize>; 24];
        for (idx, window) in windows.iter().enumerate() {
            if window.label.trim().is_empty() {
                return Err(ConfigError::invalid("shifts", "shift label must not be empty"));
            }
            if window.start_hour > 23 || window.end_hour > 24 {
                return Err(ConfigError::invalid(
                    "shifts",
                    format!(
                        "shift '{}' has hours out of range ({}-{})",
                        window.label, window.start_hour, window.end_hour
                    ),
                ));
            }
            if window.start_hour == window.end_hour {
                return Err(ConfigError::invalid(
                    "shifts",
                    format!("shift '{}' is empty", window.label),
                ));
            }
            if windows[..idx].iter().any(|w| w.label == window.label) {
                return Err(ConfigError::invalid(
                    "shifts",
                    format!("duplicate shift label '{}'", window.label),
                ));
            }
            for hour in 0..24u8 {
                if !window.contains_hour(hour) {
                    continue;
                }
                if let Some(other) = covered[hour as usize] {
                    return Err(ConfigError::invalid(
                        "shifts",
                        format!(
                            "shifts '{}' and '{}' overlap at {hour:02}:00",
                            windows[other].label, window.label
                        ),
                    ));
                }
                covered[hour as usize] = Some(idx);
            }
        }
        Ok(Self { windows, offset })
    }

    pub fn windows(&self) -> &[ShiftWindow] {
        &self.windows
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn window(&self, label: &str) -> Option<&ShiftWindow> {
        self.windows.iter().find(|w| w.label.eq_ignore_ascii_case(label))
    }

    /// Local wall-clock rendering of `at`, used in reply texts.
    pub fn local_time(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.offset).format("%Y-%m-%d %H:%M").to_string()
    }

    /// The shift occurrence containing `now`, if any.
    pub fn occurrence_at(&self, now: DateTime<Utc>) -> Option<ShiftOccurrence> {
        let local = now.with_timezone(&self.offset);
        let hour = local.hour() as u8;
        let window = self.windows.iter().find(|w| w.contains_hour(hour))?;

        let today = local.date_naive();
        let start_date = if window.wraps() && hour < window.end_hour {
            today.pred_opt()?
        } else {
            today
        };
        self.occurrence_on(window, start_date)
    }

    /// The occurrence of `window` that starts on local date `date`.
    pub fn occurrence_on(&self, window: &ShiftWindow, date: NaiveDate) -> Option<ShiftOccurrence> {
        let start = date
            .and_hms_opt(window.start_hour as u32, 0, 0)?
            .and_local_timezone(self.offset)
            .single()?;
        let end = start + Duration::hours(window.len_hours() as i64);
        Some(ShiftOccurrence {
            label: window.label.clone(),
            date,
            start: start.with_timezone(&Utc),
            end: end.with_timezone(&Utc),
        })
    }
}

/// Parse `07-15:morning,15-23:evening` into windows.
pub fn parse_windows(raw: &str) -> Result<Vec<ShiftWindow>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (hours, label) = part.split_once(':').ok_or_else(|| {
                ConfigError::invalid("shifts", format!("'{part}' must look like 07-15:label"))
            })?;
            let (start, end) = hours.split_once('-').ok_or_else(|| {
                ConfigError::invalid("shifts", format!("'{hours}' must look like 07-15"))
            })?;
            let parse_hour = |s: &str| {
                s.trim().parse::<u8>().map_err(|_| {
                    ConfigError::invalid("shifts", format!("'{s}' is not an hour"))
                })
            };
            Ok(ShiftWindow::new(
                parse_hour(start)?,
                parse_hour(end)?,
                label.trim(),
            ))
        })
        .collect()
}

/// Parse `Z`, `UTC`, `+03`, `+03:00`, `-0530` into a fixed offset.
pub fn parse_offset(raw: &str) -> Result<FixedOffset, ConfigError> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return Ok(utc_offset());
    }
    let invalid = || ConfigError::invalid("timezone_offset", format!("'{raw}' is not an offset like +03:00"));

    let (sign, rest) = match raw.as_bytes().first() {
        Some(b'+') => (1, &raw[1..]),
        Some(b'-') => (-1, &raw[1..]),
        _ => return Err(invalid()),
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let (hours, minutes) = match digits.len() {
        1 | 2 => (digits.parse::<i32>().map_err(|_| invalid())?, 0),
        4 => (
            digits[..2].parse::<i32>().map_err(|_| invalid())?,
            digits[2..].parse::<i32>().map_err(|_| invalid())?,
        ),
        _ => return Err(invalid()),
    };
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}
