//! Admin command layer.
//!
//! Turns text typed in the admin chat into engine calls and reply text.
//! A command that needs an argument but got none starts an
//! [`AdminSessions`] dialog; the next free-text message completes it. Any
//! direct command abandons a pending dialog first.

use std::sync::Arc;

use crate::engine::{ActivityEngine, DateSpec, IgnoreOutcome};
use crate::error::{AuthorizationError, ReportError, ValidationError};
use crate::session::{AdminSessions, SessionKind};
use crate::store::ParticipantId;

pub const HELP_TEXT: &str = "Commands:
/status - minutes since each user's last photo
/report - activity in the current shift
/report YYYY-MM-DD <shift> - report for a specific shift
/history - ask for a date and shift, then report
/ignore <user_id> - stop monitoring a user
/unignore <user_id> - resume monitoring a user
/ignored - show the ignore list
/timeout [minutes] - show or change the inactivity timeout
/sweep - run the inactivity check now
/reset confirm - delete all activity data and the ignore list
/cancel - abandon the current dialog
/help - this message";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Ignore(Option<String>),
    Unignore(Option<String>),
    Ignored,
    Status,
    Report(Option<String>),
    History,
    Reset(Option<String>),
    Sweep,
    Timeout(Option<String>),
    Help,
    Cancel,
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminInput {
    Command(AdminCommand),
    FreeText(String),
}

impl AdminInput {
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let Some(body) = text.strip_prefix('/') else {
            return AdminInput::FreeText(text.to_string());
        };

        let (head, rest) = match body.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (body, ""),
        };
        // `/status@my_bot` in group chats.
        let name = head.split('@').next().unwrap_or(head).to_lowercase();
        let arg = (!rest.is_empty()).then(|| rest.to_string());

        let command = match name.as_str() {
            "ignore" => AdminCommand::Ignore(arg),
            "unignore" => AdminCommand::Unignore(arg),
            "ignored" | "ignorelist" => AdminCommand::Ignored,
            "status" => AdminCommand::Status,
            "report" => AdminCommand::Report(arg),
            "history" => AdminCommand::History,
            "reset" => AdminCommand::Reset(arg),
            "sweep" | "check" => AdminCommand::Sweep,
            "timeout" => AdminCommand::Timeout(arg),
            "help" | "start" => AdminCommand::Help,
            "cancel" => AdminCommand::Cancel,
            _ => AdminCommand::Unknown(name),
        };
        AdminInput::Command(command)
    }
}

pub fn parse_participant_id(raw: &str) -> Result<ParticipantId, ValidationError> {
    let raw = raw.trim();
    raw.parse::<ParticipantId>()
        .map_err(|_| ValidationError::InvalidParticipantId(raw.to_string()))
}

pub fn parse_minutes(raw: &str) -> Result<i64, ValidationError> {
    let raw = raw.trim();
    match raw.parse::<i64>() {
        Ok(m) if m > 0 => Ok(m),
        _ => Err(ValidationError::InvalidMinutes(raw.to_string())),
    }
}

/// Entry point for everything typed in the admin chat.
pub struct AdminDesk {
    engine: Arc<ActivityEngine>,
    sessions: Arc<AdminSessions>,
    admin_chat: i64,
}

impl AdminDesk {
    pub fn new(engine: Arc<ActivityEngine>, sessions: Arc<AdminSessions>, admin_chat: i64) -> Self {
        Self {
            engine,
            sessions,
            admin_chat,
        }
    }

    pub fn sessions(&self) -> &AdminSessions {
        &self.sessions
    }

    pub fn authorize(&self, chat_id: i64) -> Result<(), AuthorizationError> {
        if chat_id == self.admin_chat {
            Ok(())
        } else {
            Err(AuthorizationError::NotAdmin { chat_id })
        }
    }

    /// Handle one admin message. Returns the reply, if any.
    ///
    /// Messages from other chats are denied silently and logged.
    pub async fn handle(&self, chat_id: i64, text: &str) -> Option<String> {
        if let Err(e) = self.authorize(chat_id) {
            tracing::warn!(chat_id, error = %e, "admin action denied");
            return None;
        }

        match AdminInput::parse(text) {
            AdminInput::Command(command) => {
                let abandoned = self.sessions.cancel(chat_id);
                if let Some(kind) = abandoned {
                    tracing::debug!(chat_id, ?kind, "pending admin session abandoned");
                }
                Some(self.execute(chat_id, command, abandoned).await)
            }
            AdminInput::FreeText(input) => {
                let kind = self.sessions.take(chat_id, self.engine.now())?;
                Some(self.complete(kind, &input))
            }
        }
    }

    async fn execute(
        &self,
        chat_id: i64,
        command: AdminCommand,
        abandoned: Option<SessionKind>,
    ) -> String {
        match command {
            AdminCommand::Ignore(Some(arg)) => self.complete(SessionKind::IgnoreTarget, &arg),
            AdminCommand::Ignore(None) => self.prompt(chat_id, SessionKind::IgnoreTarget),
            AdminCommand::Unignore(Some(arg)) => self.complete(SessionKind::UnignoreTarget, &arg),
            AdminCommand::Unignore(None) => self.prompt(chat_id, SessionKind::UnignoreTarget),
            AdminCommand::Ignored => self.ignored_text(),
            AdminCommand::Status => match self.engine.status() {
                Ok(status) => status.render(),
                Err(e) => {
                    tracing::warn!(error = %e, "status unavailable");
                    STORE_UNAVAILABLE.to_string()
                }
            },
            AdminCommand::Report(None) => report_text(self.engine.shift_report()),
            AdminCommand::Report(Some(spec)) => self.complete(SessionKind::ReportDateSpec, &spec),
            AdminCommand::History => self.prompt(chat_id, SessionKind::ReportDateSpec),
            AdminCommand::Reset(Some(arg)) if arg.eq_ignore_ascii_case("confirm") => {
                match self.engine.reset_all() {
                    Ok(()) => "All activity data and the ignore list were deleted.".to_string(),
                    Err(e) => {
                        tracing::warn!(error = %e, "reset failed");
                        STORE_UNAVAILABLE.to_string()
                    }
                }
            }
            AdminCommand::Reset(_) => {
                "This deletes all activity data and the ignore list. Send /reset confirm to proceed."
                    .to_string()
            }
            AdminCommand::Sweep => self.engine.sweep().await.render(),
            AdminCommand::Timeout(Some(arg)) => self.complete(SessionKind::TimeoutMinutes, &arg),
            AdminCommand::Timeout(None) => format!(
                "Current inactivity timeout: {} min. {}",
                self.engine.config().timeout_minutes(),
                self.prompt(chat_id, SessionKind::TimeoutMinutes)
            ),
            AdminCommand::Help => HELP_TEXT.to_string(),
            AdminCommand::Cancel => match abandoned {
                Some(_) => "Cancelled.".to_string(),
                None => "Nothing to cancel.".to_string(),
            },
            AdminCommand::Unknown(name) => format!("Unknown command /{name}.\n\n{HELP_TEXT}"),
        }
    }

    fn prompt(&self, chat_id: i64, kind: SessionKind) -> String {
        self.sessions.start(chat_id, kind, self.engine.now());
        kind.prompt().to_string()
    }

    /// Perform the action for `kind` with `input`. Always terminal: a
    /// validation failure answers with a corrective message and the admin
    /// starts over.
    fn complete(&self, kind: SessionKind, input: &str) -> String {
        match kind {
            SessionKind::IgnoreTarget => match parse_participant_id(input) {
                Ok(id) => match self.engine.ignore(id) {
                    Ok(IgnoreOutcome::Added) => format!("User {id} added to the ignore list."),
                    Ok(_) => format!("User {id} is already on the ignore list."),
                    Err(e) => {
                        tracing::warn!(participant = id, error = %e, "ignore failed");
                        STORE_UNAVAILABLE.to_string()
                    }
                },
                Err(e) => format!("{e}. Send /ignore <user_id> to try again."),
            },
            SessionKind::UnignoreTarget => match parse_participant_id(input) {
                Ok(id) => match self.engine.unignore(id) {
                    Ok(IgnoreOutcome::Removed) => format!("User {id} removed from the ignore list."),
                    Ok(_) => format!("User {id} was not on the ignore list."),
                    Err(e) => {
                        tracing::warn!(participant = id, error = %e, "unignore failed");
                        STORE_UNAVAILABLE.to_string()
                    }
                },
                Err(e) => format!("{e}. Send /unignore <user_id> to try again."),
            },
            SessionKind::ReportDateSpec => match input.parse::<DateSpec>() {
                Ok(spec) => report_text(self.engine.historical_report(&spec)),
                Err(e) => format!("{e}. Send /history to try again."),
            },
            SessionKind::TimeoutMinutes => match parse_minutes(input) {
                Ok(minutes) => match self.engine.set_timeout(minutes) {
                    Ok(cfg) => format!("Inactivity timeout set to {} min.", cfg.timeout_minutes()),
                    Err(e) => {
                        tracing::warn!(minutes, error = %e, "timeout update failed");
                        format!("Could not update the timeout: {e}")
                    }
                },
                Err(e) => format!("{e}. Send /timeout <minutes> to try again."),
            },
        }
    }

    fn ignored_text(&self) -> String {
        match self.engine.ignored() {
            Ok(ids) if ids.is_empty() => "The ignore list is empty.".to_string(),
            Ok(ids) => {
                let mut out = String::from("Ignored users:");
                for id in ids {
                    out.push_str(&format!("\n• {id}"));
                }
                out
            }
            Err(e) => {
                tracing::warn!(error = %e, "ignore list unavailable");
                STORE_UNAVAILABLE.to_string()
            }
        }
    }
}

const STORE_UNAVAILABLE: &str = "Activity data is unavailable right now. Please try again later.";

fn report_text(result: Result<crate::engine::ShiftReport, ReportError>) -> String {
    match result {
        Ok(report) => report.render(),
        Err(ReportError::NoActiveShift { local_time }) => {
            format!("No active shift right now ({local_time}).")
        }
        Err(e @ ReportError::HistoricalUnsupported { .. }) => {
            format!("{e}: only the current shift can be reported.")
        }
        Err(ReportError::StoreUnavailable(_)) => STORE_UNAVAILABLE.to_string(),
        Err(ReportError::Invalid(e)) => format!("{e}. Send /history to try again."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::*;
    use chrono::{Duration, TimeZone, Utc};

    const ADMIN: i64 = -100;

    fn desk(h: Harness) -> (AdminDesk, Harness) {
        let sessions = Arc::new(AdminSessions::new(Duration::minutes(5)));
        let desk = AdminDesk::new(h.engine.clone(), sessions, ADMIN);
        (desk, h)
    }

    #[test]
    fn parses_commands_and_free_text() {
        assert_eq!(
            AdminInput::parse("/ignore 42"),
            AdminInput::Command(AdminCommand::Ignore(Some("42".into())))
        );
        assert_eq!(
            AdminInput::parse("/status@shift_bot"),
            AdminInput::Command(AdminCommand::Status)
        );
        assert_eq!(
            AdminInput::parse("  /REPORT 2024-05-01 morning "),
            AdminInput::Command(AdminCommand::Report(Some("2024-05-01 morning".into())))
        );
        assert_eq!(AdminInput::parse("42"), AdminInput::FreeText("42".into()));
        assert_eq!(
            AdminInput::parse("/what"),
            AdminInput::Command(AdminCommand::Unknown("what".into()))
        );
    }

    #[test]
    fn parses_ids_and_minutes() {
        assert_eq!(parse_participant_id(" 123 ").unwrap(), 123);
        assert!(parse_participant_id("abc").is_err());
        assert_eq!(parse_minutes("30").unwrap(), 30);
        assert!(parse_minutes("0").is_err());
        assert!(parse_minutes("-5").is_err());
    }

    #[tokio::test]
    async fn non_admin_chat_is_denied_silently() {
        let (desk, h) = desk(harness(45));
        assert!(desk.handle(12345, "/ignore 7").await.is_none());
        assert!(h.db_ignored().is_empty());
    }

    #[tokio::test]
    async fn ignore_with_argument_is_immediate() {
        let (desk, h) = desk(harness(45));
        let reply = desk.handle(ADMIN, "/ignore 7").await.unwrap();
        assert_eq!(reply, "User 7 added to the ignore list.");
        let reply = desk.handle(ADMIN, "/ignore 7").await.unwrap();
        assert_eq!(reply, "User 7 is already on the ignore list.");
        assert_eq!(h.db_ignored(), vec![7]);
    }

    #[tokio::test]
    async fn ignore_dialog_consumes_follow_up() {
        let (desk, h) = desk(harness(45));
        let prompt = desk.handle(ADMIN, "/ignore").await.unwrap();
        assert_eq!(prompt, SessionKind::IgnoreTarget.prompt());

        let reply = desk.handle(ADMIN, "15").await.unwrap();
        assert_eq!(reply, "User 15 added to the ignore list.");
        assert_eq!(h.db_ignored(), vec![15]);

        // Session is gone: plain text no longer does anything.
        assert!(desk.handle(ADMIN, "16").await.is_none());
    }

    #[tokio::test]
    async fn invalid_follow_up_clears_session() {
        let (desk, h) = desk(harness(45));
        desk.handle(ADMIN, "/unignore").await.unwrap();
        let reply = desk.handle(ADMIN, "bob").await.unwrap();
        assert!(reply.starts_with("'bob' is not a numeric user id"));
        assert!(desk.sessions().is_empty());
        assert!(h.db_ignored().is_empty());
    }

    #[tokio::test]
    async fn direct_command_abandons_pending_session() {
        let (desk, h) = desk(harness(45));
        desk.handle(ADMIN, "/ignore").await.unwrap();

        let status = desk.handle(ADMIN, "/status").await.unwrap();
        assert_eq!(status, "No participant data yet.");

        assert!(desk.handle(ADMIN, "77").await.is_none());
        assert!(h.db_ignored().is_empty());
    }

    #[tokio::test]
    async fn cancel_reports_whether_anything_was_pending() {
        let (desk, _h) = desk(harness(45));
        assert_eq!(desk.handle(ADMIN, "/cancel").await.unwrap(), "Nothing to cancel.");
        desk.handle(ADMIN, "/history").await.unwrap();
        assert_eq!(desk.handle(ADMIN, "/cancel").await.unwrap(), "Cancelled.");
    }

    #[tokio::test]
    async fn timeout_dialog_updates_engine() {
        let (desk, h) = desk(harness(45));
        let prompt = desk.handle(ADMIN, "/timeout").await.unwrap();
        assert!(prompt.starts_with("Current inactivity timeout: 45 min."));
        let reply = desk.handle(ADMIN, "30").await.unwrap();
        assert_eq!(reply, "Inactivity timeout set to 30 min.");
        assert_eq!(desk.engine.config().timeout_minutes(), 30);
        // The desk shares the harness engine, so sweeps see the change.
        assert_eq!(h.engine.config().timeout_minutes(), 30);

        let reply = desk.handle(ADMIN, "/timeout 0").await.unwrap();
        assert!(reply.contains("not a positive number of minutes"));
        assert_eq!(desk.engine.config().timeout_minutes(), 30);
    }

    #[tokio::test]
    async fn report_outside_shift_says_so() {
        let (desk, h) = desk(harness(45));
        h.clock.set(Utc.with_ymd_and_hms(2024, 4, 2, 2, 0, 0).unwrap());
        let reply = desk.handle(ADMIN, "/report").await.unwrap();
        assert_eq!(reply, "No active shift right now (2024-04-02 02:00).");
    }

    #[tokio::test]
    async fn history_dialog_validates_grammar() {
        let (desk, _h) = desk(harness(45));
        desk.handle(ADMIN, "/history").await.unwrap();
        let reply = desk.handle(ADMIN, "last tuesday").await.unwrap();
        assert!(reply.contains("not a valid report spec"));

        let reply = desk.handle(ADMIN, "/report 2024-01-01 evening").await.unwrap();
        assert!(reply.contains("only the current shift can be reported"));

        let reply = desk.handle(ADMIN, "/report 2024-01-01 night").await.unwrap();
        assert_eq!(
            reply,
            "'night' is not a configured shift (known: morning, evening). Send /history to try again."
        );
    }

    #[tokio::test]
    async fn reset_requires_confirmation() {
        let (desk, h) = desk(harness(45));
        h.engine.on_activity_signal(1, None, t0());
        h.engine.ignore(2).unwrap();

        let reply = desk.handle(ADMIN, "/reset").await.unwrap();
        assert!(reply.contains("/reset confirm"));
        assert_eq!(h.db_ignored(), vec![2]);

        desk.handle(ADMIN, "/reset confirm").await.unwrap();
        assert!(h.db_ignored().is_empty());
        assert!(h.engine.status().unwrap().entries.is_empty());
    }

    #[tokio::test]
    async fn manual_sweep_uses_sweep_report() {
        let (desk, h) = desk(harness(45));
        h.engine.on_activity_signal(1, Some("alice"), t0());
        h.clock.advance(Duration::minutes(50));
        let reply = desk.handle(ADMIN, "/sweep").await.unwrap();
        assert!(reply.starts_with("Sweep done: 1 checked, 0 ignored, 1 overdue"));
        assert_eq!(h.sink.sent_to(REPORT_CHAT).len(), 1);
    }

    impl Harness {
        fn db_ignored(&self) -> Vec<i64> {
            use crate::store::ActivityStore;
            self.db.list_ignored().unwrap().into_iter().collect()
        }
    }
}
