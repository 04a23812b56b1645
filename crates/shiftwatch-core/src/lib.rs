//! # Shiftwatch Core Library
//!
//! This library provides the core logic for the shiftwatch inactivity
//! monitor. Participants prove they are active by posting photos to a
//! monitored chat; a periodic sweep warns a report chat about anyone who
//! has gone quiet for longer than the configured timeout.
//!
//! ## Architecture
//!
//! - **Engine**: Activity recording, the inactivity sweep with escalating
//!   and throttled warnings, the ignore list, and status/shift reports
//! - **Storage**: SQLite-backed activity store and TOML-based configuration
//! - **Sessions**: Short-lived admin dialogs awaiting a follow-up message
//! - **Integrations**: The Telegram transport
//!
//! ## Key Components
//!
//! - [`ActivityEngine`]: Policy between the transport and the store
//! - [`ActivityDb`]: SQLite implementation of [`ActivityStore`]
//! - [`SweepScheduler`]: Periodic sweep driver
//! - [`AdminDesk`]: Admin command and dialog handling
//! - [`Config`]: Application configuration management

pub mod clock;
pub mod commands;
pub mod engine;
pub mod error;
pub mod integrations;
pub mod notify;
pub mod scheduler;
pub mod session;
pub mod shift;
pub mod storage;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use commands::{AdminCommand, AdminDesk, AdminInput};
pub use engine::{
    ActivityEngine, DateSpec, IgnoreOutcome, ShiftReport, StatusReport, SweepReport,
};
pub use error::{
    AuthorizationError, ConfigError, CoreError, NotificationError, ReportError, StorageError,
    ValidationError,
};
pub use notify::{LogSink, NotificationSink, RecordingSink};
pub use scheduler::SweepScheduler;
pub use session::{AdminSessions, SessionKind};
pub use shift::{ShiftOccurrence, ShiftSchedule, ShiftWindow};
pub use storage::{ActivityDb, Channels, Config, EngineConfig};
pub use store::{ActivityStore, ParticipantId, ParticipantRecord};
