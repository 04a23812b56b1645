//! Core error types for shiftwatch-core.
//!
//! Every failure the engine can observe maps onto one of the enums below.
//! Storage and notification errors are recoverable and are logged by the
//! engine; configuration errors are fatal at startup; validation and
//! authorization errors are reported back to the admin context.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for shiftwatch-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Malformed admin input
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Admin-only action from a non-admin context
    #[error("Authorization error: {0}")]
    Authorization(#[from] AuthorizationError),

    /// Outbound delivery failure
    #[error("Notification error: {0}")]
    Notification(#[from] NotificationError),

    /// Report could not be produced
    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// The connection mutex was poisoned by a panicking writer
    #[error("Database connection poisoned")]
    Poisoned,

    /// A stored value could not be decoded
    #[error("Corrupt value in column '{column}': {message}")]
    Corrupt { column: String, message: String },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Missing required configuration key
    #[error("Missing required configuration key: {0}")]
    MissingKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Validation errors for admin input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Participant id was not an integer
    #[error("'{0}' is not a numeric user id")]
    InvalidParticipantId(String),

    /// Timeout minutes was not a positive integer
    #[error("'{0}' is not a positive number of minutes")]
    InvalidMinutes(String),

    /// Report date spec did not match `YYYY-MM-DD <shift>`
    #[error("'{input}' is not a valid report spec: {message}")]
    InvalidDateSpec { input: String, message: String },

    /// Report date spec named a shift that is not configured
    #[error("'{shift}' is not a configured shift (known: {known})")]
    UnknownShift { shift: String, known: String },
}

/// Authorization errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    /// Admin-only action from another chat
    #[error("chat {chat_id} is not the admin chat")]
    NotAdmin { chat_id: i64 },
}

/// Notification delivery errors.
#[derive(Error, Debug)]
pub enum NotificationError {
    /// Transport could not be reached
    #[error("Delivery to {destination} failed: {message}")]
    DeliveryFailed { destination: i64, message: String },

    /// Transport answered with an error status
    #[error("Transport rejected message for {destination} (HTTP {status}): {body}")]
    Rejected {
        destination: i64,
        status: u16,
        body: String,
    },

    /// Sink is not configured (no bot token)
    #[error("Notification sink not configured: {0}")]
    NotConfigured(String),

    /// Polling the transport for inbound updates failed
    #[error("Polling for updates failed: {0}")]
    PollFailed(String),
}

/// Report errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    /// Current wall-clock time is outside every configured shift
    #[error("No active shift at {local_time}")]
    NoActiveShift { local_time: String },

    /// Date-addressed reports need activity history that is not stored
    #[error("Historical report for {date} {shift} is not available")]
    HistoricalUnsupported { date: String, shift: String },

    /// Underlying store failed while building the report
    #[error("Report unavailable: {0}")]
    StoreUnavailable(String),

    /// The request itself was malformed
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseLocked
                    || e.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    StorageError::Locked
                } else {
                    StorageError::QueryFailed(err.to_string())
                }
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Storage(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
