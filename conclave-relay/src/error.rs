#![forbid(unsafe_code)]

use conclave_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<redb::DatabaseError> for RelayError {
    fn from(e: redb::DatabaseError) -> Self {
        RelayError::Database(e.to_string())
    }
}

impl From<redb::TransactionError> for RelayError {
    fn from(e: redb::TransactionError) -> Self {
        RelayError::Database(e.to_string())
    }
}

impl From<redb::TableError> for RelayError {
    fn from(e: redb::TableError) -> Self {
        RelayError::Database(e.to_string())
    }
}

impl From<redb::StorageError> for RelayError {
    fn from(e: redb::StorageError) -> Self {
        RelayError::Database(e.to_string())
    }
}

impl From<redb::CommitError> for RelayError {
    fn from(e: redb::CommitError) -> Self {
        RelayError::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

/// A per-event rejection, reported in the OK frame with its stable prefix.
/// The connection stays open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reject {
    /// Malformed event: bad signature, missing tag, bad size, bad refs.
    Invalid(String),
    /// Authorization failure: not an admin, no capability, not a member.
    Restricted(String),
    /// Relay policy rejection, e.g. an unsupported kind.
    Blocked(String),
    /// AUTH not yet completed.
    AuthRequired(String),
    /// Capability-model failure; the message already carries its prefix.
    Capability(String),
}

impl Reject {
    /// The OK-frame message, prefix included.
    pub fn message(&self) -> String {
        match self {
            Reject::Invalid(reason) => format!("invalid: {reason}"),
            Reject::Restricted(reason) => format!("restricted: {reason}"),
            Reject::Blocked(reason) => format!("blocked: {reason}"),
            Reject::AuthRequired(reason) => format!("auth-required: {reason}"),
            Reject::Capability(message) => message.clone(),
        }
    }

    pub(crate) fn capability(err: CoreError) -> Self {
        Reject::Capability(err.to_string())
    }
}
