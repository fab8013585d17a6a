//! Error types for gmail-mirror

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The server rejected the credentials. The only kind worth
    /// re-prompting for.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("{command} failed: {message}")]
    Protocol { command: String, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn protocol(command: impl Into<String>, message: impl ToString) -> Self {
        Self::Protocol {
            command: command.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn storage(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Storage(format!("{context}: {err}"))
    }

    /// Whether a caller should ask for new credentials and retry.
    #[must_use]
    pub const fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A failed sync run, tagged with where it stopped.
#[derive(Error, Debug)]
#[error("sync of '{mailbox}'{} failed: {error}", .uid.map(|u| format!(" at UID {u}")).unwrap_or_default())]
pub struct SyncError {
    pub mailbox: String,
    pub uid: Option<u32>,
    #[source]
    pub error: Error,
}

impl SyncError {
    pub(crate) fn new(mailbox: &str, uid: Option<u32>, error: Error) -> Self {
        Self {
            mailbox: mailbox.to_string(),
            uid,
            error,
        }
    }

    #[must_use]
    pub const fn is_authentication(&self) -> bool {
        self.error.is_authentication()
    }
}
