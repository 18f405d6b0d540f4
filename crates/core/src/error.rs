//! Crate-wide error type.
//!
//! Every public operation returns `Result<T, Error>`. Internal invariant
//! violations use `Error::Internal` rather than panicking so a single bad
//! item can't take down a worker thread.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("corrupted: {0}")]
    Corrupted(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("transient: {0}")]
    Transient(String),

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl Error {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transient(_) | Error::Timeout(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound(e.to_string()),
            rusqlite::Error::SqliteFailure(ref se, _)
                if se.code == rusqlite::ErrorCode::DatabaseBusy
                    || se.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                Error::Transient(e.to_string())
            }
            other => Error::Corrupted(other.to_string()),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(e.to_string()),
            std::io::ErrorKind::PermissionDenied => Error::PermissionDenied(PathBuf::new()),
            std::io::ErrorKind::TimedOut => Error::Timeout(e.to_string()),
            _ => Error::Transient(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Corrupted(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
