use std::path::PathBuf;

use thiserror::Error;

use crate::platform::WindowError;

/// Application error type
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Could not determine project directories")]
    NoProjectDirs,

    #[error("Invalid config {}: {reason}", .path.display())]
    Config { path: PathBuf, reason: String },

    #[error("Invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("Active window source: {0}")]
    Window(#[from] WindowError),

    #[error("Run of {expected} samples changed before it was folded ({deleted} still stored)")]
    StaleRun { expected: usize, deleted: usize },

    #[error("{unflushed} samples could not be persisted at shutdown")]
    Shutdown { unflushed: usize },
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;

/// Check if a rusqlite error is SQLITE_BUSY / SQLITE_LOCKED
pub fn is_busy(e: &rusqlite::Error) -> bool {
    use rusqlite::ffi::ErrorCode;

    matches!(e, rusqlite::Error::SqliteFailure(err, _)
        if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_mentions_path() {
        let err = AppError::Config {
            path: PathBuf::from("/tmp/config.toml"),
            reason: "max_buffer must be at least 1".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid config /tmp/config.toml: max_buffer must be at least 1"
        );
    }

    #[test]
    fn test_busy_detection() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(is_busy(&busy));
        assert!(!is_busy(&rusqlite::Error::QueryReturnedNoRows));
    }
}
