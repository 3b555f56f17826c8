use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Store error: {0}")]
    Store(String),
    #[error("Stale cascade for group {group_id}: stored flag is {stored}, requested {requested}")]
    StaleCascade {
        group_id: String,
        stored: bool,
        requested: bool,
    },
}

impl InfraError {
    /// Failures worth another write attempt. Validation and lookup errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(failure, _)) => matches!(
                failure.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            Self::Sqlite(_) => false,
            Self::Store(_) | Self::Io(_) => true,
            _ => false,
        }
    }
}
