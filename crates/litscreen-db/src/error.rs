//! Record store error types.

use litscreen_common::Transient;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for DbError {
    fn from(err: tokio::task::JoinError) -> Self {
        DbError::Task(err.to_string())
    }
}

impl Transient for DbError {
    fn is_transient(&self) -> bool {
        match self {
            DbError::Io(_) | DbError::Task(_) => true,
            DbError::Csv(e) => e.is_io_error(),
            DbError::Serialization(_) => false,
        }
    }
}

impl From<DbError> for litscreen_common::LitscreenError {
    fn from(err: DbError) -> Self {
        litscreen_common::LitscreenError::Store(err.to_string())
    }
}
