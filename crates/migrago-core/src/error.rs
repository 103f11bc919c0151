use std::time::Duration;

use thiserror::Error;

/// Core error type for migrago operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("Load error: {0}")]
    Load(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Execution error in migration '{id}': {message}")]
    Execution { id: String, message: String },

    #[error("Checksum mismatch for migration '{id}': file: {file_checksum}, database: {db_checksum}")]
    ChecksumMismatch {
        id: String,
        file_checksum: String,
        db_checksum: String,
    },

    #[error("Migration '{id}' cannot be reverted: a more recently applied migration is still desired")]
    NonRevertibleOrder { id: String },

    #[error("Migration '{id}' must be reverted but the changelog holds no revert script for it")]
    MissingRevertScript { id: String },

    #[error("Cancelled while processing '{id}'")]
    Cancelled { id: String },

    #[error("'{id}' did not finish within {after:?}")]
    Timeout { id: String, after: Duration },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MigrateError {
    /// The migration the error is about, when there is one.
    pub fn migration_id(&self) -> Option<&str> {
        match self {
            Self::Execution { id, .. }
            | Self::ChecksumMismatch { id, .. }
            | Self::NonRevertibleOrder { id }
            | Self::MissingRevertScript { id }
            | Self::Cancelled { id }
            | Self::Timeout { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Whether re-running without operator intervention will fail the same way.
    pub fn requires_operator(&self) -> bool {
        matches!(
            self,
            Self::ChecksumMismatch { .. }
                | Self::NonRevertibleOrder { .. }
                | Self::MissingRevertScript { .. }
        )
    }
}

impl From<sqlx::Error> for MigrateError {
    fn from(e: sqlx::Error) -> Self {
        MigrateError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for MigrateError {
    fn from(e: serde_json::Error) -> Self {
        MigrateError::Load(e.to_string())
    }
}

/// Result type alias using MigrateError.
pub type Result<T> = std::result::Result<T, MigrateError>;
