//! Database error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error when creating directories or files.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// A JSON column could not be encoded or decoded.
    #[error("Corrupt JSON in column '{column}': {source}")]
    Json {
        column: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A stored enum value is not recognised.
    #[error("Unknown {field} value '{value}'")]
    UnknownValue { field: &'static str, value: String },

    /// No path was configured and no home directory exists to default to.
    #[error("No database path configured and no home directory found")]
    NoDefaultPath,

    /// The database lock was poisoned.
    #[error("Database lock poisoned")]
    LockPoisoned,
}
