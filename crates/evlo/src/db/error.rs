use std::path::PathBuf;
use thiserror::Error;

use crate::model::ParsingStatus;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Event store query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cannot create database directory '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema migration {version} failed: {reason}")]
    Migration { version: u32, reason: String },

    /// A stored value could not be mapped back to a domain type.
    #[error("Corrupt value in column '{column}': {value}")]
    CorruptValue { column: &'static str, value: String },

    /// A status change other than `IN_PROGRESS` to a terminal state.
    #[error("Log file {id} cannot move from {} to {}", .current.as_str(), .requested.as_str())]
    InvalidTransition {
        id: i64,
        current: ParsingStatus,
        requested: ParsingStatus,
    },

    #[error("Event store connection poisoned by a panicked job")]
    LockPoisoned,
}
