//! Error types for runvault
//!
//! Every failure in the run pipeline is a typed variant; messages carry
//! enough context to act on without reading the source.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// runvault error types
#[derive(Error, Debug)]
pub enum Error {
    /// The backing database could not be opened or created
    #[error("Connection error: {0}\nCheck that the database directory exists and is writable")]
    Connection(String),

    /// A table exists with a definition that conflicts with the expected one
    #[error("Schema error on table {table}: {reason}")]
    Schema {
        /// Table name
        table: String,
        /// What did not match
        reason: String,
    },

    /// Primary key violation (run already recorded)
    #[error("Constraint error: run {run_id} already exists in {table}\nRun ids are never overwritten; use a new run id")]
    Constraint {
        /// Table name
        table: String,
        /// Rejected run id
        run_id: i64,
    },

    /// A blob field could not be produced
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A blob could not be reconstructed (malformed or incompatible version)
    #[error("Decode error: {0}")]
    Decode(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File expected at cleanup time was absent
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Record violates one of its invariants
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Pipeline configuration rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Model training or grid search failed
    #[error("Training error: {0}")]
    Training(String),

    /// Any other SQLite failure
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl Error {
    /// Whether the pipeline may log this error and continue.
    ///
    /// Only a missing file during cleanup is recoverable.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
