//! Common error types for SuryaNetra

use thiserror::Error;

/// Common result type for SuryaNetra operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the audit pipeline and record lifecycle
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested record or resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Stored integrity hash does not match record content.
    ///
    /// Never recoverable by retry: the document on disk was altered outside the store.
    #[error("Integrity check failed for {sample_id}: stored {expected}, computed {actual}")]
    Integrity {
        sample_id: String,
        expected: String,
        actual: String,
    },

    /// Optimistic write lost against a concurrent writer
    #[error("Revision conflict for {sample_id}: expected revision {expected}, found {found}")]
    RevisionConflict {
        sample_id: String,
        expected: u64,
        found: u64,
    },

    /// Record content violates a model invariant
    #[error("Record invariant violated: {0}")]
    Invariant(String),

    /// Lifecycle action not permitted from the current state
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Raster image could not be decoded
    #[error("Image error: {0}")]
    Image(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
