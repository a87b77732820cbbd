//! Error types for og
//!
//! This module defines the common error type used throughout the generator.

use thiserror::Error;

/// Common result type for og operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for og
#[derive(Debug, Error)]
pub enum Error {
    // Configuration errors - fatal at startup
    #[error("configuration error: {0}")]
    Configuration(String),

    // I/O errors from the population store
    #[error("store I/O error: {0}")]
    StoreIo(#[from] std::io::Error),

    #[error("store corrupt: {0}")]
    StoreCorrupt(String),

    // Population errors - request is dropped and counted as a skip
    #[error("object population is empty")]
    EmptyPopulation,

    // Protocol errors - session abandoned, counters incremented
    #[error("multipart initiate failed with status {status}")]
    InitiateFailed { status: u16 },

    #[error("multipart response missing upload id")]
    MissingUploadId,

    #[error("part {part_number} response missing ETag header")]
    MissingEtag { part_number: u32 },

    #[error("protocol error: {0}")]
    Protocol(String),

    // Transient errors - counted, the run continues
    #[error("request failed: {0}")]
    Transient(String),

    // Driver lifecycle
    #[error("test stopped")]
    Stopped,

    // Internal errors - the test aborts
    #[error("event listener failed: {0}")]
    Listener(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a transient error
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Errors the run survives: the request is recorded and the next one is
    /// produced.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Transient(_)
                | Self::EmptyPopulation
                | Self::InitiateFailed { .. }
                | Self::MissingUploadId
                | Self::MissingEtag { .. }
                | Self::Protocol(_)
        )
    }

    /// Errors that should abort the whole test
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::Listener(_)
                | Self::Internal(_)
                | Self::StoreCorrupt(_)
        )
    }

    /// Population misses are counted separately from failures
    #[must_use]
    pub fn is_population_miss(&self) -> bool {
        matches!(self, Self::EmptyPopulation)
    }

    /// Process exit code for the run outcome carrying this error
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            _ => 2,
        }
    }
}
