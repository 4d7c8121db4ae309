//! Error types for Windowgate.
//!
//! Reaching a key's capacity is not an error: stores report it as
//! `Ok(false)`. Everything here is a failure to reach a decision.

use thiserror::Error;

/// Main error type for Windowgate operations.
#[derive(Error, Debug)]
pub enum AdmissionError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors reported by the Redis client or server
    #[error("Store error: {0}")]
    Store(#[from] redis::RedisError),

    /// Errors reported by any other shared-store transport
    #[error("Store backend error: {0}")]
    Backend(String),

    /// Every optimistic transaction attempt lost a race on the key
    #[error("max number of retries reached in use_token for key {key:?} ({attempts} attempts)")]
    RetriesExhausted { key: String, attempts: u32 },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Windowgate operations.
pub type Result<T> = std::result::Result<T, AdmissionError>;
