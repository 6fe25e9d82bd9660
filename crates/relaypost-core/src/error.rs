//! Error types for RelayPost.

use thiserror::Error;

/// Errors surfaced by RelayPost components.
///
/// Dispatch-time delivery failures are not represented here: they are
/// recorded on the queue item and in the cycle report instead.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Submission rejected before any store write.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No queue item with the given id.
    #[error("Queue item not found: {0}")]
    NotFound(String),

    /// Persistence layer failure.
    #[error("Store error: {0}")]
    Store(String),

    /// Outbound transport failure.
    #[error("Channel error: {0}")]
    Channel(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RelayError>;
