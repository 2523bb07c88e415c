//! Error types for the store client.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur talking to the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The request never produced a response (connect, timeout, body read).
    #[error("network error: {0}")]
    Network(String),

    /// The store answered with a non-success status.
    #[error("store returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The revision token sent with an update or delete is no longer current.
    #[error("revision conflict on document {key}")]
    Conflict { key: String },

    /// The response body did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl StoreError {
    /// Returns true if this error is a lost optimistic-concurrency race.
    pub fn is_conflict(&self) -> bool {
        match self {
            StoreError::Conflict { .. } => true,
            StoreError::Status { status, .. } => *status == 409,
            _ => false,
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::Status { status, .. } => Some(*status),
            StoreError::Conflict { .. } => Some(409),
            StoreError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
