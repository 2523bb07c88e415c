//! Error types for the sync engine.

use couchsync_store::{QueryError, StoreError};
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Connection settings are malformed or incomplete.
    #[error("{0}")]
    Settings(String),

    /// The store could not be reached, rejected the credentials, or does
    /// not list the configured database.
    #[error("{0}")]
    Connection(String),

    /// A schema's properties could not be discovered.
    #[error("discovery failed: {0}")]
    Discovery(String),

    /// A schema's selection query could not be parsed.
    #[error("invalid schema query: {0}")]
    InvalidQuery(#[from] QueryError),

    /// The record carries no usable value for the primary-key property.
    #[error("record has no value for primary key property {0}")]
    MissingPrimaryKey(String),

    /// A looked-up document came back without a revision token.
    #[error("document {0} has no revision token")]
    MissingRevision(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The commit deadline elapsed before the write finished.
    #[error("timed out")]
    Timeout,

    /// Only replication write-backs are supported.
    #[error("only replication writebacks are supported")]
    UnsupportedWriteMode,

    /// No connection has been established, or it was torn down.
    #[error("not connected")]
    NotConnected,

    /// `write_stream` was called before `prepare_write`.
    #[error("write has not been prepared")]
    WriteNotConfigured,

    /// The acknowledgment receiver went away.
    #[error("channel closed")]
    ChannelClosed,

    #[error(transparent)]
    Types(#[from] couchsync_types::Error),
}

impl EngineError {
    /// Returns true if the error is a lost revision race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::Store(e) if e.is_conflict())
    }
}
