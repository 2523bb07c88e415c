//! Core type definitions for couchsync.
//!
//! This crate defines the plugin-agnostic types shared by the store client
//! and the sync engine:
//! - [`Schema`] / [`Property`]: the tabular view of a document collection
//! - [`FieldValue`] / [`Document`]: ordered, typed document contents
//! - [`WriteRecord`], [`Record`], [`RecordAck`]: the stream elements
//! - [`SessionId`]: identifies one connect/disconnect lifecycle
//!
//! Two field names are reserved by the store: [`ID_FIELD`] and
//! [`REV_FIELD`]. They are store-managed and never carried as ordinary data.

mod ids;
mod record;
mod schema;
mod value;

pub use ids::SessionId;
pub use record::{Record, RecordAck, RecordAction, WriteRecord};
pub use schema::{Property, PropertyType, Schema};
pub use value::{Document, FieldValue};

/// Identity field managed by the document store.
pub const ID_FIELD: &str = "_id";

/// Revision-token field managed by the document store.
pub const REV_FIELD: &str = "_rev";

/// Returns true if `field` is one of the store-managed reserved fields.
#[must_use]
pub fn is_reserved_field(field: &str) -> bool {
    field == ID_FIELD || field == REV_FIELD
}

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid session id: {0}")]
    InvalidSessionId(#[from] uuid::Error),

    #[error("expected a JSON object, got {0}")]
    NotAnObject(String),
}
