//! Stream elements exchanged with the host.

use serde::{Deserialize, Serialize};

use crate::Document;

/// The caller's stated intent for a record.
///
/// Advisory only: the write path decides between create, update, delete
/// and no-op from the payload and the store lookup, never from this tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordAction {
    Insert,
    Update,
    #[default]
    Upsert,
    Delete,
}

/// An inbound record on the write stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteRecord {
    pub record_id: String,
    /// Opaque, echoed back verbatim on the acknowledgment.
    pub correlation_id: String,
    #[serde(default)]
    pub action: RecordAction,
    /// Payload keyed by `Property.id`.
    #[serde(default)]
    pub data: Document,
}

impl WriteRecord {
    pub fn new(
        record_id: impl Into<String>,
        correlation_id: impl Into<String>,
        data: Document,
    ) -> Self {
        Self {
            record_id: record_id.into(),
            correlation_id: correlation_id.into(),
            action: RecordAction::default(),
            data,
        }
    }

    /// Sets the advisory action tag (builder style).
    pub fn with_action(mut self, action: RecordAction) -> Self {
        self.action = action;
        self
    }
}

/// An outbound record produced by a read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub action: RecordAction,
    pub data: Document,
}

impl Record {
    /// Wraps a store document as an upsert record.
    pub fn upsert(data: Document) -> Self {
        Self {
            action: RecordAction::Upsert,
            data,
        }
    }
}

/// Acknowledgment for one [`WriteRecord`]. An empty `error` means success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordAck {
    pub correlation_id: String,
    pub error: String,
}

impl RecordAck {
    pub fn success(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            error: String::new(),
        }
    }

    pub fn failure(correlation_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }
}
