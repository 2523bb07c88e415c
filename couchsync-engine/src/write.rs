//! Revision-aware replication writes.
//!
//! Each record is written with a fetch-then-mutate protocol: look the
//! document up by key, then create, update or delete it carrying the
//! revision token just fetched. A lost race surfaces as a conflict; there
//! is no retry and no merge.
//!
//! | existing document | payload empty | action |
//! |---|---|---|
//! | no  | no  | create |
//! | no  | yes | skip (success) |
//! | yes | yes | delete with fetched revision |
//! | yes | no  | update with fetched revision |

use couchsync_store::RevisionStore;
use couchsync_types::{Document, RecordAction, Schema, WriteRecord};
use std::sync::Arc;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::replication::{PrimaryKey, ReplicationTarget};

/// Mutation chosen for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteAction {
    Create,
    Skip,
    Delete { rev: String },
    Update { rev: String },
}

/// Picks the mutation for a record from the lookup result.
pub fn decide(existing_rev: Option<&str>, payload_empty: bool) -> WriteAction {
    match (existing_rev, payload_empty) {
        (None, false) => WriteAction::Create,
        (None, true) => WriteAction::Skip,
        (Some(rev), true) => WriteAction::Delete {
            rev: rev.to_string(),
        },
        (Some(rev), false) => WriteAction::Update {
            rev: rev.to_string(),
        },
    }
}

/// Result of a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Created { key: String, rev: String },
    Updated { key: String, rev: String },
    Deleted { key: String, rev: String },
    Skipped { key: String },
}

impl WriteOutcome {
    pub fn key(&self) -> &str {
        match self {
            WriteOutcome::Created { key, .. }
            | WriteOutcome::Updated { key, .. }
            | WriteOutcome::Deleted { key, .. }
            | WriteOutcome::Skipped { key } => key,
        }
    }
}

/// Renames a record's payload from property ids to store field names.
///
/// Fields not in the schema and null values are dropped, as are the
/// reserved `_id` and `_rev` fields.
pub fn named_payload(schema: &Schema, data: &Document) -> Document {
    let mut named: Document = schema
        .properties
        .iter()
        .filter_map(|property| {
            data.get(&property.id)
                .filter(|value| !value.is_null())
                .map(|value| (property.name.clone(), value.clone()))
        })
        .collect();
    named.strip_reserved();
    named
}

/// Document key for a record.
pub fn resolve_key(target: &ReplicationTarget, record: &WriteRecord) -> EngineResult<String> {
    match &target.primary_key {
        PrimaryKey::AutoGenerate => Ok(record.record_id.clone()),
        PrimaryKey::Property(id) => record
            .data
            .get(id)
            .and_then(|value| value.to_key_string())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| EngineError::MissingPrimaryKey(id.clone())),
    }
}

fn intent_matches(intent: RecordAction, action: &WriteAction) -> bool {
    match (intent, action) {
        (_, WriteAction::Skip) => true,
        (RecordAction::Upsert, WriteAction::Create | WriteAction::Update { .. }) => true,
        (RecordAction::Insert, WriteAction::Create) => true,
        (RecordAction::Update, WriteAction::Update { .. }) => true,
        (RecordAction::Delete, WriteAction::Delete { .. }) => true,
        _ => false,
    }
}

/// Writes records to one replication target.
pub struct WriteCoordinator {
    store: Arc<dyn RevisionStore>,
    schema: Schema,
    target: ReplicationTarget,
    database: String,
}

impl WriteCoordinator {
    pub fn new(store: Arc<dyn RevisionStore>, schema: Schema, target: ReplicationTarget) -> Self {
        let database = target.database();
        Self {
            store,
            schema,
            target,
            database,
        }
    }

    /// Database the coordinator writes to.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Writes one record.
    pub async fn write(&self, record: &WriteRecord) -> EngineResult<WriteOutcome> {
        let payload = named_payload(&self.schema, &record.data);
        let key = resolve_key(&self.target, record)?;

        let existing = self.store.get(&self.database, &key).await?;
        let existing_rev = match &existing {
            Some(doc) => Some(
                doc.rev()
                    .ok_or_else(|| EngineError::MissingRevision(key.clone()))?,
            ),
            None => None,
        };

        let action = decide(existing_rev, payload.is_empty());
        debug!(
            key = %key,
            record = %record.record_id,
            "Record {:?} resolved to {:?}",
            record.action,
            action
        );
        if !intent_matches(record.action, &action) {
            debug!(
                key = %key,
                "Record action {:?} differs from the applied {:?}",
                record.action,
                action
            );
        }

        let outcome = match action {
            WriteAction::Create => {
                let rev = self.store.create(&self.database, &key, &payload).await?;
                WriteOutcome::Created { key, rev }
            }
            WriteAction::Skip => WriteOutcome::Skipped { key },
            WriteAction::Delete { rev } => {
                let rev = self.store.delete(&self.database, &key, &rev).await?;
                WriteOutcome::Deleted { key, rev }
            }
            WriteAction::Update { rev } => {
                let rev = self
                    .store
                    .update(&self.database, &key, &rev, &payload)
                    .await?;
                WriteOutcome::Updated { key, rev }
            }
        };
        Ok(outcome)
    }
}
