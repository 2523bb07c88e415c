//! An in-memory store for testing.
//!
//! Enforces revision tokens the way the real store does, records every
//! call, and can inject latency or failures per operation.

use async_trait::async_trait;
use couchsync_types::Document;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{StoreError, StoreResult};
use crate::query::StoreQuery;
use crate::store::{DatabaseCreation, RevisionStore};

/// Operations a [`MemoryStore`] can be asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreCall {
    ListDatabases,
    CreateDatabase,
    Find,
    Get,
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone)]
struct StoredDoc {
    generation: u64,
    rev: String,
    body: Document,
}

#[derive(Debug, Default)]
struct Inner {
    databases: BTreeMap<String, BTreeMap<String, StoredDoc>>,
    calls: Vec<StoreCall>,
    queries: Vec<StoreQuery>,
    latency: HashMap<StoreCall, Duration>,
    failures: HashMap<StoreCall, u16>,
}

/// In-memory [`RevisionStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an empty database (builder style).
    pub fn with_database(self, name: &str) -> Self {
        self.lock().databases.entry(name.to_string()).or_default();
        self
    }

    /// Seeds a document without recording a call. Returns its revision.
    pub fn insert_document(&self, database: &str, key: &str, body: Document) -> String {
        let mut inner = self.lock();
        let docs = inner.databases.entry(database.to_string()).or_default();
        let generation = docs.get(key).map_or(1, |d| d.generation + 1);
        let stored = StoredDoc::new(key, generation, body);
        let rev = stored.rev.clone();
        docs.insert(key.to_string(), stored);
        rev
    }

    /// Current stored body of a document, with `_id` and `_rev` attached.
    pub fn document(&self, database: &str, key: &str) -> Option<Document> {
        self.lock()
            .databases
            .get(database)
            .and_then(|docs| docs.get(key))
            .map(|d| d.to_document(key))
    }

    /// Number of live documents in a database.
    pub fn document_count(&self, database: &str) -> usize {
        self.lock().databases.get(database).map_or(0, BTreeMap::len)
    }

    pub fn has_database(&self, database: &str) -> bool {
        self.lock().databases.contains_key(database)
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, call: StoreCall) -> usize {
        self.lock().calls.iter().filter(|c| **c == call).count()
    }

    /// Queries received by `find`, in order.
    pub fn queries(&self) -> Vec<StoreQuery> {
        self.lock().queries.clone()
    }

    /// Makes every future `call` wait `latency` before doing anything.
    pub fn set_latency(&self, call: StoreCall, latency: Duration) {
        self.lock().latency.insert(call, latency);
    }

    /// Makes every future `call` fail with `status` (409 becomes a conflict).
    pub fn fail_with_status(&self, call: StoreCall, status: u16) {
        self.lock().failures.insert(call, status);
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records the call, waits out any configured latency, then applies
    /// any injected failure.
    async fn enter(&self, call: StoreCall, key: Option<&str>) -> StoreResult<()> {
        let latency = {
            let mut inner = self.lock();
            inner.calls.push(call);
            inner.latency.get(&call).copied()
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let failure = self.lock().failures.get(&call).copied();
        match (failure, key) {
            (None, _) => Ok(()),
            (Some(409), Some(key)) => Err(StoreError::Conflict {
                key: key.to_string(),
            }),
            (Some(status), _) => Err(StoreError::Status {
                status,
                body: format!("injected failure for {call:?}"),
            }),
        }
    }

    fn missing_database(database: &str) -> StoreError {
        StoreError::Status {
            status: 404,
            body: format!("database {database} does not exist"),
        }
    }
}

impl StoredDoc {
    fn new(key: &str, generation: u64, mut body: Document) -> Self {
        body.strip_reserved();
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        generation.hash(&mut hasher);
        body.to_json_value().to_string().hash(&mut hasher);
        Self {
            generation,
            rev: format!("{generation}-{:016x}", hasher.finish()),
            body,
        }
    }

    fn to_document(&self, key: &str) -> Document {
        let mut doc = Document::new();
        doc.insert(couchsync_types::ID_FIELD, key);
        doc.insert(couchsync_types::REV_FIELD, self.rev.as_str());
        for (field, value) in &self.body {
            doc.insert(field.clone(), value.clone());
        }
        doc
    }
}

/// Equality-only selector matching. Operator objects (`{"$gt": ..}`)
/// other than `$eq` are ignored.
fn selector_matches(selector: &Value, doc: &Document) -> bool {
    let Value::Object(conditions) = selector else {
        return true;
    };
    conditions.iter().all(|(field, expected)| {
        let expected = match expected {
            Value::Object(ops) => match ops.get("$eq") {
                Some(v) => v,
                None => return true,
            },
            other => other,
        };
        doc.get(field)
            .is_some_and(|actual| actual.to_json() == *expected)
    })
}

fn project(doc: Document, fields: &[String]) -> Document {
    if fields.is_empty() {
        return doc;
    }
    fields
        .iter()
        .filter_map(|f| doc.get(f).map(|v| (f.clone(), v.clone())))
        .collect()
}

#[async_trait]
impl RevisionStore for MemoryStore {
    fn provider_name(&self) -> &'static str {
        "memory"
    }

    async fn list_databases(&self) -> StoreResult<Vec<String>> {
        self.enter(StoreCall::ListDatabases, None).await?;
        Ok(self.lock().databases.keys().cloned().collect())
    }

    async fn create_database(&self, database: &str) -> StoreResult<DatabaseCreation> {
        self.enter(StoreCall::CreateDatabase, None).await?;
        let mut inner = self.lock();
        if inner.databases.contains_key(database) {
            return Ok(DatabaseCreation::AlreadyExists);
        }
        inner.databases.insert(database.to_string(), BTreeMap::new());
        Ok(DatabaseCreation::Created)
    }

    async fn find(&self, database: &str, query: &StoreQuery) -> StoreResult<Vec<Document>> {
        self.enter(StoreCall::Find, None).await?;
        let mut inner = self.lock();
        inner.queries.push(query.clone());
        let docs = inner
            .databases
            .get(database)
            .ok_or_else(|| Self::missing_database(database))?;

        let limit = query.limit.map_or(usize::MAX, |l| l as usize);
        Ok(docs
            .iter()
            .map(|(key, stored)| stored.to_document(key))
            .filter(|doc| selector_matches(&query.selector, doc))
            .take(limit)
            .map(|doc| project(doc, &query.fields))
            .collect())
    }

    async fn get(&self, database: &str, key: &str) -> StoreResult<Option<Document>> {
        self.enter(StoreCall::Get, None).await?;
        let inner = self.lock();
        let docs = inner
            .databases
            .get(database)
            .ok_or_else(|| Self::missing_database(database))?;
        Ok(docs.get(key).map(|d| d.to_document(key)))
    }

    async fn create(&self, database: &str, key: &str, document: &Document) -> StoreResult<String> {
        self.enter(StoreCall::Create, Some(key)).await?;
        let mut inner = self.lock();
        let docs = inner
            .databases
            .get_mut(database)
            .ok_or_else(|| Self::missing_database(database))?;
        if docs.contains_key(key) {
            return Err(StoreError::Conflict {
                key: key.to_string(),
            });
        }
        let stored = StoredDoc::new(key, 1, document.clone());
        let rev = stored.rev.clone();
        docs.insert(key.to_string(), stored);
        Ok(rev)
    }

    async fn update(
        &self,
        database: &str,
        key: &str,
        rev: &str,
        document: &Document,
    ) -> StoreResult<String> {
        self.enter(StoreCall::Update, Some(key)).await?;
        let mut inner = self.lock();
        let docs = inner
            .databases
            .get_mut(database)
            .ok_or_else(|| Self::missing_database(database))?;
        let current = match docs.get(key) {
            Some(current) if current.rev == rev => current.generation,
            _ => {
                return Err(StoreError::Conflict {
                    key: key.to_string(),
                });
            }
        };
        let stored = StoredDoc::new(key, current + 1, document.clone());
        let new_rev = stored.rev.clone();
        docs.insert(key.to_string(), stored);
        Ok(new_rev)
    }

    async fn delete(&self, database: &str, key: &str, rev: &str) -> StoreResult<String> {
        self.enter(StoreCall::Delete, Some(key)).await?;
        let mut inner = self.lock();
        let docs = inner
            .databases
            .get_mut(database)
            .ok_or_else(|| Self::missing_database(database))?;
        match docs.get(key) {
            Some(current) if current.rev == rev => {
                let tombstone = format!("{}-deleted", current.generation + 1);
                docs.remove(key);
                Ok(tombstone)
            }
            Some(_) => Err(StoreError::Conflict {
                key: key.to_string(),
            }),
            None => Err(StoreError::Status {
                status: 404,
                body: format!("document {key} not found"),
            }),
        }
    }
}
