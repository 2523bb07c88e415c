//! Revision-aware document store abstraction.
//!
//! Every mutation of an existing document must present the revision token
//! the caller last saw; the store rejects it with a conflict if the document
//! moved on in the meantime.

use async_trait::async_trait;
use couchsync_types::Document;

use crate::error::StoreResult;
use crate::query::StoreQuery;

/// Outcome of creating a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseCreation {
    Created,
    AlreadyExists,
}

/// Abstract document store interface.
#[async_trait]
pub trait RevisionStore: Send + Sync {
    /// Returns the name of the store implementation.
    fn provider_name(&self) -> &'static str;

    /// Lists all databases visible to the credentials.
    async fn list_databases(&self) -> StoreResult<Vec<String>>;

    /// Returns whether `database` is listed by the store.
    async fn database_exists(&self, database: &str) -> StoreResult<bool> {
        Ok(self
            .list_databases()
            .await?
            .iter()
            .any(|name| name == database))
    }

    /// Creates a database; an existing one is not an error.
    async fn create_database(&self, database: &str) -> StoreResult<DatabaseCreation>;

    /// Runs a query, returning matching documents in store order.
    async fn find(&self, database: &str, query: &StoreQuery) -> StoreResult<Vec<Document>>;

    /// Fetches one document by key. `None` if it does not exist.
    async fn get(&self, database: &str, key: &str) -> StoreResult<Option<Document>>;

    /// Creates a new document at `key`. Returns the new revision token.
    async fn create(&self, database: &str, key: &str, document: &Document) -> StoreResult<String>;

    /// Replaces the document at `key`, which must currently be at `rev`.
    /// Returns the new revision token.
    async fn update(
        &self,
        database: &str,
        key: &str,
        rev: &str,
        document: &Document,
    ) -> StoreResult<String>;

    /// Deletes the document at `key`, which must currently be at `rev`.
    /// Returns the revision token of the deletion.
    async fn delete(&self, database: &str, key: &str, rev: &str) -> StoreResult<String>;
}
