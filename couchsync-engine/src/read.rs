//! Streaming reads of a schema's documents.

use couchsync_store::{RevisionStore, StoreQuery};
use couchsync_types::{Record, Schema};
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};

/// Reads the documents selected by a schema's query.
pub struct ReadStreamer {
    store: Arc<dyn RevisionStore>,
    database: String,
}

impl ReadStreamer {
    pub fn new(store: Arc<dyn RevisionStore>, database: impl Into<String>) -> Self {
        Self {
            store,
            database: database.into(),
        }
    }

    /// Translates a schema into a store query. `None` if the schema has no
    /// query.
    ///
    /// The projection is the schema's property names when it has any, and
    /// the query's own `fields` otherwise. A non-zero `limit` overrides
    /// the query's limit.
    pub fn build_query(schema: &Schema, limit: Option<u32>) -> EngineResult<Option<StoreQuery>> {
        if !schema.has_query() {
            return Ok(None);
        }
        let mut query = StoreQuery::parse(&schema.query)?;
        if schema.has_properties() {
            query = query.with_fields(schema.property_names());
        }
        Ok(Some(query.with_limit(limit)))
    }

    /// Lazily runs the schema's query and yields one upsert record per
    /// returned document, in store order.
    ///
    /// Nothing is sent to the store until the stream is first polled. A
    /// failure is yielded once and ends the stream.
    pub fn stream(&self, schema: &Schema, limit: Option<u32>) -> BoxStream<'static, EngineResult<Record>> {
        let query = match Self::build_query(schema, limit) {
            Ok(Some(query)) => query,
            Ok(None) => {
                info!(schema = %schema.id, "Query not defined, nothing to read");
                return stream::empty().boxed();
            }
            Err(e) => return stream::once(async move { Err::<Record, _>(e) }).boxed(),
        };

        let store = Arc::clone(&self.store);
        let database = self.database.clone();
        debug!(
            schema = %schema.id,
            "Reading records from {} (limit: {:?})",
            database, query.limit
        );

        stream::once(async move { store.find(&database, &query).await })
            .flat_map(|result| match result {
                Ok(documents) => stream::iter(
                    documents
                        .into_iter()
                        .map(|doc| Ok::<_, EngineError>(Record::upsert(doc))),
                )
                .left_stream(),
                Err(e) => stream::once(async move { Err(EngineError::from(e)) }).right_stream(),
            })
            .boxed()
    }

    /// Drives [`stream`](Self::stream) into `sink`, waiting for each send
    /// before reading on. Returns the number of records delivered.
    ///
    /// A closed sink ends the read without error.
    pub async fn read_into(
        &self,
        schema: &Schema,
        limit: Option<u32>,
        sink: &mpsc::Sender<Record>,
    ) -> EngineResult<usize> {
        let mut records = self.stream(schema, limit);
        let mut published = 0;
        while let Some(record) = records.next().await {
            if sink.send(record?).await.is_err() {
                debug!(schema = %schema.id, "Record sink closed, stopping read");
                break;
            }
            published += 1;
        }
        info!(schema = %schema.id, "Published {} records", published);
        Ok(published)
    }
}
