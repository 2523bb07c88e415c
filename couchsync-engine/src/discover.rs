//! Schema discovery by type inference over sampled documents.
//!
//! Each field of each sampled document is classified by its textual form
//! against a fixed priority chain (Bool, Integer, Float, Datetime, String).
//! The type seen most often wins; on an exact tie the type first recorded
//! for that field is kept.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use couchsync_store::{RevisionStore, StoreQuery};
use couchsync_types::{Document, FieldValue, Property, PropertyType, Schema};
use futures::future::join_all;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Classifies a single value.
pub fn classify(value: &FieldValue) -> PropertyType {
    classify_text(&value.as_text())
}

/// Classifies a value by its textual form.
pub fn classify_text(text: &str) -> PropertyType {
    let text = text.trim();
    if text.eq_ignore_ascii_case("true") || text.eq_ignore_ascii_case("false") {
        PropertyType::Bool
    } else if text.parse::<i64>().is_ok() {
        PropertyType::Integer
    } else if text.parse::<f64>().is_ok() {
        PropertyType::Float
    } else if is_datetime(text) {
        PropertyType::Datetime
    } else {
        PropertyType::String
    }
}

fn is_datetime(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    DateTime::parse_from_rfc3339(text).is_ok()
        || NAIVE_DATETIME_FORMATS
            .iter()
            .any(|fmt| NaiveDateTime::parse_from_str(text, fmt).is_ok())
        || DATE_FORMATS
            .iter()
            .any(|fmt| NaiveDate::parse_from_str(text, fmt).is_ok())
}

/// Per-field, per-type occurrence counts.
///
/// Both the fields and each field's type counters keep insertion order,
/// which is what the tie break relies on.
#[derive(Debug, Clone, Default)]
pub struct TypeTally {
    fields: IndexMap<String, Vec<(PropertyType, usize)>>,
    sampled: usize,
}

impl TypeTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tallies the first `cap` documents, in order.
    pub fn from_sample(documents: &[Document], cap: usize) -> Self {
        let mut tally = Self::new();
        for document in documents.iter().take(cap) {
            tally.observe(document);
        }
        tally
    }

    /// Counts every field of one document.
    pub fn observe(&mut self, document: &Document) {
        for (field, value) in document {
            let ty = classify(value);
            let counts = self.fields.entry(field.clone()).or_default();
            match counts.iter_mut().find(|(seen, _)| *seen == ty) {
                Some((_, n)) => *n += 1,
                None => counts.push((ty, 1)),
            }
        }
        self.sampled += 1;
    }

    /// Number of documents observed.
    pub fn sampled(&self) -> usize {
        self.sampled
    }

    /// Type counters for a field, in first-seen order.
    pub fn counts(&self, field: &str) -> Option<&[(PropertyType, usize)]> {
        self.fields.get(field).map(Vec::as_slice)
    }

    /// Winning type for a field.
    pub fn inferred_type(&self, field: &str) -> Option<PropertyType> {
        self.counts(field).and_then(first_max)
    }

    /// One property per field, in first-seen order.
    pub fn into_properties(self) -> Vec<Property> {
        self.fields
            .into_iter()
            .filter_map(|(field, counts)| {
                first_max(&counts).map(|ty| Property::discovered(&field, ty))
            })
            .collect()
    }
}

/// Highest count wins; a later type only replaces the current best when
/// its count is strictly greater.
fn first_max(counts: &[(PropertyType, usize)]) -> Option<PropertyType> {
    counts
        .iter()
        .fold(None, |best: Option<(PropertyType, usize)>, &(ty, n)| match best {
            Some((_, top)) if top >= n => best,
            _ => Some((ty, n)),
        })
        .map(|(ty, _)| ty)
}

/// Discovers schema properties against one database.
pub struct SchemaDiscovery {
    store: Arc<dyn RevisionStore>,
    database: String,
    sample_size: usize,
}

impl SchemaDiscovery {
    pub fn new(store: Arc<dyn RevisionStore>, database: impl Into<String>, sample_size: usize) -> Self {
        Self {
            store,
            database: database.into(),
            sample_size,
        }
    }

    /// Fills in the properties of one schema.
    ///
    /// Schemas that already carry properties are returned unchanged.
    pub async fn discover(&self, schema: &Schema) -> EngineResult<Schema> {
        if schema.has_properties() {
            debug!(schema = %schema.id, "Schema already has properties, skipping discovery");
            return Ok(schema.clone());
        }
        if !schema.has_query() {
            return Err(EngineError::Discovery(format!(
                "schema {} has no query",
                schema.id
            )));
        }

        let sample_limit = u32::try_from(self.sample_size).unwrap_or(u32::MAX);
        let query = StoreQuery::parse(&schema.query)?.with_default_limit(sample_limit);
        let documents = self.store.find(&self.database, &query).await?;
        if documents.is_empty() {
            return Err(EngineError::Discovery(format!(
                "query for schema {} returned no documents",
                schema.id
            )));
        }

        let tally = TypeTally::from_sample(&documents, self.sample_size);
        if tally.sampled() == 0 {
            return Err(EngineError::Discovery(format!(
                "no documents sampled for schema {} (sample size {})",
                schema.id, self.sample_size
            )));
        }
        info!(
            schema = %schema.id,
            "Inferred property types from {} of {} documents",
            tally.sampled(),
            documents.len()
        );

        let mut discovered = schema.clone();
        discovered.properties = tally.into_properties();
        Ok(discovered)
    }

    /// Discovers all schemas concurrently. Failed schemas are omitted.
    pub async fn discover_all(&self, schemas: &[Schema]) -> Vec<Schema> {
        info!("Refresh schemas attempted: {}", schemas.len());

        let results = join_all(schemas.iter().map(|schema| self.discover(schema))).await;
        let discovered: Vec<Schema> = results
            .into_iter()
            .zip(schemas)
            .filter_map(|(result, schema)| match result {
                Ok(found) => Some(found),
                Err(e) => {
                    warn!(schema = %schema.id, "Schema discovery failed: {}", e);
                    None
                }
            })
            .collect();

        info!("Schemas returned: {}", discovered.len());
        discovered
    }
}
