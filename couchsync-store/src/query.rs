//! Store query construction.
//!
//! Every query sent to `_find` projects the reserved identity and revision
//! fields, whatever the caller asked for: the write path needs `_rev`, and
//! reads must be able to hand back document identity.

use couchsync_types::{ID_FIELD, REV_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors from parsing a schema's selection query.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("query must be a JSON object")]
    NotAnObject,

    #[error("`fields` must be an array of strings")]
    InvalidFields,

    #[error("`limit` must be a non-negative integer")]
    InvalidLimit,
}

/// A `_find` request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreQuery {
    /// Field projection. Always contains `_id` and `_rev` exactly once.
    pub fields: Vec<String>,
    /// Row limit; absent means the store default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Opaque filter expression.
    pub selector: Value,
    /// Remaining `_find` options (`sort`, `skip`, `use_index`, ...),
    /// forwarded untouched.
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl StoreQuery {
    /// Builds a query from a selector, a caller projection and a limit.
    pub fn new<I, S>(selector: Value, fields: I, limit: Option<u32>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            limit,
            selector,
            options: Map::new(),
        }
        .normalized()
    }

    /// A query matching every document.
    pub fn match_all() -> Self {
        Self::new(Value::Object(Map::new()), Vec::<String>::new(), None)
    }

    /// Parses a schema's selection query.
    ///
    /// An object with a `selector` key is a full `_find` body: its `fields`
    /// and `limit` are kept, everything else goes to `options`. Any other
    /// object is taken as a bare selector.
    pub fn parse(text: &str) -> Result<Self, QueryError> {
        let value: Value = serde_json::from_str(text.trim())?;
        let Value::Object(mut object) = value else {
            return Err(QueryError::NotAnObject);
        };

        let Some(selector) = object.remove("selector") else {
            return Ok(Self::new(Value::Object(object), Vec::<String>::new(), None));
        };

        let fields = match object.remove("fields") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s),
                    _ => Err(QueryError::InvalidFields),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(QueryError::InvalidFields),
        };

        let limit = match object.remove("limit") {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => Some(
                n.as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or(QueryError::InvalidLimit)?,
            ),
            Some(_) => return Err(QueryError::InvalidLimit),
        };

        Ok(Self {
            fields,
            limit,
            selector,
            options: object,
        }
        .normalized())
    }

    /// Replaces the caller projection.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self.normalized()
    }

    /// Overrides the limit when `limit` is set and non-zero.
    pub fn with_limit(mut self, limit: Option<u32>) -> Self {
        if let Some(limit) = limit.filter(|l| *l > 0) {
            self.limit = Some(limit);
        }
        self
    }

    /// Sets a limit only if the query has none.
    pub fn with_default_limit(mut self, limit: u32) -> Self {
        if self.limit.is_none() && limit > 0 {
            self.limit = Some(limit);
        }
        self
    }

    /// Ensures `_id` and `_rev` are projected exactly once, drops duplicate
    /// fields and a zero limit. Idempotent.
    pub fn normalized(mut self) -> Self {
        self.fields = with_reserved_fields(self.fields);
        self.limit = self.limit.filter(|l| *l > 0);
        self
    }
}

/// Deduplicates `fields` (first occurrence wins) and appends whichever of
/// `_id` / `_rev` is missing.
pub fn with_reserved_fields(fields: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(fields.len() + 2);
    for field in fields {
        if !out.contains(&field) {
            out.push(field);
        }
    }
    for reserved in [ID_FIELD, REV_FIELD] {
        if !out.iter().any(|f| f == reserved) {
            out.push(reserved.to_string());
        }
    }
    out
}
