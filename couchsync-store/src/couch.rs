//! CouchDB implementation of [`RevisionStore`].
//!
//! Talks to the CouchDB HTTP API with basic-auth credentials attached to
//! every request.

use async_trait::async_trait;
use couchsync_types::Document;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::query::StoreQuery;
use crate::settings::ConnectionSettings;
use crate::store::{DatabaseCreation, RevisionStore};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct FindResponse {
    docs: Vec<Document>,
    #[serde(default)]
    warning: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WriteResponse {
    rev: String,
}

/// CouchDB client.
pub struct CouchClient {
    settings: ConnectionSettings,
    base_url: String,
    client: Client,
}

impl CouchClient {
    /// Creates a client with the default request timeout.
    pub fn new(settings: ConnectionSettings) -> StoreResult<Self> {
        Self::with_timeout(settings, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a client whose requests give up after `timeout`.
    pub fn with_timeout(settings: ConnectionSettings, timeout: Duration) -> StoreResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: settings.base_url(),
            settings,
            client,
        })
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    fn database_url(&self, database: &str) -> String {
        format!("{}/{}", self.base_url, urlencoding::encode(database))
    }

    fn document_url(&self, database: &str, key: &str) -> String {
        format!(
            "{}/{}",
            self.database_url(database),
            urlencoding::encode(key)
        )
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.settings.username, Some(&self.settings.password))
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn send(request: RequestBuilder, what: &str) -> StoreResult<Response> {
        request
            .send()
            .await
            .map_err(|e| StoreError::Network(format!("{what} failed: {e}")))
    }

    /// Turns a non-success response into an error, mapping 409 to a
    /// revision conflict on `key`.
    async fn status_error(response: Response, key: Option<&str>) -> StoreError {
        let status = response.status();
        if status == StatusCode::CONFLICT {
            if let Some(key) = key {
                return StoreError::Conflict {
                    key: key.to_string(),
                };
            }
        }
        let body = response.text().await.unwrap_or_default();
        StoreError::Status {
            status: status.as_u16(),
            body,
        }
    }

    async fn write_result(response: Response, key: &str, what: &str) -> StoreResult<String> {
        if !response.status().is_success() {
            return Err(Self::status_error(response, Some(key)).await);
        }
        let written: WriteResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(format!("failed to parse {what} response: {e}")))?;
        Ok(written.rev)
    }
}

#[async_trait]
impl RevisionStore for CouchClient {
    fn provider_name(&self) -> &'static str {
        "CouchDB"
    }

    async fn list_databases(&self) -> StoreResult<Vec<String>> {
        let response = Self::send(
            self.request(Method::GET, format!("{}/_all_dbs", self.base_url)),
            "database listing",
        )
        .await?;

        if !response.status().is_success() {
            return Err(Self::status_error(response, None).await);
        }

        response
            .json()
            .await
            .map_err(|e| StoreError::Decode(format!("failed to parse database list: {e}")))
    }

    async fn create_database(&self, database: &str) -> StoreResult<DatabaseCreation> {
        debug!("Creating database: {}", database);

        let response = Self::send(
            self.request(Method::PUT, self.database_url(database)),
            "database creation",
        )
        .await?;

        match response.status() {
            StatusCode::PRECONDITION_FAILED => {
                debug!("Database already exists: {}", database);
                Ok(DatabaseCreation::AlreadyExists)
            }
            status if status.is_success() => {
                info!("Created database: {}", database);
                Ok(DatabaseCreation::Created)
            }
            _ => Err(Self::status_error(response, None).await),
        }
    }

    async fn find(&self, database: &str, query: &StoreQuery) -> StoreResult<Vec<Document>> {
        debug!(
            "Querying {} (fields: {:?}, limit: {:?})",
            database, query.fields, query.limit
        );

        let response = Self::send(
            self.request(Method::POST, format!("{}/_find", self.database_url(database)))
                .json(query),
            "query",
        )
        .await?;

        if !response.status().is_success() {
            return Err(Self::status_error(response, None).await);
        }

        let found: FindResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(format!("failed to parse query result: {e}")))?;

        if let Some(warning) = found.warning {
            warn!("Store query warning on {}: {}", database, warning);
        }

        Ok(found.docs)
    }

    async fn get(&self, database: &str, key: &str) -> StoreResult<Option<Document>> {
        let response = Self::send(
            self.request(Method::GET, self.document_url(database, key)),
            "document lookup",
        )
        .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::status_error(response, None).await);
        }

        let document = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(format!("failed to parse document {key}: {e}")))?;
        Ok(Some(document))
    }

    async fn create(&self, database: &str, key: &str, document: &Document) -> StoreResult<String> {
        let mut body = document.clone();
        body.strip_reserved();

        let response = Self::send(
            self.request(Method::PUT, self.document_url(database, key))
                .json(&body),
            "document create",
        )
        .await?;

        let rev = Self::write_result(response, key, "create").await?;
        debug!("Created document {} at rev {}", key, rev);
        Ok(rev)
    }

    async fn update(
        &self,
        database: &str,
        key: &str,
        rev: &str,
        document: &Document,
    ) -> StoreResult<String> {
        let mut body = document.clone();
        body.strip_reserved();
        let body = body.with_revision(rev);

        let response = Self::send(
            self.request(Method::PUT, self.document_url(database, key))
                .json(&body),
            "document update",
        )
        .await?;

        let new_rev = Self::write_result(response, key, "update").await?;
        debug!("Updated document {} from rev {} to {}", key, rev, new_rev);
        Ok(new_rev)
    }

    async fn delete(&self, database: &str, key: &str, rev: &str) -> StoreResult<String> {
        let response = Self::send(
            self.request(Method::DELETE, self.document_url(database, key))
                .query(&[("rev", rev)]),
            "document delete",
        )
        .await?;

        let new_rev = Self::write_result(response, key, "delete").await?;
        debug!("Deleted document {} at rev {}", key, rev);
        Ok(new_rev)
    }
}
