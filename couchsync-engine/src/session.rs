//! Session state snapshots.
//!
//! A [`SessionContext`] is never mutated in place. Connect, prepare-write
//! and disconnect each build a new context and swap it in; an operation
//! keeps working on the snapshot it captured when it started.

use couchsync_store::{ConnectionSettings, CouchClient, RevisionStore};
use couchsync_types::{Schema, SessionId};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{EngineError, EngineResult};
use crate::replication::ReplicationTarget;

/// Builds a store client from validated connection settings.
pub trait StoreConnector: Send + Sync {
    fn connect(&self, settings: &ConnectionSettings) -> EngineResult<Arc<dyn RevisionStore>>;
}

/// Connects to CouchDB over HTTP.
#[derive(Debug, Clone)]
pub struct CouchConnector {
    request_timeout: Duration,
}

impl CouchConnector {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

impl StoreConnector for CouchConnector {
    fn connect(&self, settings: &ConnectionSettings) -> EngineResult<Arc<dyn RevisionStore>> {
        let client = CouchClient::with_timeout(settings.clone(), self.request_timeout)
            .map_err(|e| EngineError::Settings(e.to_string()))?;
        Ok(Arc::new(client))
    }
}

/// Hands out the same store for every connection.
pub struct FixedStore(Arc<dyn RevisionStore>);

impl FixedStore {
    pub fn new(store: Arc<dyn RevisionStore>) -> Self {
        Self(store)
    }
}

impl StoreConnector for FixedStore {
    fn connect(&self, _settings: &ConnectionSettings) -> EngineResult<Arc<dyn RevisionStore>> {
        Ok(Arc::clone(&self.0))
    }
}

/// An established connection to the configured database.
pub struct Connection {
    pub id: SessionId,
    pub settings: ConnectionSettings,
    pub store: Arc<dyn RevisionStore>,
}

impl Connection {
    pub fn new(settings: ConnectionSettings, store: Arc<dyn RevisionStore>) -> Self {
        Self {
            id: SessionId::new(),
            settings,
            store,
        }
    }

    /// The database named in the connection settings.
    pub fn database(&self) -> &str {
        &self.settings.database_name
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("settings", &self.settings)
            .field("store", &self.store.provider_name())
            .finish()
    }
}

/// Kind of write-back requested by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteMode {
    Replication(ReplicationTarget),
    /// Plain write-back; not supported by this plugin.
    Standard,
}

/// Everything a write stream needs, fixed at prepare time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSettings {
    pub schema: Schema,
    /// Per-record commit deadline. Zero disables the deadline.
    pub commit_sla_seconds: u64,
    pub mode: WriteMode,
}

impl WriteSettings {
    pub fn commit_sla(&self) -> Option<Duration> {
        (self.commit_sla_seconds > 0).then(|| Duration::from_secs(self.commit_sla_seconds))
    }

    pub fn is_replication(&self) -> bool {
        matches!(self.mode, WriteMode::Replication(_))
    }
}

/// Immutable snapshot of one session's state.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    connection: Option<Arc<Connection>>,
    write: Option<Arc<WriteSettings>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn is_write_configured(&self) -> bool {
        self.write.is_some()
    }

    pub fn connection(&self) -> EngineResult<&Arc<Connection>> {
        self.connection.as_ref().ok_or(EngineError::NotConnected)
    }

    pub fn write_settings(&self) -> EngineResult<&Arc<WriteSettings>> {
        self.write.as_ref().ok_or(EngineError::WriteNotConfigured)
    }

    /// A new context on `connection`, keeping any prepared write.
    pub fn connected(&self, connection: Connection) -> Self {
        Self {
            connection: Some(Arc::new(connection)),
            write: self.write.clone(),
        }
    }

    /// A new context with `settings` as the prepared write.
    pub fn with_write(&self, settings: WriteSettings) -> Self {
        Self {
            connection: self.connection.clone(),
            write: Some(Arc::new(settings)),
        }
    }

    /// A new context with the connection dropped.
    pub fn disconnected(&self) -> Self {
        Self {
            connection: None,
            write: self.write.clone(),
        }
    }
}
