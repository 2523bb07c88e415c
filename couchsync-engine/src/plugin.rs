//! The plugin facade: the operations a host drives over one session.

use couchsync_store::{ConnectionSettings, DatabaseCreation};
use couchsync_types::{Record, RecordAck, Schema, WriteRecord};
use futures::Stream;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc, watch};
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::discover::SchemaDiscovery;
use crate::error::{EngineError, EngineResult};
use crate::read::ReadStreamer;
use crate::replication::{self, ConfigurationForm, ConfigurationFormResponse, ReplicationTarget};
use crate::session::{
    Connection, CouchConnector, SessionContext, StoreConnector, WriteMode, WriteSettings,
};
use crate::sla::{SlaEnforcer, WriteSummary};
use crate::write::WriteCoordinator;

/// Result of a connect attempt. Both fields empty means success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectResponse {
    pub connection_error: String,
    pub settings_error: String,
}

impl ConnectResponse {
    pub fn is_connected(&self) -> bool {
        self.connection_error.is_empty() && self.settings_error.is_empty()
    }

    fn settings_error(error: impl ToString) -> Self {
        Self {
            settings_error: error.to_string(),
            ..Default::default()
        }
    }

    fn connection_error(error: impl ToString) -> Self {
        Self {
            connection_error: error.to_string(),
            ..Default::default()
        }
    }
}

/// Which schemas to discover.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscoverMode {
    /// Discover everything in the store. Not supported.
    #[default]
    All,
    /// Discover only the schemas in `to_refresh`.
    Refresh,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoverSchemasRequest {
    pub mode: DiscoverMode,
    #[serde(default)]
    pub to_refresh: Vec<Schema>,
}

impl DiscoverSchemasRequest {
    pub fn refresh(schemas: Vec<Schema>) -> Self {
        Self {
            mode: DiscoverMode::Refresh,
            to_refresh: schemas,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrepareWriteRequest {
    pub schema: Schema,
    /// Per-record commit deadline in seconds; zero disables it.
    #[serde(default)]
    pub commit_sla_seconds: u64,
    /// Replication target; `None` requests a standard write-back.
    #[serde(default)]
    pub replication: Option<ReplicationTarget>,
}

/// A CouchDB sync plugin instance serving one host session.
pub struct Plugin {
    config: EngineConfig,
    connector: Arc<dyn StoreConnector>,
    context: RwLock<Arc<SessionContext>>,
    session: watch::Sender<u64>,
}

impl Plugin {
    /// Creates a plugin that connects to CouchDB over HTTP.
    pub fn new(config: EngineConfig) -> Self {
        let connector = Arc::new(CouchConnector::new(config.request_timeout()));
        Self::with_connector(config, connector)
    }

    /// Creates a plugin with a custom store connector.
    pub fn with_connector(config: EngineConfig, connector: Arc<dyn StoreConnector>) -> Self {
        let (session, _) = watch::channel(0);
        Self {
            config,
            connector,
            context: RwLock::new(Arc::new(SessionContext::new())),
            session,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The current session snapshot.
    pub async fn context(&self) -> Arc<SessionContext> {
        Arc::clone(&*self.context.read().await)
    }

    async fn transition(&self, f: impl FnOnce(&SessionContext) -> SessionContext) {
        let mut guard = self.context.write().await;
        let next = f(&guard);
        *guard = Arc::new(next);
    }

    /// Validates the settings JSON, connects, and checks that the
    /// configured database exists.
    pub async fn connect(&self, settings_json: &str) -> ConnectResponse {
        info!("Connecting...");

        let settings = match ConnectionSettings::from_json(settings_json)
            .and_then(|s| s.validate().map(|()| s))
        {
            Ok(settings) => settings,
            Err(e) => {
                error!("Invalid connection settings: {}", e);
                return ConnectResponse::settings_error(e);
            }
        };

        let store = match self.connector.connect(&settings) {
            Ok(store) => store,
            Err(e) => {
                error!("Failed to create store client: {}", e);
                return ConnectResponse::settings_error(e);
            }
        };

        let databases = match store.list_databases().await {
            Ok(databases) => databases,
            Err(e) => {
                error!("Failed to reach {}: {}", store.provider_name(), e);
                return ConnectResponse::connection_error(e);
            }
        };
        if !databases.iter().any(|db| *db == settings.database_name) {
            let e = EngineError::Connection(format!(
                "database {} does not exist",
                settings.database_name
            ));
            error!("{}", e);
            return ConnectResponse::connection_error(e);
        }

        let connection = Connection::new(settings, store);
        info!(session = %connection.id, "Connected to {}", connection.store.provider_name());
        self.transition(|ctx| ctx.connected(connection)).await;
        ConnectResponse::default()
    }

    /// Connects, sends the response, then waits until [`disconnect`] is
    /// called or another session is started.
    ///
    /// [`disconnect`]: Self::disconnect
    pub async fn connect_session(
        &self,
        settings_json: &str,
        responses: mpsc::Sender<ConnectResponse>,
    ) -> EngineResult<()> {
        info!("Connecting session...");

        // Releases any earlier session waiter.
        self.session.send_modify(|generation| *generation += 1);
        let mut ended = self.session.subscribe();
        ended.borrow_and_update();

        let response = self.connect(settings_json).await;
        responses
            .send(response)
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        info!("Session connected.");

        // Err only if the sender is gone, which also ends the session.
        let _ = ended.changed().await;
        info!("Session ended.");
        Ok(())
    }

    /// Discovers properties for the requested schemas.
    ///
    /// `All` mode is unsupported and returns nothing. In `Refresh` mode
    /// every schema is discovered concurrently; schemas that fail are
    /// left out of the result.
    pub async fn discover_schemas(&self, request: DiscoverSchemasRequest) -> Vec<Schema> {
        info!("Discovering Schemas...");

        if request.mode == DiscoverMode::All {
            info!("Plugin does not support auto schema discovery.");
            return Vec::new();
        }

        let ctx = self.context().await;
        let connection = match ctx.connection() {
            Ok(connection) => connection,
            Err(e) => {
                warn!("Cannot discover schemas: {}", e);
                return Vec::new();
            }
        };

        SchemaDiscovery::new(
            Arc::clone(&connection.store),
            connection.database(),
            self.config.discovery_sample_size,
        )
        .discover_all(&request.to_refresh)
        .await
    }

    /// Streams the documents selected by `schema`.
    pub async fn read_stream(
        &self,
        schema: &Schema,
        limit: Option<u32>,
    ) -> BoxStream<'static, EngineResult<Record>> {
        info!(schema = %schema.name, "Publishing records for schema");

        let ctx = self.context().await;
        match ctx.connection() {
            Ok(connection) => {
                ReadStreamer::new(Arc::clone(&connection.store), connection.database())
                    .stream(schema, limit)
            }
            Err(e) => stream::once(async move { Err::<Record, _>(e) }).boxed(),
        }
    }

    /// Streams the documents selected by `schema` into `sink`.
    pub async fn read_into(
        &self,
        schema: &Schema,
        limit: Option<u32>,
        sink: &mpsc::Sender<Record>,
    ) -> EngineResult<usize> {
        let ctx = self.context().await;
        let connection = ctx.connection()?;
        ReadStreamer::new(Arc::clone(&connection.store), connection.database())
            .read_into(schema, limit, sink)
            .await
    }

    /// Builds the replication form for `schema`.
    pub fn configure_replication(
        &self,
        schema: &Schema,
        form: &ConfigurationForm,
    ) -> ConfigurationFormResponse {
        replication::configure_replication(schema, form)
    }

    /// Stores the write settings and, for replication, creates the target
    /// database.
    pub async fn prepare_write(&self, request: PrepareWriteRequest) -> EngineResult<()> {
        info!(schema = %request.schema.name, "Preparing write...");

        let mode = match request.replication {
            Some(target) => {
                let ctx = self.context().await;
                let connection = ctx.connection()?;
                let database = target.database();
                info!("Creating database {} for replication", database);
                match connection.store.create_database(&database).await? {
                    DatabaseCreation::Created => info!("Created database {}", database),
                    DatabaseCreation::AlreadyExists => {
                        info!("Database {} already exists", database)
                    }
                }
                WriteMode::Replication(target)
            }
            None => WriteMode::Standard,
        };

        let settings = WriteSettings {
            schema: request.schema,
            commit_sla_seconds: request.commit_sla_seconds,
            mode,
        };
        self.transition(|ctx| ctx.with_write(settings)).await;
        info!("Write prepared.");
        Ok(())
    }

    /// Writes `records` to the prepared replication target, sending one
    /// ack per record to `acks` in input order.
    ///
    /// Per-record failures are reported on the ack. The stream itself fails
    /// only when the plugin is not connected, no write was prepared, the
    /// prepared write is not a replication, or `acks` is closed.
    pub async fn write_stream<S>(
        &self,
        records: S,
        acks: mpsc::Sender<RecordAck>,
    ) -> EngineResult<WriteSummary>
    where
        S: Stream<Item = WriteRecord>,
    {
        info!("Writing records to CouchDB...");

        let ctx = self.context().await;
        let connection = ctx.connection()?;
        let write = ctx.write_settings()?;
        let WriteMode::Replication(target) = &write.mode else {
            error!("Only replication writebacks are supported");
            return Err(EngineError::UnsupportedWriteMode);
        };

        let coordinator = WriteCoordinator::new(
            Arc::clone(&connection.store),
            write.schema.clone(),
            target.clone(),
        );
        let coordinator = &coordinator;
        let enforcer = SlaEnforcer::new(write.commit_sla(), self.config.write_concurrency());

        enforcer
            .run(
                records,
                |record| async move { coordinator.write(&record).await },
                &acks,
            )
            .await
    }

    /// Drops the connection and ends any waiting session.
    pub async fn disconnect(&self) {
        self.transition(SessionContext::disconnected).await;
        self.session.send_modify(|generation| *generation += 1);
        info!("Disconnected");
    }
}
