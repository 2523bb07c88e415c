//! Sync engine between tabular records and a CouchDB database.
//!
//! # Architecture
//!
//! - **Discovery** ([`discover`]): samples the documents a schema's query
//!   selects and infers one typed property per field.
//! - **Reads** ([`read`]): runs a schema's query and streams every returned
//!   document as an upsert [`Record`](couchsync_types::Record).
//! - **Writes** ([`write`], [`sla`]): resolves each record's document key,
//!   looks the document up, and creates, updates or deletes it with the
//!   fetched revision token, each under a commit deadline. Acks come back
//!   in input order.
//! - **Session** ([`session`], [`plugin`]): the [`Plugin`] facade holds an
//!   immutable [`SessionContext`] snapshot that connect, prepare-write and
//!   disconnect replace as a whole.
//!
//! # Example
//!
//! ```no_run
//! use couchsync_engine::{DiscoverSchemasRequest, EngineConfig, Plugin};
//! use couchsync_types::Schema;
//!
//! # async fn run() {
//! let plugin = Plugin::new(EngineConfig::default());
//! let response = plugin
//!     .connect(r#"{"Hostname": "localhost:5984", "Username": "admin",
//!                  "Password": "secret", "DatabaseName": "books"}"#)
//!     .await;
//! assert!(response.is_connected());
//!
//! let schema = Schema::new("books", "Books", r#"{"selector": {}}"#);
//! let schemas = plugin
//!     .discover_schemas(DiscoverSchemasRequest::refresh(vec![schema]))
//!     .await;
//! println!("{} properties", schemas[0].properties.len());
//! # }
//! ```

mod config;
pub mod discover;
mod error;
pub mod plugin;
pub mod read;
pub mod replication;
pub mod session;
pub mod sla;
pub mod write;

pub use config::{DEFAULT_DISCOVERY_SAMPLE_SIZE, EngineConfig};
pub use discover::{SchemaDiscovery, TypeTally};
pub use error::{EngineError, EngineResult};
pub use plugin::{
    ConnectResponse, DiscoverMode, DiscoverSchemasRequest, Plugin, PrepareWriteRequest,
};
pub use read::ReadStreamer;
pub use replication::{
    AUTO_GENERATE_KEY, ConfigurationForm, ConfigurationFormResponse, PrimaryKey, ReplicationTarget,
};
pub use session::{
    Connection, CouchConnector, FixedStore, SessionContext, StoreConnector, WriteMode,
    WriteSettings,
};
pub use sla::{SlaEnforcer, WriteSummary};
pub use write::{WriteAction, WriteCoordinator, WriteOutcome};
