//! Client for a revision-checked (MVCC) document store.
//!
//! The [`RevisionStore`] trait is the only surface the sync engine talks to.
//! [`CouchClient`] implements it over the CouchDB HTTP API; the in-memory
//! [`mock::MemoryStore`] implements it for tests.
//!
//! # Example
//!
//! ```no_run
//! use couchsync_store::{ConnectionSettings, CouchClient, RevisionStore, StoreQuery};
//!
//! # async fn run() -> couchsync_store::StoreResult<()> {
//! let settings = ConnectionSettings::new("localhost:5984", "admin", "secret", "books");
//! let client = CouchClient::new(settings)?;
//! let docs = client.find("books", &StoreQuery::match_all()).await?;
//! println!("{} documents", docs.len());
//! # Ok(())
//! # }
//! ```

mod couch;
mod error;
pub mod mock;
mod query;
mod settings;
mod store;

pub use couch::{CouchClient, DEFAULT_REQUEST_TIMEOUT};
pub use error::{StoreError, StoreResult};
pub use query::{QueryError, StoreQuery, with_reserved_fields};
pub use settings::ConnectionSettings;
pub use store::{DatabaseCreation, RevisionStore};
