//! Connection settings for the target store.

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Where and as whom to connect.
///
/// Deserializes from the host's settings JSON; the PascalCase keys the
/// host sends (`Hostname`, `DatabaseName`, ...) are accepted as aliases.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// `host:port`, optionally with an `http://` or `https://` scheme.
    #[serde(alias = "Hostname", default)]
    pub hostname: String,
    #[serde(alias = "Username", default)]
    pub username: String,
    #[serde(alias = "Password", default)]
    pub password: String,
    #[serde(alias = "DatabaseName", default)]
    pub database_name: String,
}

impl ConnectionSettings {
    pub fn new(
        hostname: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        database_name: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            username: username.into(),
            password: password.into(),
            database_name: database_name.into(),
        }
    }

    /// Parses settings from the host's JSON settings blob.
    pub fn from_json(json: &str) -> StoreResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| StoreError::Config(format!("invalid settings JSON: {e}")))
    }

    /// Checks that every field is set.
    pub fn validate(&self) -> StoreResult<()> {
        if self.hostname.trim().is_empty() {
            return Err(StoreError::Config("the Hostname property must be set".into()));
        }
        if self.username.is_empty() {
            return Err(StoreError::Config("the Username property must be set".into()));
        }
        if self.password.is_empty() {
            return Err(StoreError::Config("the Password property must be set".into()));
        }
        if self.database_name.trim().is_empty() {
            return Err(StoreError::Config("the DatabaseName property must be set".into()));
        }
        Ok(())
    }

    /// Base URL of the store, without a trailing slash.
    /// Bare hosts default to plain `http://`.
    pub fn base_url(&self) -> String {
        let host = self.hostname.trim().trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("http://{host}")
        }
    }
}

impl std::fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("hostname", &self.hostname)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database_name", &self.database_name)
            .finish()
    }
}
