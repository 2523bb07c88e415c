//! Replication write-back target and its configuration form.
//!
//! The host renders a JSON-schema form from [`schema_json`] and
//! [`ui_json`], and sends the filled-in values back as [`ReplicationTarget`]
//! settings JSON.

use couchsync_types::Schema;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::LazyLock;
use tracing::{info, warn};

/// Primary-key option meaning "use the record id as the document key".
pub const AUTO_GENERATE_KEY: &str = "auto generate unique id";

const DATABASE_NAME_FIELD: &str = "DatabaseName";
const PRIMARY_KEY_FIELD: &str = "PrimaryKey";

static DATABASE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9_$()+\-/]+$").expect("database name pattern is valid")
});

/// How a written document's key is chosen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PrimaryKey {
    /// Use the record id verbatim.
    #[default]
    AutoGenerate,
    /// Use the value of the property with this id.
    Property(String),
}

impl From<String> for PrimaryKey {
    fn from(value: String) -> Self {
        if value == AUTO_GENERATE_KEY {
            PrimaryKey::AutoGenerate
        } else {
            PrimaryKey::Property(value)
        }
    }
}

impl From<&str> for PrimaryKey {
    fn from(value: &str) -> Self {
        PrimaryKey::from(value.to_string())
    }
}

impl From<PrimaryKey> for String {
    fn from(key: PrimaryKey) -> Self {
        match key {
            PrimaryKey::AutoGenerate => AUTO_GENERATE_KEY.to_string(),
            PrimaryKey::Property(id) => id,
        }
    }
}

/// Where replicated records are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationTarget {
    #[serde(rename = "DatabaseName", alias = "database_name", default)]
    pub database_name: String,
    #[serde(rename = "PrimaryKey", alias = "primary_key", default)]
    pub primary_key: PrimaryKey,
}

impl ReplicationTarget {
    pub fn new(database_name: impl Into<String>, primary_key: impl Into<PrimaryKey>) -> Self {
        Self {
            database_name: database_name.into(),
            primary_key: primary_key.into(),
        }
    }

    /// Parses the form data the host sends back.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Target database name with all whitespace removed.
    pub fn database(&self) -> String {
        self.database_name
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect()
    }
}

/// Returns true if `name` is acceptable as a CouchDB database name:
/// lowercase letters, digits and `_$()+-/`, starting with a letter.
pub fn is_valid_database_name(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_lowercase()) && DATABASE_NAME.is_match(name)
}

/// JSON schema of the replication form for `schema`.
pub fn schema_json(schema: &Schema) -> Value {
    let mut key_ids = vec![AUTO_GENERATE_KEY.to_string()];
    let mut key_names = vec![AUTO_GENERATE_KEY.to_string()];
    for property in &schema.properties {
        key_ids.push(property.id.clone());
        key_names.push(property.name.clone());
    }

    json!({
        "type": "object",
        "properties": {
            (DATABASE_NAME_FIELD): {
                "type": "string",
                "title": "Database Name",
                "description": "Name for your data source in CouchDB",
            },
            (PRIMARY_KEY_FIELD): {
                "type": "string",
                "title": "Primary Key",
                "description": "Property whose value becomes the document id",
                "enum": key_ids,
                "enumNames": key_names,
                "default": AUTO_GENERATE_KEY,
            },
        },
        "required": [DATABASE_NAME_FIELD, PRIMARY_KEY_FIELD],
    })
}

/// Field ordering hints for the replication form.
pub fn ui_json() -> Value {
    json!({ "ui:order": [DATABASE_NAME_FIELD, PRIMARY_KEY_FIELD] })
}

/// Current state of the host's configuration form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationForm {
    #[serde(default)]
    pub data_json: String,
    #[serde(default)]
    pub state_json: String,
}

/// Form definition plus validation errors, returned to the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationFormResponse {
    pub schema_json: String,
    pub ui_json: String,
    pub data_json: String,
    pub state_json: String,
    pub errors: Vec<String>,
}

/// Builds the replication form for `schema` and validates the values
/// already entered.
pub fn configure_replication(schema: &Schema, form: &ConfigurationForm) -> ConfigurationFormResponse {
    info!(schema = %schema.name, "Configuring write for schema");

    let errors = validate_form(schema, &form.data_json);
    for error in &errors {
        warn!(schema = %schema.name, "Replication form error: {}", error);
    }

    ConfigurationFormResponse {
        schema_json: schema_json(schema).to_string(),
        ui_json: ui_json().to_string(),
        data_json: form.data_json.clone(),
        state_json: form.state_json.clone(),
        errors,
    }
}

fn validate_form(schema: &Schema, data_json: &str) -> Vec<String> {
    if data_json.trim().is_empty() {
        return Vec::new();
    }
    let data: Value = match serde_json::from_str(data_json) {
        Ok(data) => data,
        Err(e) => return vec![format!("form data is not valid JSON: {e}")],
    };

    let mut errors = Vec::new();

    let database_name = data
        .get(DATABASE_NAME_FIELD)
        .and_then(Value::as_str)
        .unwrap_or_default();
    if !database_name.is_empty() && !is_valid_database_name(database_name) {
        errors.push(format!("Not a valid database name: {database_name}"));
    }

    if let Some(key) = data.get(PRIMARY_KEY_FIELD).and_then(Value::as_str) {
        let known = key == AUTO_GENERATE_KEY || schema.property_by_id(key).is_some();
        if !key.is_empty() && !known {
            errors.push(format!("Unknown primary key property: {key}"));
        }
    }

    errors
}
