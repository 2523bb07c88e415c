use serde::{Deserialize, Serialize};

/// A tabular view over a set of store documents.
///
/// The `query` selects which documents belong to the schema; `properties`
/// are filled in by discovery and stay fixed for the rest of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub properties: Vec<Property>,
    /// Opaque selection query (a JSON `_find` body or bare selector).
    #[serde(default)]
    pub query: String,
}

impl Schema {
    /// Creates a schema with no properties yet.
    pub fn new(id: impl Into<String>, name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            properties: Vec::new(),
            query: query.into(),
        }
    }

    /// Adds a property (builder style).
    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    /// Returns true if discovery has already populated this schema.
    pub fn has_properties(&self) -> bool {
        !self.properties.is_empty()
    }

    /// Returns false if the selection query is empty or whitespace.
    pub fn has_query(&self) -> bool {
        !self.query.trim().is_empty()
    }

    pub fn property_by_id(&self, id: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.id == id)
    }

    /// Store field names of all properties, in schema order.
    pub fn property_names(&self) -> Vec<String> {
        self.properties.iter().map(|p| p.name.clone()).collect()
    }
}

/// One column of a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    /// Key used to look up the value inside a record's data.
    pub id: String,
    /// Human-facing name; also the store's field name.
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    #[serde(default)]
    pub is_key: bool,
    #[serde(default)]
    pub is_create_counter: bool,
    #[serde(default)]
    pub is_update_counter: bool,
}

impl Property {
    pub fn new(id: impl Into<String>, name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            property_type,
            is_key: false,
            is_create_counter: false,
            is_update_counter: false,
        }
    }

    /// Shorthand for a property discovered from a document field:
    /// id and name are both the field name, all flags off.
    pub fn discovered(field: &str, property_type: PropertyType) -> Self {
        Self::new(field, field, property_type)
    }

    /// Marks the property as a key (builder style).
    pub fn key(mut self) -> Self {
        self.is_key = true;
        self
    }
}

/// Semantic type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    String,
    Integer,
    Float,
    Bool,
    Datetime,
}

impl PropertyType {
    /// Classification order used by type inference.
    pub const PRIORITY: [PropertyType; 5] = [
        PropertyType::Bool,
        PropertyType::Integer,
        PropertyType::Float,
        PropertyType::Datetime,
        PropertyType::String,
    ];
}
