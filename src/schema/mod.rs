//! Schema model for reference-aware sampling.
//!
//! This module provides:
//! - Data models for entities, fields and their reference kinds
//! - Row and primary key value types shared by stores and the sampler
//! - Dependency graph construction (forward and reverse reference mappings)

mod graph;

pub use graph::*;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for an entity within a schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

/// How a multi-valued reference is materialized
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Through {
    /// Auto-created join holding nothing but the two links
    Implicit,
    /// User-defined through entity carrying extra attributes
    Entity(String),
}

/// Field kind classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Plain value
    Scalar,
    /// Single-valued reference to another entity's primary key
    Reference { target: String },
    /// Multi-valued reference to another entity
    MultiReference { target: String, through: Through },
}

/// Field definition within an entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field name (column name for table-backed stores)
    pub name: String,
    /// Field kind
    pub kind: FieldKind,
}

impl Field {
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Scalar,
        }
    }

    pub fn reference(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Reference {
                target: target.into(),
            },
        }
    }

    pub fn many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::MultiReference {
                target: target.into(),
                through: Through::Implicit,
            },
        }
    }

    pub fn many_through(
        name: impl Into<String>,
        target: impl Into<String>,
        through: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::MultiReference {
                target: target.into(),
                through: Through::Entity(through.into()),
            },
        }
    }

    /// Referenced entity name, if this is a reference field
    pub fn target(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::Scalar => None,
            FieldKind::Reference { target } | FieldKind::MultiReference { target, .. } => {
                Some(target)
            }
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(self.kind, FieldKind::MultiReference { .. })
    }
}

/// Complete entity definition
#[derive(Debug, Clone)]
pub struct EntitySchema {
    /// Entity name
    pub name: String,
    /// Entity ID within the schema
    pub id: EntityId,
    /// Name of the primary key field
    pub primary_key: String,
    /// Field definitions in order (the primary key is a scalar field)
    pub fields: Vec<Field>,
    /// Derived/read-only view of other entities
    pub is_view: bool,
}

impl EntitySchema {
    /// Create a new entity with only its primary key field
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        let primary_key = primary_key.into();
        Self {
            name: name.into(),
            id: EntityId(0),
            fields: vec![Field::scalar(primary_key.clone())],
            primary_key,
            is_view: false,
        }
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn as_view(mut self) -> Self {
        self.is_view = true;
        self
    }

    /// Get a field by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Iterate over reference fields (single and multi)
    pub fn reference_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.target().is_some())
    }
}

/// Complete database schema
#[derive(Debug, Default)]
pub struct Schema {
    /// Map from entity name to entity ID
    pub entities: AHashMap<String, EntityId>,
    /// Entity schemas indexed by EntityId
    pub entity_schemas: Vec<EntitySchema>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new entity, returning its ID
    pub fn add_entity(&mut self, mut entity: EntitySchema) -> EntityId {
        let id = EntityId(self.entity_schemas.len() as u32);
        entity.id = id;
        self.entities.insert(entity.name.clone(), id);
        self.entity_schemas.push(entity);
        id
    }

    /// Get entity ID by name (exact match first, then case-insensitive)
    pub fn entity_id(&self, name: &str) -> Option<EntityId> {
        if let Some(&id) = self.entities.get(name) {
            return Some(id);
        }
        self.entities
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, &id)| id)
    }

    /// Get entity schema by ID
    pub fn entity(&self, id: EntityId) -> Option<&EntitySchema> {
        self.entity_schemas.get(id.0 as usize)
    }

    /// Get entity schema by name
    pub fn get_entity(&self, name: &str) -> Option<&EntitySchema> {
        self.entity_id(name).and_then(|id| self.entity(id))
    }

    /// Entity name for an ID, or a placeholder for unknown IDs
    pub fn name(&self, id: EntityId) -> &str {
        self.entity(id).map(|e| e.name.as_str()).unwrap_or("<unknown>")
    }

    pub fn len(&self) -> usize {
        self.entity_schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entity_schemas.is_empty()
    }

    /// Iterate over all entity schemas in catalog order
    pub fn iter(&self) -> impl Iterator<Item = &EntitySchema> {
        self.entity_schemas.iter()
    }
}

/// Primary key value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PkValue {
    Int(i64),
    Text(String),
}

impl PkValue {
    /// Interpret a JSON value as a key; null and structured values are not keys
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_i64().map(PkValue::Int),
            serde_json::Value::String(s) => Some(PkValue::Text(s.clone())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PkValue::Int(i) => serde_json::Value::from(*i),
            PkValue::Text(s) => serde_json::Value::from(s.as_str()),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PkValue::Int(i) => Some(*i),
            PkValue::Text(_) => None,
        }
    }
}

impl fmt::Display for PkValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PkValue::Int(i) => write!(f, "{}", i),
            PkValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for PkValue {
    fn from(value: i64) -> Self {
        PkValue::Int(value)
    }
}

impl From<&str> for PkValue {
    fn from(value: &str) -> Self {
        PkValue::Text(value.to_string())
    }
}

/// A record of one entity. Field values are opaque to the sampler except for
/// reference fields, which hold a key (single) or an array of keys (multi).
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub entity: EntityId,
    pub pk: PkValue,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl Row {
    pub fn new(entity: EntityId, pk: impl Into<PkValue>) -> Self {
        Self {
            entity,
            pk: pk.into(),
            fields: serde_json::Map::new(),
        }
    }

    pub fn with(mut self, field: &str, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    /// Key held by a single-reference field; None when null or absent
    pub fn reference(&self, field: &str) -> Option<PkValue> {
        self.fields.get(field).and_then(PkValue::from_json)
    }

    /// Keys held by a multi-reference field
    pub fn references(&self, field: &str) -> Vec<PkValue> {
        match self.fields.get(field) {
            Some(serde_json::Value::Array(values)) => {
                values.iter().filter_map(PkValue::from_json).collect()
            }
            Some(value) => PkValue::from_json(value).into_iter().collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_lookup_is_case_insensitive() {
        let mut schema = Schema::new();
        let id = schema.add_entity(EntitySchema::new("auth_user", "id"));
        assert_eq!(schema.entity_id("auth_user"), Some(id));
        assert_eq!(schema.entity_id("AUTH_USER"), Some(id));
        assert_eq!(schema.entity_id("missing"), None);
    }

    #[test]
    fn test_row_references() {
        let row = Row::new(EntityId(0), 1)
            .with("author", 7)
            .with("editor", serde_json::Value::Null)
            .with("tags", serde_json::json!([1, 2, "x"]));
        assert_eq!(row.reference("author"), Some(PkValue::Int(7)));
        assert_eq!(row.reference("editor"), None);
        assert_eq!(row.reference("missing"), None);
        assert_eq!(
            row.references("tags"),
            vec![PkValue::Int(1), PkValue::Int(2), PkValue::from("x")]
        );
    }
}
