//! Polymorphic business-entity reference and submission snapshot.
//!
//! The engine never holds a foreign key into collaborator tables. An entity is
//! identified by a (model tag, id) pair, and the attributes relevant to the
//! approval are captured as a JSON snapshot at submission time so callbacks and
//! branch conditions can read them without a live join.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reference to a business entity owned by a collaborator module.
///
/// `model` is a free-form tag (`customer`, `contract`, `seal_usage`, ...);
/// new entity types require no engine changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub model: String,
    pub id: String,
}

impl EntityRef {
    pub fn new(model: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            id: id.into(),
        }
    }
}

impl core::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.model, self.id)
    }
}

/// Immutable attribute snapshot captured when an entity is submitted.
///
/// Readers must tolerate missing keys: collaborators own the shape, and older
/// snapshots may predate newly added fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntitySnapshot(Map<String, Value>);

impl EntitySnapshot {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Read a string attribute; `None` when absent or not a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Read a numeric attribute; `None` when absent or not a number.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    /// Read a boolean attribute; `None` when absent or not a bool.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}
