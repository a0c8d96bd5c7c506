use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Kind of change carried by a `data-update` notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MutationType {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for MutationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationType::Insert => write!(f, "insert"),
            MutationType::Update => write!(f, "update"),
            MutationType::Delete => write!(f, "delete"),
        }
    }
}

/// Payload of the `data-update` topic: one mutation of one entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataUpdate {
    pub mutation_type: MutationType,
    /// Full entity for insert/update; at least `{ "id": … }` for delete.
    pub entity: JsonValue,
    /// Server time of the mutation, millis since Unix epoch.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Payload of the `private-update` topic: a user-scoped notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrivateUpdate {
    pub category: String,
    #[serde(default)]
    pub payload: JsonValue,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Entity identity. Numeric and string ids normalise to the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Extract the `id` field of an entity object.
    pub fn from_entity(entity: &JsonValue) -> Option<Self> {
        Self::from_value(entity.get("id")?)
    }

    pub fn from_value(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::String(s) if !s.is_empty() => Some(Self(s.clone())),
            JsonValue::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
