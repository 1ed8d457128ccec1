use crate::entity::Entity;
use crate::error::ModelError;
use chrono::{DateTime, Utc};
use serde_json::Map;

/// A value held by an entity attribute.
///
/// Free-form objects and arrays carry JSON. Nested entities are held by
/// shared handle, so two parents referencing the same identity point at the
/// same instance.
#[derive(Debug, Clone)]
pub enum Value {
    String(String),
    Number(f64),
    Boolean(bool),
    Object(Map<String, serde_json::Value>),
    Array(Vec<serde_json::Value>),
    Date(DateTime<Utc>),
    Entity(Entity),
    EntityArray(Vec<Entity>),
}

impl Value {
    /// Name of the runtime kind, as reported in type mismatch errors.
    pub fn kind(&self) -> &str {
        match self {
            Self::String(_) => "string",
            Self::Number(_) => "number",
            Self::Boolean(_) => "boolean",
            Self::Object(_) => "object",
            Self::Array(_) => "array",
            Self::Date(_) => "date",
            Self::Entity(entity) => entity.type_name(),
            Self::EntityArray(_) => "array",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Self::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_entities(&self) -> Option<&[Entity]> {
        match self {
            Self::EntityArray(v) => Some(v),
            _ => None,
        }
    }
}

// Nested entities compare by identity, everything else structurally.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            (Self::Entity(a), Self::Entity(b)) => a == b,
            (Self::EntityArray(a), Self::EntityArray(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

/// Largest magnitude an `f64` holds with every integer below it exact.
const MAX_EXACT_INTEGER: i64 = 1 << 53;

impl TryFrom<i64> for Value {
    type Error = ModelError;

    fn try_from(n: i64) -> Result<Self, Self::Error> {
        if (-MAX_EXACT_INTEGER..=MAX_EXACT_INTEGER).contains(&n) {
            Ok(Self::Number(n as f64))
        } else {
            Err(ModelError::InexactNumber(n))
        }
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Self::Date(d)
    }
}

impl From<Entity> for Value {
    fn from(e: Entity) -> Self {
        Self::Entity(e)
    }
}

impl From<Vec<Entity>> for Value {
    fn from(v: Vec<Entity>) -> Self {
        Self::EntityArray(v)
    }
}

impl From<Map<String, serde_json::Value>> for Value {
    fn from(m: Map<String, serde_json::Value>) -> Self {
        Self::Object(m)
    }
}

impl From<Vec<serde_json::Value>> for Value {
    fn from(v: Vec<serde_json::Value>) -> Self {
        Self::Array(v)
    }
}
