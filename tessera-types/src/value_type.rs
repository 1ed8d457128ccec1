use serde::{Deserialize, Serialize};
use std::fmt;

/// The declared kind of an attribute.
///
/// The set is closed: attribute writes are checked with an exhaustive match
/// over these variants, and new kinds are added here rather than probed for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "entity_type")]
pub enum ValueType {
    String,
    Number,
    Boolean,
    /// Free-form JSON object.
    Object,
    /// Free-form JSON array.
    Array,
    Date,
    /// A nested entity of the named type, reconciled on deserialization.
    Entity(String),
    /// An array of nested entities of the named type.
    EntityArray(String),
}

impl ValueType {
    /// Returns the referenced entity type for nested kinds.
    #[must_use]
    pub fn entity_type(&self) -> Option<&str> {
        match self {
            Self::Entity(name) | Self::EntityArray(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("string"),
            Self::Number => f.write_str("number"),
            Self::Boolean => f.write_str("boolean"),
            Self::Object => f.write_str("object"),
            Self::Array => f.write_str("array"),
            Self::Date => f.write_str("date"),
            Self::Entity(name) => f.write_str(name),
            Self::EntityArray(name) => write!(f, "{name}[]"),
        }
    }
}
