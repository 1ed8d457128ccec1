//! Options and queries accepted by [`DocumentStore`](crate::DocumentStore).
//!
//! Every option struct defaults to the strict behavior: missing or
//! already-existing documents are errors unless explicitly tolerated.

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use tessera_types::record;

/// Field selection for loaded and found documents.
///
/// `_type` and `_id` are always kept, at every nesting level. An empty
/// projection returns only those two fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "JsonValue", into = "JsonValue")]
pub struct Projection {
    fields: BTreeMap<String, Option<Projection>>,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Includes a whole field.
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.insert(name.into(), None);
        self
    }

    /// Includes selected fields of an embedded document or array of documents.
    pub fn nested(mut self, name: impl Into<String>, projection: Projection) -> Self {
        self.fields.insert(name.into(), Some(projection));
        self
    }

    /// Parses `{"title": true, "director": {"name": true}}`.
    /// Fields set to `false` are left out.
    pub fn from_json(value: &JsonValue) -> StoreResult<Self> {
        let object = value.as_object().ok_or_else(|| {
            StoreError::InvalidQuery("a projection must be an object".to_string())
        })?;
        let mut projection = Self::new();
        for (name, selection) in object {
            match selection {
                JsonValue::Bool(true) => projection = projection.field(name.as_str()),
                JsonValue::Bool(false) => {}
                JsonValue::Object(_) => {
                    projection = projection.nested(name.as_str(), Self::from_json(selection)?);
                }
                other => {
                    return Err(StoreError::InvalidQuery(format!(
                        "projection of '{name}' must be a boolean or an object, found {other}"
                    )));
                }
            }
        }
        Ok(projection)
    }

    /// Applies the projection to a document.
    pub fn apply(&self, document: &Map<String, JsonValue>) -> Map<String, JsonValue> {
        let mut out = Map::new();
        for key in [record::TYPE, record::ID] {
            if let Some(value) = document.get(key) {
                out.insert(key.to_string(), value.clone());
            }
        }
        for (name, nested) in &self.fields {
            let Some(value) = document.get(name) else {
                continue;
            };
            let projected = match nested {
                None => value.clone(),
                Some(projection) => projection.apply_value(value),
            };
            out.insert(name.clone(), projected);
        }
        out
    }

    fn apply_value(&self, value: &JsonValue) -> JsonValue {
        match value {
            JsonValue::Object(object) => JsonValue::Object(self.apply(object)),
            JsonValue::Array(items) => {
                JsonValue::Array(items.iter().map(|item| self.apply_value(item)).collect())
            }
            other => other.clone(),
        }
    }
}

impl TryFrom<JsonValue> for Projection {
    type Error = StoreError;

    fn try_from(value: JsonValue) -> StoreResult<Self> {
        Self::from_json(&value)
    }
}

impl From<Projection> for JsonValue {
    fn from(projection: Projection) -> Self {
        let object = projection
            .fields
            .into_iter()
            .map(|(name, nested)| {
                let selection = nested.map_or(JsonValue::Bool(true), JsonValue::from);
                (name, selection)
            })
            .collect();
        JsonValue::Object(object)
    }
}

/// Options for [`DocumentStore::load`](crate::DocumentStore::load).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    pub fields: Option<Projection>,
    /// When false, a missing document comes back as `{_type, _id, _missed: true}`.
    pub throw_if_not_found: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            fields: None,
            throw_if_not_found: true,
        }
    }
}

/// Options for [`DocumentStore::save`](crate::DocumentStore::save).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveOptions {
    /// Reject updates of documents that do not exist. When false, the
    /// document is created and acknowledged with `_missed: true`.
    pub throw_if_not_found: bool,
    /// Reject `_new` documents that already exist. When false, the existing
    /// document is updated and acknowledged with `_existed: true`.
    pub throw_if_already_exists: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            throw_if_not_found: true,
            throw_if_already_exists: true,
        }
    }
}

/// Options for [`DocumentStore::delete`](crate::DocumentStore::delete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteOptions {
    pub throw_if_not_found: bool,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        Self {
            throw_if_not_found: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// One sort criterion. `path` may be dotted to reach embedded fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub path: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortKey {
    pub fn ascending(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// Options for [`DocumentStore::find`](crate::DocumentStore::find).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FindOptions {
    /// Applied in order; later keys break ties of earlier ones.
    pub sort: Vec<SortKey>,
    pub skip: Option<usize>,
    /// `Some(0)` means no limit.
    pub limit: Option<usize>,
    pub fields: Option<Projection>,
}

/// Selects documents of one type whose fields equal the filter values.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub entity_type: String,
    /// Dotted path → expected value.
    pub filter: Map<String, JsonValue>,
}

impl Query {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            filter: Map::new(),
        }
    }

    /// Adds an equality condition.
    pub fn filter(mut self, path: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.filter.insert(path.into(), value.into());
        self
    }

    /// Parses `{"_type": "movie", "genre": "drama", "director.name": "Ridley"}`.
    pub fn from_json(value: &JsonValue) -> StoreResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| StoreError::InvalidQuery("a query must be an object".to_string()))?;
        let entity_type = match object.get(record::TYPE) {
            Some(JsonValue::String(name)) if !name.is_empty() => name.clone(),
            _ => {
                return Err(StoreError::InvalidQuery(format!(
                    "a query needs a non-empty '{}' string",
                    record::TYPE
                )));
            }
        };
        let filter = object
            .iter()
            .filter(|(path, _)| path.as_str() != record::TYPE)
            .map(|(path, value)| (path.clone(), value.clone()))
            .collect();
        Ok(Self {
            entity_type,
            filter,
        })
    }
}
