//! Stored documents and the references that address them.

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use tessera_types::record;

/// A stored document: a JSON object carrying `_type` and `_id`.
pub type Document = Map<String, JsonValue>;

/// Addresses one document by `(_type, _id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentRef {
    #[serde(rename = "_type")]
    pub entity_type: String,
    #[serde(rename = "_id")]
    pub id: String,
}

impl DocumentRef {
    pub fn new(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Reads the `_type`/`_id` pair of a document.
    pub fn of(document: &Document) -> StoreResult<Self> {
        let field = |name: &str| match document.get(name) {
            Some(JsonValue::String(value)) if !value.is_empty() => Ok(value.clone()),
            Some(_) => Err(StoreError::InvalidDocument(format!(
                "'{name}' must be a non-empty string"
            ))),
            None => Err(StoreError::InvalidDocument(format!("missing '{name}' field"))),
        };
        Ok(Self {
            entity_type: field(record::TYPE)?,
            id: field(record::ID)?,
        })
    }

    /// The bare `{_type, _id}` document.
    pub fn to_document(&self) -> Document {
        let mut document = Document::new();
        document.insert(record::TYPE.to_string(), JsonValue::from(self.entity_type.as_str()));
        document.insert(record::ID.to_string(), JsonValue::from(self.id.as_str()));
        document
    }

    pub(crate) fn not_found(&self) -> StoreError {
        StoreError::DocumentNotFound {
            entity_type: self.entity_type.clone(),
            id: self.id.clone(),
        }
    }

    pub(crate) fn already_exists(&self) -> StoreError {
        StoreError::DocumentAlreadyExists {
            entity_type: self.entity_type.clone(),
            id: self.id.clone(),
        }
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.id)
    }
}

/// True for tagged scalars such as `{"_type": "Date", "_value": ..}`, which
/// are stored and compared as a whole.
pub(crate) fn is_tagged_scalar(object: &Document) -> bool {
    object.get(record::TYPE).and_then(JsonValue::as_str) == Some(record::DATE_TAG)
}

/// The `(_type, _id)` pair of an object, if both are strings.
pub(crate) fn identity_of(object: &Document) -> Option<(&str, &str)> {
    match (object.get(record::TYPE), object.get(record::ID)) {
        (Some(JsonValue::String(ty)), Some(JsonValue::String(id))) => Some((ty, id)),
        _ => None,
    }
}

/// The identity of an embedded sub-document, if it has one.
pub(crate) fn sub_document_ref(value: &JsonValue) -> Option<(&str, &str)> {
    let object = value.as_object()?;
    if is_tagged_scalar(object) {
        return None;
    }
    identity_of(object)
}
