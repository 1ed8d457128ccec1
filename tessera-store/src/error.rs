//! Error types for the storage layer.

use tessera_model::ModelError;
use thiserror::Error;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A loaded, updated or deleted document does not exist.
    #[error("Document not found (type: '{entity_type}', id: '{id}')")]
    DocumentNotFound { entity_type: String, id: String },

    /// A document flagged `_new` already exists.
    #[error("Document already exists (type: '{entity_type}', id: '{id}')")]
    DocumentAlreadyExists { entity_type: String, id: String },

    /// A document is missing `_type`/`_id` or carries malformed markers.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// A query or its options cannot be evaluated.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Reconciliation or serialization of an entity failed.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
