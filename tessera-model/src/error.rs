//! Error types for the entity model.

use std::fmt;
use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// The identifier role a lookup asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierExpectation {
    Any,
    Primary,
    Secondary,
}

impl fmt::Display for IdentifierExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("an identifier attribute"),
            Self::Primary => f.write_str("a primary identifier attribute"),
            Self::Secondary => f.write_str("a secondary identifier attribute"),
        }
    }
}

/// Errors raised by attribute writes, type declarations, the identity map
/// and reconciliation. All of them are synchronous and never retried.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A value does not match the declared kind, or a required value is unset.
    #[error(
        "Cannot assign a value of an unexpected type to the attribute '{attribute}' (expected type: '{expected}', received type: '{received}')"
    )]
    TypeMismatch {
        attribute: String,
        expected: String,
        received: String,
    },

    #[error("The property '{property}' doesn't exist in the entity '{entity_type}'")]
    UnknownProperty {
        entity_type: String,
        property: String,
    },

    #[error("The property '{property}' exists, but it is not {expected}")]
    NotAnIdentifierAttribute {
        property: String,
        expected: IdentifierExpectation,
    },

    #[error("The entity '{entity_type}' doesn't have a primary identifier attribute")]
    NoPrimaryIdentifierDeclared { entity_type: String },

    #[error("The entity '{entity_type}' has already a primary identifier attribute")]
    PrimaryIdentifierAlreadyDeclared { entity_type: String },

    #[error("The property '{property}' is already declared in the entity '{entity_type}'")]
    DuplicateAttribute {
        entity_type: String,
        property: String,
    },

    #[error("Duplicate value found in an identifier attribute (attribute name: '{attribute}')")]
    DuplicateIdentifierValue { attribute: String, value: String },

    #[error(
        "Cannot instantiate a new entity when an existing entity with a matching identifier is not new (entity: '{entity_type}')"
    )]
    NewInstanceConflict { entity_type: String },

    #[error("The '{0}' entity belongs to another identity map")]
    ForeignEntity(String),

    #[error("The entity type '{0}' is already registered")]
    DuplicateEntityType(String),

    #[error("Unknown entity type: '{0}'")]
    UnknownEntityType(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// An integer outside the range a number attribute stores exactly.
    #[error("The integer {0} cannot be stored exactly in a number attribute")]
    InexactNumber(i64),

    #[error(transparent)]
    Types(#[from] tessera_types::Error),
}
