//! Core type definitions for Tessera.
//!
//! This crate defines the building blocks shared by the model and
//! store crates:
//! - [`ValueType`]: the closed set of attribute kinds
//! - [`IdGenerator`]: random, URL-safe primary identifier generation
//! - [`ModelConfig`]: identifier format settings, loadable from JSON
//! - [`record`]: the reserved field names of the serialized record format

mod config;
mod ids;
pub mod record;
mod value_type;

pub use config::{IdFormat, ModelConfig};
pub use ids::{generate_id, IdGenerator, MIN_ID_LENGTH};
pub use value_type::ValueType;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
