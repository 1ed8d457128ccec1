//! Entity model for Tessera.
//!
//! Guarantees that a process never holds two live in-memory instances of the
//! same logical record:
//! - [`EntityType`]: declared attributes, one optional primary identifier
//!   and any number of secondary identifiers, in declaration order
//! - [`Schema`]: the registered, frozen entity types
//! - [`Entity`]: a live instance; attribute writes are validated and
//!   identifier writes keep the identity map current
//! - [`IdentityMap`]: `(type, identifier, value)` → the one live instance
//! - [`Reconciler`]: turns serialized records into tracked instances
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::json;
//! use tessera_model::{EntityType, IdentityMap, Reconciler, Schema};
//!
//! let mut user = EntityType::new("user");
//! user.declare_primary_identifier("id").unwrap();
//! user.declare_secondary_identifier("email").unwrap();
//!
//! let schema = Schema::new().with_type(user).unwrap();
//! let reconciler = Reconciler::new(Arc::new(schema), Arc::new(IdentityMap::new()));
//!
//! let a = reconciler.reconcile(&json!({"_type": "user", "id": "abc123"})).unwrap();
//! let b = reconciler.reconcile(&json!({"_type": "user", "id": "abc123"})).unwrap();
//! assert_eq!(a, b);
//! ```

mod attribute;
mod entity;
mod entity_type;
mod error;
mod identity_map;
mod reconciler;
mod schema;
mod value;

pub use attribute::{Attribute, AttributeRole, IdentifierKind};
pub use entity::Entity;
pub use entity_type::EntityType;
pub use error::{IdentifierExpectation, ModelError, ModelResult};
pub use identity_map::{IdentityKey, IdentityMap};
pub use reconciler::Reconciler;
pub use schema::Schema;
pub use value::Value;

pub use tessera_types::{IdFormat, ModelConfig, ValueType};
