//! Document storage for Tessera.
//!
//! - [`DocumentStore`]: the contract a storage backend fulfils: batch
//!   load/save/delete addressed by `(_type, _id)` plus typed queries
//! - [`MemoryStore`]: an in-memory backend implementing the full contract
//! - [`Repository`]: saves live entities and reconciles loaded documents
//!   back into the identity map
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tessera_model::{EntityType, IdentityMap, Reconciler, Schema, ValueType};
//! use tessera_store::{MemoryStore, Repository};
//!
//! let mut movie = EntityType::new("movie");
//! movie.declare_primary_identifier("id").unwrap();
//! movie.declare_attribute("title", ValueType::String).unwrap();
//!
//! let schema = Arc::new(Schema::new().with_type(movie).unwrap());
//! let reconciler = Reconciler::new(schema, Arc::new(IdentityMap::new()));
//! let repository = Repository::new(MemoryStore::new(), reconciler.clone());
//!
//! let alien = reconciler.create("movie", [("title", "Alien")]).unwrap();
//! repository.save(&alien).unwrap();
//! assert!(!alien.is_new());
//!
//! let loaded = repository.load("movie", &alien.id().unwrap()).unwrap();
//! assert_eq!(loaded, alien);
//! ```

mod document;
mod error;
mod memory;
mod options;
mod repository;
mod store;

pub use document::{Document, DocumentRef};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use options::{
    DeleteOptions, FindOptions, LoadOptions, Projection, Query, SaveOptions, SortDirection,
    SortKey,
};
pub use repository::Repository;
pub use store::DocumentStore;
