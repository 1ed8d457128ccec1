use crate::entity_type::EntityType;
use crate::error::{ModelError, ModelResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// The set of entity types known to a process.
///
/// Registering a type freezes it: the schema hands out `Arc<EntityType>`
/// and never mutates a registered type again.
#[derive(Debug, Default, Clone)]
pub struct Schema {
    types: HashMap<String, Arc<EntityType>>,
    order: Vec<String>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type. Type names must be unique.
    pub fn register(&mut self, entity_type: EntityType) -> ModelResult<Arc<EntityType>> {
        let name = entity_type.name().to_string();
        if self.types.contains_key(&name) {
            return Err(ModelError::DuplicateEntityType(name));
        }
        debug!(
            "Registered entity type '{}' ({} attributes)",
            name,
            entity_type.attributes().count()
        );
        let entity_type = Arc::new(entity_type);
        self.types.insert(name.clone(), Arc::clone(&entity_type));
        self.order.push(name);
        Ok(entity_type)
    }

    /// Builder-style variant of [`register`](Self::register).
    pub fn with_type(mut self, entity_type: EntityType) -> ModelResult<Self> {
        self.register(entity_type)?;
        Ok(self)
    }

    /// Resolves a type tag.
    pub fn get(&self, name: &str) -> ModelResult<&Arc<EntityType>> {
        self.types
            .get(name)
            .ok_or_else(|| ModelError::UnknownEntityType(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Type names in registration order.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Checks that every nested entity attribute references a registered type.
    pub fn validate(&self) -> ModelResult<()> {
        for name in &self.order {
            for attribute in self.types[name].attributes() {
                if let Some(referenced) = attribute.value_type().entity_type() {
                    self.get(referenced)?;
                }
            }
        }
        Ok(())
    }
}
