//! Persistence bridge between live entities and a [`DocumentStore`].
//!
//! Entities are written with [`Entity::to_record`] and read back through the
//! [`Reconciler`], so loading a document that is already tracked returns the
//! tracked instance. The primary identifier attribute is stored as `_id`.

use crate::document::{Document, DocumentRef, is_tagged_scalar};
use crate::error::{StoreError, StoreResult};
use crate::options::{DeleteOptions, FindOptions, LoadOptions, Query, SaveOptions};
use crate::store::DocumentStore;
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::sync::Arc;
use tessera_model::{Entity, EntityType, ModelResult, Reconciler, Value};
use tessera_types::record;
use tracing::{debug, warn};

#[derive(Clone, Copy)]
enum Direction {
    /// Primary identifier attribute → `_id`.
    ToStore,
    /// `_id` → primary identifier attribute.
    FromStore,
}

/// Saves, loads, deletes and finds entities through a document store.
#[derive(Debug)]
pub struct Repository<S> {
    store: S,
    reconciler: Reconciler,
}

impl<S: DocumentStore> Repository<S> {
    pub fn new(store: S, reconciler: Reconciler) -> Self {
        Self { store, reconciler }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    // ── Save ─────────────────────────────────────────────────────

    /// Saves an entity with the strict options.
    pub fn save(&self, entity: &Entity) -> StoreResult<Document> {
        self.save_with(entity, &SaveOptions::default())
    }

    /// Saves an entity and, once the store acknowledges it, marks the entity
    /// and every entity embedded in it as persisted.
    pub fn save_with(&self, entity: &Entity, options: &SaveOptions) -> StoreResult<Document> {
        // Generates the primary identifier when still unset.
        let id = entity.id()?;
        let document = self.to_document(entity.to_record()?)?;

        let acknowledgment = self
            .store
            .save(std::slice::from_ref(&document), options)?
            .pop()
            .ok_or_else(|| {
                StoreError::InvalidDocument("the store returned no acknowledgment".to_string())
            })?;

        mark_persisted(entity)?;
        if acknowledgment.contains_key(record::MISSED) || acknowledgment.contains_key(record::EXISTED) {
            warn!(
                "Saved '{}' {} despite a mismatch with the stored state",
                entity.type_name(),
                id
            );
        } else {
            debug!("Saved '{}' {}", entity.type_name(), id);
        }
        Ok(acknowledgment)
    }

    // ── Load ─────────────────────────────────────────────────────

    /// Loads a document and reconciles it. Fails when it does not exist.
    pub fn load(&self, entity_type: &str, id: &str) -> StoreResult<Entity> {
        self.load_with(entity_type, id, &LoadOptions::default())?
            .ok_or_else(|| DocumentRef::new(entity_type, id).not_found())
    }

    /// Loads a document and reconciles it. Returns `None` for a missing
    /// document when the options tolerate it.
    pub fn load_with(
        &self,
        entity_type: &str,
        id: &str,
        options: &LoadOptions,
    ) -> StoreResult<Option<Entity>> {
        let doc_ref = DocumentRef::new(entity_type, id);
        let document = self
            .store
            .load(std::slice::from_ref(&doc_ref), options)?
            .pop()
            .ok_or_else(|| doc_ref.not_found())?;

        if document.get(record::MISSED) == Some(&JsonValue::Bool(true)) {
            debug!("Document {} is missing", doc_ref);
            return Ok(None);
        }

        let entity = self.reconciler.reconcile(&self.to_record(document))?;
        mark_persisted(&entity)?;
        debug!("Loaded {}", doc_ref);
        Ok(Some(entity))
    }

    // ── Delete ───────────────────────────────────────────────────

    pub fn delete(&self, entity: &Entity) -> StoreResult<()> {
        self.delete_with(entity, &DeleteOptions::default())?;
        Ok(())
    }

    /// Deletes the entity's document and retires the instance from the
    /// identity map. Returns whether the document existed.
    pub fn delete_with(&self, entity: &Entity, options: &DeleteOptions) -> StoreResult<bool> {
        let doc_ref = DocumentRef::new(entity.type_name(), entity.id()?);
        let acknowledgments = self.store.delete(std::slice::from_ref(&doc_ref), options)?;
        let existed = acknowledgments
            .first()
            .is_some_and(|acknowledgment| !acknowledgment.contains_key(record::MISSED));

        let forgotten = entity.retire();
        debug!(
            "Deleted {} (existed: {}, {} identity entries released)",
            doc_ref, existed, forgotten
        );
        Ok(existed)
    }

    // ── Find ─────────────────────────────────────────────────────

    /// Runs a query and reconciles every result. Filter and sort paths may
    /// name the primary identifier attribute, at the top level or through
    /// nested entity attributes (`director.id`).
    pub fn find(&self, query: &Query, options: &FindOptions) -> StoreResult<Vec<Entity>> {
        let entity_type = Arc::clone(self.reconciler.schema().get(&query.entity_type)?);
        let to_store_path = |path: &str| self.to_store_path(&entity_type, path);

        let query = Query {
            entity_type: query.entity_type.clone(),
            filter: query
                .filter
                .iter()
                .map(|(path, value)| (to_store_path(path), value.clone()))
                .collect(),
        };
        let mut options = options.clone();
        for key in &mut options.sort {
            key.path = to_store_path(&key.path);
        }

        let records: Vec<JsonValue> = self
            .store
            .find(&query, &options)?
            .into_iter()
            .map(|document| self.to_record(document))
            .collect();
        let entities = self.reconciler.reconcile_all(&records)?;
        for entity in &entities {
            mark_persisted(entity)?;
        }
        debug!("Found {} '{}' entities", entities.len(), query.entity_type);
        Ok(entities)
    }

    // ── Conversion ───────────────────────────────────────────────

    /// Rewrites every segment of a dotted path that names the primary
    /// identifier of the entity type reached at that point.
    fn to_store_path(&self, root: &Arc<EntityType>, path: &str) -> String {
        let schema = self.reconciler.schema();
        let mut current = Some(Arc::clone(root));
        let mut segments = Vec::new();
        for segment in path.split('.') {
            let Some(entity_type) = current.take() else {
                segments.push(segment.to_string());
                continue;
            };
            let is_primary = entity_type
                .primary_identifier_attribute()
                .is_ok_and(|attribute| attribute.name() == segment);
            if is_primary {
                segments.push(record::ID.to_string());
                continue;
            }
            current = entity_type
                .attribute(segment)
                .ok()
                .and_then(|attribute| attribute.value_type().entity_type())
                .and_then(|name| schema.get(name).ok())
                .map(Arc::clone);
            segments.push(segment.to_string());
        }
        segments.join(".")
    }

    fn to_document(&self, record: JsonValue) -> StoreResult<Document> {
        let JsonValue::Object(mut document) = record else {
            return Err(StoreError::InvalidDocument(
                "an entity record must be an object".to_string(),
            ));
        };
        self.map_ids(&mut document, Direction::ToStore);
        Ok(document)
    }

    fn to_record(&self, mut document: Document) -> JsonValue {
        document.remove(record::MISSED);
        document.remove(record::EXISTED);
        self.map_ids(&mut document, Direction::FromStore);
        JsonValue::Object(document)
    }

    /// Renames the primary identifier field of every entity-shaped object,
    /// nested ones included.
    fn map_ids(&self, object: &mut Document, direction: Direction) {
        let type_name = object
            .get(record::TYPE)
            .and_then(JsonValue::as_str)
            .map(str::to_string);
        let primary = type_name
            .and_then(|name| self.reconciler.schema().get(&name).ok().cloned())
            .and_then(|entity_type| {
                entity_type
                    .primary_identifier_attribute()
                    .ok()
                    .map(|attribute| attribute.name().to_string())
            });
        if let Some(primary) = primary {
            let (from, to) = match direction {
                Direction::ToStore => (primary.as_str(), record::ID),
                Direction::FromStore => (record::ID, primary.as_str()),
            };
            if let Some(id) = object.remove(from) {
                object.insert(to.to_string(), id);
            }
        }

        for value in object.values_mut() {
            self.map_nested_ids(value, direction);
        }
    }

    fn map_nested_ids(&self, value: &mut JsonValue, direction: Direction) {
        match value {
            JsonValue::Object(object) if !is_tagged_scalar(object) => {
                self.map_ids(object, direction);
            }
            JsonValue::Array(items) => {
                for item in items {
                    self.map_nested_ids(item, direction);
                }
            }
            _ => {}
        }
    }
}

/// Marks an entity and everything reachable through its entity attributes
/// as persisted.
fn mark_persisted(entity: &Entity) -> ModelResult<()> {
    let mut pending = vec![entity.clone()];
    let mut seen = HashSet::new();
    while let Some(entity) = pending.pop() {
        if !seen.insert(entity.clone()) {
            continue;
        }
        entity.mark_persisted();
        for attribute in entity.entity_type().attributes() {
            if attribute.value_type().entity_type().is_none() {
                continue;
            }
            match entity.get(attribute.name())? {
                Some(Value::Entity(nested)) => pending.push(nested),
                Some(Value::EntityArray(nested)) => pending.extend(nested),
                _ => {}
            }
        }
    }
    Ok(())
}
