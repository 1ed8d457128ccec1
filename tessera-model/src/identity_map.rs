//! Process-wide identity map.
//!
//! Maps `(type, identifier attribute, value)` to the one live instance holding
//! that identity. Entries are weak: the map never keeps an instance alive, and
//! an entry whose instance was dropped counts as absent.
//!
//! The table sits behind a single mutex. Every public operation, and every
//! reconciliation from probe to commit, runs inside that critical section;
//! nested work borrows the already-held [`IdentityTable`] instead of locking
//! again. Instance state locks are always taken after the map lock.
//!
//! A dropped instance removes its own entries when the map is free. Entries
//! left behind because the map was busy at that moment are swept once the
//! table doubles in size.

use crate::entity::{Entity, EntityCell};
use crate::error::{ModelError, ModelResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError, Weak};
use tessera_types::{IdGenerator, ModelConfig};
use tracing::debug;

/// Key of one identity map entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    pub entity_type: String,
    pub attribute: String,
    pub value: String,
}

impl IdentityKey {
    pub fn new(entity_type: &str, attribute: &str, value: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            attribute: attribute.to_string(),
            value: value.to_string(),
        }
    }
}

/// Table size below which dead entries are never swept.
const SWEEP_THRESHOLD: usize = 64;

/// The locked contents of an [`IdentityMap`].
pub(crate) struct IdentityTable {
    entries: HashMap<IdentityKey, Weak<EntityCell>>,
    sweep_at: usize,
}

impl Default for IdentityTable {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            sweep_at: SWEEP_THRESHOLD,
        }
    }
}

impl IdentityTable {
    fn holder(&self, key: &IdentityKey) -> Option<Entity> {
        self.entries
            .get(key)
            .and_then(Weak::upgrade)
            .map(Entity::from_cell)
    }

    pub(crate) fn lookup(&self, entity_type: &str, attribute: &str, value: &str) -> Option<Entity> {
        self.holder(&IdentityKey::new(entity_type, attribute, value))
    }

    /// Fails when another live instance holds the identity.
    pub(crate) fn ensure_available(
        &self,
        entity: &Entity,
        attribute: &str,
        value: &str,
    ) -> ModelResult<()> {
        let key = IdentityKey::new(entity.type_name(), attribute, value);
        match self.holder(&key) {
            Some(holder) if holder != *entity => Err(ModelError::DuplicateIdentifierValue {
                attribute: attribute.to_string(),
                value: value.to_string(),
            }),
            _ => Ok(()),
        }
    }

    pub(crate) fn register(&mut self, entity: &Entity, attribute: &str, value: &str) -> ModelResult<()> {
        self.ensure_available(entity, attribute, value)?;
        self.insert(entity, attribute, value);
        Ok(())
    }

    /// Registers every identifier value the instance holds, or none of them.
    pub(crate) fn register_all(&mut self, entity: &Entity) -> ModelResult<()> {
        let identifiers = entity.identifier_values();
        for (attribute, value) in &identifiers {
            self.ensure_available(entity, attribute, value)?;
        }
        for (attribute, value) in &identifiers {
            self.insert(entity, attribute, value);
        }
        Ok(())
    }

    /// Moves an instance from `old` to `new`. On failure the table is left
    /// untouched.
    pub(crate) fn rekey(
        &mut self,
        entity: &Entity,
        attribute: &str,
        old: Option<&str>,
        new: &str,
    ) -> ModelResult<()> {
        self.ensure_available(entity, attribute, new)?;
        if let Some(old) = old {
            let old_key = IdentityKey::new(entity.type_name(), attribute, old);
            if self
                .entries
                .get(&old_key)
                .is_some_and(|weak| entity.is_cell(weak))
            {
                self.entries.remove(&old_key);
            }
        }
        self.insert(entity, attribute, new);
        debug!(
            "Rekeyed '{}.{}' from {:?} to '{}'",
            entity.type_name(),
            attribute,
            old,
            new
        );
        Ok(())
    }

    fn insert(&mut self, entity: &Entity, attribute: &str, value: &str) {
        self.entries.insert(
            IdentityKey::new(entity.type_name(), attribute, value),
            entity.downgrade(),
        );
        if self.entries.len() >= self.sweep_at {
            let swept = self.purge();
            self.sweep_at = SWEEP_THRESHOLD.max(self.entries.len() * 2);
            debug!(
                "Swept {} dead identity entries ({} remain)",
                swept,
                self.entries.len()
            );
        }
    }

    /// Removes the entries of a dropped instance. `cell` only serves as an
    /// address; entries re-registered by another instance are kept.
    pub(crate) fn release(
        &mut self,
        cell: *const EntityCell,
        entity_type: &str,
        identifiers: &[(String, String)],
    ) {
        for (attribute, value) in identifiers {
            let key = IdentityKey::new(entity_type, attribute, value);
            if self
                .entries
                .get(&key)
                .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), cell))
            {
                self.entries.remove(&key);
            }
        }
    }

    pub(crate) fn forget(&mut self, entity: &Entity) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, weak| !entity.is_cell(weak));
        before - self.entries.len()
    }

    pub(crate) fn purge(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, weak| weak.strong_count() > 0);
        before - self.entries.len()
    }

    fn entry_count(&self) -> usize {
        self.entries.len()
    }

    fn live_len(&self) -> usize {
        self.entries
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

/// Shared registry ensuring one live instance per identity.
///
/// Construct one per process (or per test) and share it behind an `Arc`;
/// every instance created through a [`Reconciler`](crate::Reconciler) keeps a
/// handle to the map it belongs to.
pub struct IdentityMap {
    table: Mutex<IdentityTable>,
    ids: IdGenerator,
}

impl IdentityMap {
    /// Creates an empty map with the default identifier generator.
    pub fn new() -> Self {
        Self::with_generator(IdGenerator::default())
    }

    pub fn with_config(config: &ModelConfig) -> ModelResult<Self> {
        Ok(Self::with_generator(IdGenerator::new(config)?))
    }

    pub fn with_generator(ids: IdGenerator) -> Self {
        Self {
            table: Mutex::new(IdentityTable::default()),
            ids,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, IdentityTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the table unless it is already held, by this thread included.
    pub(crate) fn try_lock(&self) -> Option<MutexGuard<'_, IdentityTable>> {
        match self.table.try_lock() {
            Ok(table) => Some(table),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    pub fn id_generator(&self) -> &IdGenerator {
        &self.ids
    }

    /// Generates a fresh primary identifier value.
    pub fn generate_id(&self) -> String {
        self.ids.generate()
    }

    /// Registers `entity` under `(type, attribute, value)`.
    ///
    /// Fails with [`ModelError::DuplicateIdentifierValue`] when a different
    /// live instance already holds the key. This does not change the
    /// instance's stored value; attribute writes do both.
    pub fn register(&self, entity: &Entity, attribute: &str, value: &str) -> ModelResult<()> {
        self.ensure_member(entity)?;
        entity.entity_type().identifier_attribute(attribute)?;
        self.lock().register(entity, attribute, value)
    }

    pub fn lookup(&self, entity_type: &str, attribute: &str, value: &str) -> Option<Entity> {
        self.lock().lookup(entity_type, attribute, value)
    }

    /// Atomically replaces the `old` entry with a `new` one.
    pub fn rekey(
        &self,
        entity: &Entity,
        attribute: &str,
        old: Option<&str>,
        new: &str,
    ) -> ModelResult<()> {
        self.ensure_member(entity)?;
        entity.entity_type().identifier_attribute(attribute)?;
        self.lock().rekey(entity, attribute, old, new)
    }

    /// Removes every entry pointing at `entity`. Returns how many were removed.
    pub fn forget(&self, entity: &Entity) -> usize {
        let removed = self.lock().forget(entity);
        debug!("Forgot {} identity entries of '{}'", removed, entity.type_name());
        removed
    }

    /// Drops entries whose instance no longer exists.
    pub fn purge(&self) -> usize {
        self.lock().purge()
    }

    /// Number of stored entries, including those of dropped instances that
    /// have not been pruned yet.
    pub fn entry_count(&self) -> usize {
        self.lock().entry_count()
    }

    /// Number of entries pointing at live instances.
    pub fn len(&self) -> usize {
        self.lock().live_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn is(&self, other: &Arc<IdentityMap>) -> bool {
        std::ptr::eq(self, Arc::as_ptr(other))
    }

    fn ensure_member(&self, entity: &Entity) -> ModelResult<()> {
        if self.is(entity.identity_map()) {
            Ok(())
        } else {
            Err(ModelError::ForeignEntity(entity.type_name().to_string()))
        }
    }
}

impl Default for IdentityMap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IdentityMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityMap")
            .field("entries", &self.len())
            .field("ids", &self.ids)
            .finish()
    }
}
