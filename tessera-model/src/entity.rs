use crate::attribute::Attribute;
use crate::entity_type::EntityType;
use crate::error::{ModelError, ModelResult};
use crate::identity_map::{IdentityMap, IdentityTable};
use crate::value::Value;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tessera_types::record;
use tracing::debug;

pub(crate) struct EntityCell {
    entity_type: Arc<EntityType>,
    map: Arc<IdentityMap>,
    state: Mutex<EntityState>,
}

struct EntityState {
    values: HashMap<String, Value>,
    is_new: bool,
}

impl Drop for EntityCell {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        let identifiers: Vec<(String, String)> = self
            .entity_type
            .identifier_attributes()
            .filter_map(|attribute| match state.values.get(attribute.name()) {
                Some(Value::String(value)) => Some((attribute.name().to_string(), value.clone())),
                _ => None,
            })
            .collect();
        if identifiers.is_empty() {
            return;
        }
        // A busy map is swept later.
        if let Some(mut table) = self.map.try_lock() {
            table.release(self as *const EntityCell, self.entity_type.name(), &identifiers);
        }
    }
}

/// A live entity instance.
///
/// `Entity` is a shared handle: clones point at the same instance, and
/// equality is identity. The identity map only holds weak references, so an
/// instance lives exactly as long as application code keeps a handle.
///
/// Unset attributes are absent from the value store, which keeps "unset"
/// distinct from falsy values.
#[derive(Clone)]
pub struct Entity(Arc<EntityCell>);

impl Entity {
    pub(crate) fn new(
        entity_type: Arc<EntityType>,
        map: Arc<IdentityMap>,
        values: HashMap<String, Value>,
        is_new: bool,
    ) -> Self {
        Self(Arc::new(EntityCell {
            entity_type,
            map,
            state: Mutex::new(EntityState { values, is_new }),
        }))
    }

    pub(crate) fn from_cell(cell: Arc<EntityCell>) -> Self {
        Self(cell)
    }

    pub(crate) fn downgrade(&self) -> Weak<EntityCell> {
        Arc::downgrade(&self.0)
    }

    pub(crate) fn is_cell(&self, weak: &Weak<EntityCell>) -> bool {
        std::ptr::eq(weak.as_ptr(), Arc::as_ptr(&self.0))
    }

    fn state(&self) -> MutexGuard<'_, EntityState> {
        self.0.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.0.entity_type
    }

    pub fn type_name(&self) -> &str {
        self.0.entity_type.name()
    }

    pub fn identity_map(&self) -> &Arc<IdentityMap> {
        &self.0.map
    }

    /// True when both handles point at the same instance.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    // ── Newness ──────────────────────────────────────────────────

    /// True until storage acknowledges the instance.
    pub fn is_new(&self) -> bool {
        self.state().is_new
    }

    /// Records the storage acknowledgment (`new → existing`).
    pub fn mark_persisted(&self) {
        self.state().is_new = false;
    }

    // ── Attribute access ─────────────────────────────────────────

    /// Returns the current value of an attribute.
    ///
    /// Reading an unset primary identifier generates and registers a value.
    pub fn get(&self, name: &str) -> ModelResult<Option<Value>> {
        let attribute = self.0.entity_type.attribute(name)?;
        if attribute.is_primary_identifier() {
            let mut table = self.0.map.lock();
            self.ensure_primary(&mut table)?;
        }
        Ok(self.state().values.get(name).cloned())
    }

    /// Convenience accessor for string attributes.
    pub fn get_str(&self, name: &str) -> ModelResult<Option<String>> {
        Ok(self.get(name)?.as_ref().and_then(Value::as_str).map(str::to_string))
    }

    /// Returns the primary identifier, generating it when unset.
    pub fn id(&self) -> ModelResult<String> {
        let attribute = self.0.entity_type.primary_identifier_attribute()?;
        let mut table = self.0.map.lock();
        self.ensure_primary(&mut table)?;
        let state = self.state();
        match state.values.get(attribute.name()) {
            Some(Value::String(id)) => Ok(id.clone()),
            _ => Err(ModelError::TypeMismatch {
                attribute: attribute.name().to_string(),
                expected: attribute.value_type().to_string(),
                received: "undefined".to_string(),
            }),
        }
    }

    pub fn is_set(&self, name: &str) -> ModelResult<bool> {
        self.0.entity_type.attribute(name)?;
        Ok(self.state().values.contains_key(name))
    }

    /// Validates and stores a value. Identifier writes also move the
    /// instance's identity map entry; a collision rejects the write and
    /// leaves the old value in place.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> ModelResult<()> {
        let value = value.into();
        check_membership(&self.0.map, &value)?;
        self.assign(name, Some(value))
    }

    /// Returns the attribute to the unset state (nullable attributes only).
    pub fn unset(&self, name: &str) -> ModelResult<()> {
        self.assign(name, None)
    }

    fn assign(&self, name: &str, value: Option<Value>) -> ModelResult<()> {
        let attribute = self.0.entity_type.attribute(name)?;
        attribute.validate(value.as_ref())?;
        if attribute.is_identifier() {
            let mut table = self.0.map.lock();
            self.write_validated(&mut table, attribute, value)
        } else {
            self.store(attribute, value);
            Ok(())
        }
    }

    /// Removes the instance from the identity map. Its values are kept.
    pub fn retire(&self) -> usize {
        self.0.map.forget(self)
    }

    /// Current identifier values as `(attribute, value)`, declaration order.
    pub fn identifier_values(&self) -> Vec<(String, String)> {
        let state = self.state();
        self.0
            .entity_type
            .identifier_attributes()
            .filter_map(|attribute| match state.values.get(attribute.name()) {
                Some(Value::String(value)) => Some((attribute.name().to_string(), value.clone())),
                _ => None,
            })
            .collect()
    }

    // ── Write path (identity map held) ───────────────────────────

    /// Applies reconciled fields to a tracked instance. Every value and every
    /// identifier move is checked before anything is written.
    pub(crate) fn apply(
        &self,
        table: &mut IdentityTable,
        fields: Vec<(&Attribute, Option<Value>)>,
    ) -> ModelResult<()> {
        for (attribute, value) in &fields {
            attribute.validate(value.as_ref())?;
            if let (true, Some(Value::String(new))) = (attribute.is_identifier(), value) {
                table.ensure_available(self, attribute.name(), new)?;
            }
        }
        for (attribute, value) in fields {
            self.write_validated(table, attribute, value)?;
        }
        Ok(())
    }

    /// Applies fields to an instance that is not registered yet.
    pub(crate) fn apply_unregistered(
        &self,
        fields: Vec<(&Attribute, Option<Value>)>,
    ) -> ModelResult<()> {
        for (attribute, value) in &fields {
            attribute.validate(value.as_ref())?;
        }
        for (attribute, value) in fields {
            self.store(attribute, value);
        }
        Ok(())
    }

    fn write_validated(
        &self,
        table: &mut IdentityTable,
        attribute: &Attribute,
        value: Option<Value>,
    ) -> ModelResult<()> {
        if let (true, Some(Value::String(new))) = (attribute.is_identifier(), &value) {
            let old = self
                .state()
                .values
                .get(attribute.name())
                .and_then(Value::as_str)
                .map(str::to_string);
            if old.as_deref() != Some(new.as_str()) {
                table.rekey(self, attribute.name(), old.as_deref(), new)?;
            }
        }
        self.store(attribute, value);
        Ok(())
    }

    fn store(&self, attribute: &Attribute, value: Option<Value>) {
        let mut state = self.state();
        match value {
            Some(value) => {
                state.values.insert(attribute.name().to_string(), value);
            }
            None => {
                state.values.remove(attribute.name());
            }
        }
    }

    fn ensure_primary(&self, table: &mut IdentityTable) -> ModelResult<()> {
        let Ok(attribute) = self.0.entity_type.primary_identifier_attribute() else {
            return Ok(());
        };
        if self.state().values.contains_key(attribute.name()) {
            return Ok(());
        }
        let id = self.0.map.generate_id();
        table.register(self, attribute.name(), &id)?;
        debug!("Generated primary identifier for '{}'", self.type_name());
        self.store(attribute, Some(Value::String(id)));
        Ok(())
    }

    // ── Serialization ────────────────────────────────────────────

    /// Serializes the instance to the record format understood by
    /// [`Reconciler::reconcile`](crate::Reconciler::reconcile).
    ///
    /// Nested entities are serialized inline. An entity that is already being
    /// serialized further up (a cycle) is written as a reference carrying only
    /// its type and identifiers.
    pub fn to_record(&self) -> ModelResult<JsonValue> {
        let mut table = self.0.map.lock();
        let mut path = Vec::new();
        self.encode(&mut table, &mut path)
    }

    fn encode(
        &self,
        table: &mut IdentityTable,
        path: &mut Vec<*const EntityCell>,
    ) -> ModelResult<JsonValue> {
        self.ensure_primary(table)?;
        let (values, is_new) = {
            let state = self.state();
            (state.values.clone(), state.is_new)
        };

        let this = Arc::as_ptr(&self.0);
        let reference_only = path.contains(&this);

        let mut out = Map::new();
        out.insert(record::TYPE.to_string(), JsonValue::from(self.type_name()));
        if is_new && !reference_only {
            out.insert(record::NEW.to_string(), JsonValue::Bool(true));
        }

        path.push(this);
        for attribute in self.0.entity_type.attributes() {
            if reference_only && !attribute.is_identifier() {
                continue;
            }
            if let Some(value) = values.get(attribute.name()) {
                let encoded = encode_value(value, table, path)?;
                out.insert(attribute.name().to_string(), encoded);
            }
        }
        path.pop();

        Ok(JsonValue::Object(out))
    }
}

fn encode_value(
    value: &Value,
    table: &mut IdentityTable,
    path: &mut Vec<*const EntityCell>,
) -> ModelResult<JsonValue> {
    Ok(match value {
        Value::String(s) => JsonValue::from(s.as_str()),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(JsonValue::Number)
            .ok_or_else(|| ModelError::InvalidRecord(format!("cannot encode number {n}")))?,
        Value::Boolean(b) => JsonValue::Bool(*b),
        Value::Object(object) => JsonValue::Object(object.clone()),
        Value::Array(items) => JsonValue::Array(items.clone()),
        Value::Date(date) => encode_date(date),
        Value::Entity(entity) => entity.encode(table, path)?,
        Value::EntityArray(entities) => JsonValue::Array(
            entities
                .iter()
                .map(|entity| entity.encode(table, path))
                .collect::<ModelResult<_>>()?,
        ),
    })
}

/// Encodes a date as `{"_type": "Date", "_value": "<RFC 3339>"}`.
fn encode_date(date: &DateTime<Utc>) -> JsonValue {
    let mut out = Map::new();
    out.insert(record::TYPE.to_string(), JsonValue::from(record::DATE_TAG));
    out.insert(
        record::VALUE.to_string(),
        JsonValue::from(date.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    JsonValue::Object(out)
}

/// Nested entities must belong to the same identity map as their parent.
pub(crate) fn check_membership(map: &Arc<IdentityMap>, value: &Value) -> ModelResult<()> {
    let foreign = match value {
        Value::Entity(entity) => (!Arc::ptr_eq(entity.identity_map(), map)).then_some(entity),
        Value::EntityArray(entities) => entities
            .iter()
            .find(|entity| !Arc::ptr_eq(entity.identity_map(), map)),
        _ => None,
    };
    match foreign {
        Some(entity) => Err(ModelError::ForeignEntity(entity.type_name().to_string())),
        None => Ok(()),
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.0), state);
    }
}

// Only identifiers are printed: nested values may form cycles.
impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Entity");
        out.field("type", &self.type_name());
        match self.0.state.try_lock() {
            Ok(state) => {
                out.field("is_new", &state.is_new);
                for attribute in self.0.entity_type.identifier_attributes() {
                    if let Some(Value::String(value)) = state.values.get(attribute.name()) {
                        out.field(attribute.name(), value);
                    }
                }
            }
            Err(_) => {
                out.field("state", &"<locked>");
            }
        }
        out.finish()
    }
}
