//! Reconciliation of serialized records into the identity map.
//!
//! A record is a JSON object tagged with `_type`, optionally flagged `_new`,
//! whose other fields are attribute values. Reconciling it either reuses the
//! instance already tracked for one of its identifiers or creates a new one;
//! nested records are reconciled the same way against their declared type.
//!
//! When a record carries several identifiers, the first identifier in
//! declaration order that matches a tracked instance selects it. Any other
//! identifier in the record that is held by a different live instance rejects
//! the whole record before a single field is written.

use crate::attribute::Attribute;
use crate::entity::{check_membership, Entity};
use crate::entity_type::EntityType;
use crate::error::{ModelError, ModelResult};
use crate::identity_map::{IdentityMap, IdentityTable};
use crate::schema::Schema;
use crate::value::Value;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;
use tessera_types::{record, ModelConfig, ValueType};
use tracing::{debug, warn};

/// Merges incoming records into the identity map.
#[derive(Debug, Clone)]
pub struct Reconciler {
    schema: Arc<Schema>,
    map: Arc<IdentityMap>,
}

impl Reconciler {
    pub fn new(schema: Arc<Schema>, map: Arc<IdentityMap>) -> Self {
        Self { schema, map }
    }

    /// Validates the schema and builds a reconciler over a fresh map.
    pub fn with_config(schema: Schema, config: &ModelConfig) -> ModelResult<Self> {
        schema.validate()?;
        let map = IdentityMap::with_config(config)?;
        Ok(Self::new(Arc::new(schema), Arc::new(map)))
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn identity_map(&self) -> &Arc<IdentityMap> {
        &self.map
    }

    // ── Construction ─────────────────────────────────────────────

    /// Constructs a brand-new instance from attribute values.
    ///
    /// Every attribute that is not supplied must be nullable, except the
    /// primary identifier, which is generated on first read. Supplied
    /// identifiers are registered all together or not at all.
    pub fn create<I, K, V>(&self, type_name: &str, fields: I) -> ModelResult<Entity>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let entity_type = Arc::clone(self.schema.get(type_name)?);

        let mut values = HashMap::new();
        for (name, value) in fields {
            let name = name.into();
            let value = value.into();
            entity_type.attribute(&name)?.validate(Some(&value))?;
            check_membership(&self.map, &value)?;
            values.insert(name, value);
        }
        for attribute in entity_type.attributes() {
            if !attribute.is_primary_identifier() && !values.contains_key(attribute.name()) {
                attribute.validate(None)?;
            }
        }

        let entity = Entity::new(entity_type, Arc::clone(&self.map), values, true);
        self.map.lock().register_all(&entity)?;
        debug!("Created new '{}' instance", type_name);
        Ok(entity)
    }

    // ── Reconciliation ───────────────────────────────────────────

    /// Reconciles one record and returns the instance it denotes.
    ///
    /// Two records carrying the same identity return the same instance.
    pub fn reconcile(&self, record: &JsonValue) -> ModelResult<Entity> {
        let mut table = self.map.lock();
        self.reconcile_record(&mut table, record, None)
    }

    /// Reconciles a batch under a single critical section.
    pub fn reconcile_all(&self, records: &[JsonValue]) -> ModelResult<Vec<Entity>> {
        let mut table = self.map.lock();
        records
            .iter()
            .map(|record| self.reconcile_record(&mut table, record, None))
            .collect()
    }

    fn reconcile_record(
        &self,
        table: &mut IdentityTable,
        record: &JsonValue,
        expected: Option<&str>,
    ) -> ModelResult<Entity> {
        let object = record.as_object().ok_or_else(|| {
            ModelError::InvalidRecord(format!("expected an object, found {}", json_kind(record)))
        })?;

        let type_name = match object.get(record::TYPE) {
            Some(JsonValue::String(name)) => name.as_str(),
            Some(other) => {
                return Err(ModelError::InvalidRecord(format!(
                    "'{}' must be a string, found {}",
                    record::TYPE,
                    json_kind(other)
                )));
            }
            None => expected.ok_or_else(|| {
                ModelError::InvalidRecord(format!("missing '{}' field", record::TYPE))
            })?,
        };
        let entity_type = Arc::clone(self.schema.get(type_name)?);

        let requested_new = match object.get(record::NEW) {
            None | Some(JsonValue::Null) => false,
            Some(JsonValue::Bool(flag)) => *flag,
            Some(other) => {
                return Err(ModelError::InvalidRecord(format!(
                    "'{}' must be a boolean, found {}",
                    record::NEW,
                    json_kind(other)
                )));
            }
        };

        let fields = attributes_of(&entity_type, object)?;

        if let Some(existing) = probe(table, &entity_type, object) {
            if requested_new && !existing.is_new() {
                warn!(
                    "Rejected new '{}' record matching an existing instance",
                    type_name
                );
                return Err(ModelError::NewInstanceConflict {
                    entity_type: type_name.to_string(),
                });
            }
            let fields = self.decode_fields(table, fields)?;
            existing.apply(table, fields)?;
            debug!("Reconciled '{}' record onto a tracked instance", type_name);
            return Ok(existing);
        }

        // The identity is registered before nested records are decoded, so a
        // nested reference back to this record resolves to the new instance.
        let (identifiers, others): (Vec<_>, Vec<_>) = fields
            .into_iter()
            .partition(|(attribute, _)| attribute.is_identifier());
        let identifiers = self.decode_fields(table, identifiers)?;
        let entity = Entity::new(
            Arc::clone(&entity_type),
            Arc::clone(&self.map),
            HashMap::new(),
            requested_new,
        );
        entity.apply_unregistered(identifiers)?;
        table.register_all(&entity)?;

        let applied = self
            .decode_fields(table, others)
            .and_then(|others| entity.apply(table, others));
        if let Err(err) = applied {
            let released = table.forget(&entity);
            debug!(
                "Rolled back new '{}' instance ({} identity entries released)",
                type_name, released
            );
            return Err(err);
        }
        debug!(
            "Reconciled '{}' record into a new instance (new: {})",
            type_name, requested_new
        );
        Ok(entity)
    }

    fn decode_fields<'t>(
        &self,
        table: &mut IdentityTable,
        fields: Vec<(&'t Attribute, &JsonValue)>,
    ) -> ModelResult<Vec<(&'t Attribute, Option<Value>)>> {
        let mut decoded = Vec::with_capacity(fields.len());
        for (attribute, json) in fields {
            decoded.push((attribute, self.decode_value(table, attribute, json)?));
        }
        Ok(decoded)
    }

    /// Decodes by JSON shape; kind checks happen in the write path. Only
    /// objects and arrays declared as nested entities are reconciled.
    fn decode_value(
        &self,
        table: &mut IdentityTable,
        attribute: &Attribute,
        json: &JsonValue,
    ) -> ModelResult<Option<Value>> {
        let value = match json {
            JsonValue::Null => return Ok(None),
            JsonValue::Bool(b) => Value::Boolean(*b),
            JsonValue::Number(n) => Value::Number(n.as_f64().ok_or_else(|| {
                ModelError::InvalidRecord(format!(
                    "number out of range for attribute '{}'",
                    attribute.name()
                ))
            })?),
            JsonValue::String(s) => Value::String(s.clone()),
            JsonValue::Array(items) => match attribute.value_type() {
                ValueType::EntityArray(sub_type) => {
                    let mut entities = Vec::with_capacity(items.len());
                    for item in items {
                        entities.push(self.decode_nested(table, attribute, sub_type, item)?);
                    }
                    Value::EntityArray(entities)
                }
                _ => Value::Array(items.clone()),
            },
            JsonValue::Object(object) => {
                if object.get(record::TYPE).and_then(JsonValue::as_str) == Some(record::DATE_TAG) {
                    Value::Date(decode_date(attribute, object)?)
                } else if let ValueType::Entity(sub_type) = attribute.value_type() {
                    Value::Entity(self.decode_nested(table, attribute, sub_type, json)?)
                } else {
                    Value::Object(object.clone())
                }
            }
        };
        Ok(Some(value))
    }

    fn decode_nested(
        &self,
        table: &mut IdentityTable,
        attribute: &Attribute,
        sub_type: &str,
        json: &JsonValue,
    ) -> ModelResult<Entity> {
        let received = match json {
            JsonValue::Object(object) => match object.get(record::TYPE) {
                None => None,
                Some(JsonValue::String(tag)) if tag == sub_type => None,
                Some(JsonValue::String(tag)) => Some(tag.clone()),
                Some(other) => Some(json_kind(other).to_string()),
            },
            other => Some(json_kind(other).to_string()),
        };
        if let Some(received) = received {
            return Err(ModelError::TypeMismatch {
                attribute: attribute.name().to_string(),
                expected: sub_type.to_string(),
                received,
            });
        }
        self.reconcile_record(table, json, Some(sub_type))
    }
}

/// Resolves every attribute field of a record, skipping markers.
fn attributes_of<'t, 'r>(
    entity_type: &'t EntityType,
    object: &'r Map<String, JsonValue>,
) -> ModelResult<Vec<(&'t Attribute, &'r JsonValue)>> {
    object
        .iter()
        .filter(|(name, _)| !record::is_marker(name))
        .map(|(name, json)| Ok((entity_type.attribute(name)?, json)))
        .collect()
}

/// First tracked instance matching one of the record's identifiers, in
/// declaration order.
fn probe(
    table: &IdentityTable,
    entity_type: &EntityType,
    object: &Map<String, JsonValue>,
) -> Option<Entity> {
    entity_type
        .identifier_attributes()
        .find_map(|attribute| match object.get(attribute.name()) {
            Some(JsonValue::String(value)) => {
                table.lookup(entity_type.name(), attribute.name(), value)
            }
            _ => None,
        })
}

fn decode_date(attribute: &Attribute, object: &Map<String, JsonValue>) -> ModelResult<DateTime<Utc>> {
    let raw = object
        .get(record::VALUE)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| {
            ModelError::InvalidRecord(format!(
                "date for attribute '{}' is missing its '{}' string",
                attribute.name(),
                record::VALUE
            ))
        })?;
    DateTime::parse_from_rfc3339(raw)
        .map(|date| date.with_timezone(&Utc))
        .map_err(|e| {
            ModelError::InvalidRecord(format!(
                "invalid date for attribute '{}': {e}",
                attribute.name()
            ))
        })
}

fn json_kind(json: &JsonValue) -> &'static str {
    match json {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
