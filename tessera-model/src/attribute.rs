use crate::error::{ModelError, ModelResult};
use crate::value::Value;
use tessera_types::ValueType;

/// Primary or secondary identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifierKind {
    /// At most one per type; generated on first read when unset.
    Primary,
    /// Any number per type; always supplied explicitly.
    Secondary,
}

/// Whether an attribute is plain data or participates in identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeRole {
    Plain,
    Identifier(IdentifierKind),
}

/// A typed, named slot on an entity type.
///
/// Attributes are created by [`EntityType`](crate::EntityType) declarations
/// and are immutable afterwards. The owning type is referenced by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    name: String,
    parent: String,
    value_type: ValueType,
    nullable: bool,
    role: AttributeRole,
}

impl Attribute {
    pub(crate) fn plain(parent: &str, name: &str, value_type: ValueType, nullable: bool) -> Self {
        Self {
            name: name.to_string(),
            parent: parent.to_string(),
            value_type,
            nullable,
            role: AttributeRole::Plain,
        }
    }

    pub(crate) fn identifier(parent: &str, name: &str, kind: IdentifierKind) -> Self {
        Self {
            name: name.to_string(),
            parent: parent.to_string(),
            value_type: ValueType::String,
            nullable: false,
            role: AttributeRole::Identifier(kind),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the entity type that declared this attribute.
    pub fn parent(&self) -> &str {
        &self.parent
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn role(&self) -> AttributeRole {
        self.role
    }

    pub fn identifier_kind(&self) -> Option<IdentifierKind> {
        match self.role {
            AttributeRole::Identifier(kind) => Some(kind),
            AttributeRole::Plain => None,
        }
    }

    pub fn is_identifier(&self) -> bool {
        self.identifier_kind().is_some()
    }

    pub fn is_primary_identifier(&self) -> bool {
        self.identifier_kind() == Some(IdentifierKind::Primary)
    }

    pub fn is_secondary_identifier(&self) -> bool {
        self.identifier_kind() == Some(IdentifierKind::Secondary)
    }

    /// Checks a candidate value against the declared kind.
    ///
    /// `None` stands for the unset state and is only accepted on nullable
    /// attributes. There is no coercion between kinds; nested entities must
    /// also be of the referenced type.
    pub fn validate(&self, value: Option<&Value>) -> ModelResult<()> {
        let Some(value) = value else {
            if self.nullable {
                return Ok(());
            }
            return Err(self.mismatch("undefined"));
        };

        // NaN and infinities have no JSON encoding.
        if let Value::Number(n) = value {
            if !n.is_finite() {
                return Err(self.mismatch("non-finite number"));
            }
        }

        let matches = match (&self.value_type, value) {
            (ValueType::String, Value::String(_))
            | (ValueType::Number, Value::Number(_))
            | (ValueType::Boolean, Value::Boolean(_))
            | (ValueType::Object, Value::Object(_))
            | (ValueType::Array, Value::Array(_))
            | (ValueType::Date, Value::Date(_)) => true,
            (ValueType::Entity(expected), Value::Entity(entity)) => {
                if entity.type_name() != expected {
                    return Err(self.mismatch(entity.type_name()));
                }
                true
            }
            (ValueType::EntityArray(expected), Value::EntityArray(entities)) => {
                if let Some(other) = entities.iter().find(|e| e.type_name() != expected) {
                    return Err(self.mismatch(&format!("{}[]", other.type_name())));
                }
                true
            }
            (
                ValueType::String
                | ValueType::Number
                | ValueType::Boolean
                | ValueType::Object
                | ValueType::Array
                | ValueType::Date
                | ValueType::Entity(_)
                | ValueType::EntityArray(_),
                _,
            ) => false,
        };

        if matches {
            Ok(())
        } else {
            Err(self.mismatch(value.kind()))
        }
    }

    fn mismatch(&self, received: &str) -> ModelError {
        ModelError::TypeMismatch {
            attribute: self.name.clone(),
            expected: self.value_type.to_string(),
            received: received.to_string(),
        }
    }
}
