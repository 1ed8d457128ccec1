use crate::attribute::{Attribute, IdentifierKind};
use crate::error::{IdentifierExpectation, ModelError, ModelResult};
use tessera_types::ValueType;

/// Type-level metadata for one kind of entity.
///
/// Attributes keep their declaration order; identifier iteration follows it.
/// A type is built with the `declare_*` calls once at start-up and then
/// frozen by registering it in a [`Schema`](crate::Schema).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityType {
    name: String,
    attributes: Vec<Attribute>,
    primary: Option<usize>,
}

impl EntityType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            primary: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ── Declarations ─────────────────────────────────────────────

    /// Declares a required plain attribute.
    pub fn declare_attribute(
        &mut self,
        name: &str,
        value_type: ValueType,
    ) -> ModelResult<&Attribute> {
        let attribute = Attribute::plain(&self.name, name, value_type, false);
        self.push(attribute)
    }

    /// Declares a plain attribute that may be left unset.
    pub fn declare_nullable_attribute(
        &mut self,
        name: &str,
        value_type: ValueType,
    ) -> ModelResult<&Attribute> {
        let attribute = Attribute::plain(&self.name, name, value_type, true);
        self.push(attribute)
    }

    /// Declares the primary identifier. A second declaration always fails,
    /// whatever its name.
    pub fn declare_primary_identifier(&mut self, name: &str) -> ModelResult<&Attribute> {
        if self.primary.is_some() {
            return Err(ModelError::PrimaryIdentifierAlreadyDeclared {
                entity_type: self.name.clone(),
            });
        }
        let attribute = Attribute::identifier(&self.name, name, IdentifierKind::Primary);
        self.ensure_free(name)?;
        self.primary = Some(self.attributes.len());
        self.push(attribute)
    }

    pub fn declare_secondary_identifier(&mut self, name: &str) -> ModelResult<&Attribute> {
        let attribute = Attribute::identifier(&self.name, name, IdentifierKind::Secondary);
        self.push(attribute)
    }

    fn ensure_free(&self, name: &str) -> ModelResult<()> {
        if self.attributes.iter().any(|a| a.name() == name) {
            return Err(ModelError::DuplicateAttribute {
                entity_type: self.name.clone(),
                property: name.to_string(),
            });
        }
        Ok(())
    }

    fn push(&mut self, attribute: Attribute) -> ModelResult<&Attribute> {
        self.ensure_free(attribute.name())?;
        self.attributes.push(attribute);
        Ok(&self.attributes[self.attributes.len() - 1])
    }

    // ── Lookups ──────────────────────────────────────────────────

    /// All attributes in declaration order.
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> + Clone {
        self.attributes.iter()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.name() == name)
    }

    pub fn attribute(&self, name: &str) -> ModelResult<&Attribute> {
        self.attributes
            .iter()
            .find(|a| a.name() == name)
            .ok_or_else(|| ModelError::UnknownProperty {
                entity_type: self.name.clone(),
                property: name.to_string(),
            })
    }

    pub fn identifier_attribute(&self, name: &str) -> ModelResult<&Attribute> {
        let attribute = self.attribute(name)?;
        if !attribute.is_identifier() {
            return Err(ModelError::NotAnIdentifierAttribute {
                property: name.to_string(),
                expected: IdentifierExpectation::Any,
            });
        }
        Ok(attribute)
    }

    pub fn primary_identifier_attribute(&self) -> ModelResult<&Attribute> {
        self.primary
            .map(|index| &self.attributes[index])
            .ok_or_else(|| ModelError::NoPrimaryIdentifierDeclared {
                entity_type: self.name.clone(),
            })
    }

    pub fn secondary_identifier_attribute(&self, name: &str) -> ModelResult<&Attribute> {
        let attribute = self.identifier_attribute(name)?;
        if !attribute.is_secondary_identifier() {
            return Err(ModelError::NotAnIdentifierAttribute {
                property: name.to_string(),
                expected: IdentifierExpectation::Secondary,
            });
        }
        Ok(attribute)
    }

    /// Returns false for unknown names and fails when `name` is a plain
    /// attribute.
    pub fn has_identifier_attribute(&self, name: &str) -> ModelResult<bool> {
        if !self.has_attribute(name) {
            return Ok(false);
        }
        self.identifier_attribute(name).map(|_| true)
    }

    pub fn has_primary_identifier_attribute(&self) -> bool {
        self.primary.is_some()
    }

    /// Returns false for unknown names and fails when `name` exists with
    /// another role.
    pub fn has_secondary_identifier_attribute(&self, name: &str) -> ModelResult<bool> {
        if !self.has_attribute(name) {
            return Ok(false);
        }
        self.secondary_identifier_attribute(name).map(|_| true)
    }

    /// Identifier attributes in declaration order. Each call starts a fresh
    /// iteration.
    pub fn identifier_attributes(&self) -> impl Iterator<Item = &Attribute> + Clone {
        self.attributes.iter().filter(|a| a.is_identifier())
    }

    pub fn secondary_identifier_attributes(&self) -> impl Iterator<Item = &Attribute> + Clone {
        self.attributes
            .iter()
            .filter(|a| a.is_secondary_identifier())
    }
}
