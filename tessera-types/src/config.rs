use crate::{Error, Result, MIN_ID_LENGTH};
use serde::{Deserialize, Serialize};

/// How primary identifiers are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdFormat {
    /// Random characters from `[A-Za-z0-9_-]`, `id_length` long.
    UrlSafe,
    /// A random (v4) UUID in its hyphenated form.
    UuidV4,
}

/// Configuration for the entity model.
///
/// Every field has a default, so a partial JSON document such as
/// `{"id_length": 32}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Format of auto-generated primary identifiers.
    pub id_format: IdFormat,
    /// Length of url-safe identifiers. Ignored for UUIDs.
    pub id_length: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            id_format: IdFormat::UrlSafe,
            id_length: 25,
        }
    }
}

impl ModelConfig {
    /// Parses and validates a configuration from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that generated identifiers stay practically collision-free.
    pub fn validate(&self) -> Result<()> {
        if self.id_format == IdFormat::UrlSafe && self.id_length < MIN_ID_LENGTH {
            return Err(Error::InvalidConfig(format!(
                "id_length must be at least {MIN_ID_LENGTH} (got {})",
                self.id_length
            )));
        }
        Ok(())
    }
}
