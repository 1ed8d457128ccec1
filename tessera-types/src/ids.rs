//! Primary identifier generation.
//!
//! Identifiers are drawn from the thread-local CSPRNG behind
//! `rand::thread_rng()`, so generators can be shared across threads without
//! coordination. Collisions are treated as negligible, not excluded.

use crate::{Error, IdFormat, ModelConfig, Result};
use rand::Rng;
use uuid::Uuid;

/// Shortest identifier the url-safe format may be configured to produce.
pub const MIN_ID_LENGTH: usize = 21;

const URL_SAFE_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// Produces fresh primary identifier values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdGenerator {
    format: IdFormat,
    length: usize,
}

impl IdGenerator {
    /// Creates a generator from a configuration, validating it first.
    pub fn new(config: &ModelConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            format: config.id_format,
            length: config.id_length,
        })
    }

    /// Creates a url-safe generator of the given length.
    pub fn url_safe(length: usize) -> Result<Self> {
        if length < MIN_ID_LENGTH {
            return Err(Error::InvalidConfig(format!(
                "id_length must be at least {MIN_ID_LENGTH} (got {length})"
            )));
        }
        Ok(Self {
            format: IdFormat::UrlSafe,
            length,
        })
    }

    /// Returns the configured identifier format.
    #[must_use]
    pub fn format(&self) -> IdFormat {
        self.format
    }

    /// Returns the generated length (fixed at 36 for UUIDs).
    #[must_use]
    pub fn length(&self) -> usize {
        match self.format {
            IdFormat::UrlSafe => self.length,
            IdFormat::UuidV4 => 36,
        }
    }

    /// Generates a new identifier.
    #[must_use]
    pub fn generate(&self) -> String {
        match self.format {
            IdFormat::UrlSafe => {
                let mut rng = rand::thread_rng();
                (0..self.length)
                    .map(|_| URL_SAFE_ALPHABET[rng.gen_range(0..URL_SAFE_ALPHABET.len())] as char)
                    .collect()
            }
            IdFormat::UuidV4 => Uuid::new_v4().to_string(),
        }
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        let config = ModelConfig::default();
        Self {
            format: config.id_format,
            length: config.id_length,
        }
    }
}

/// Generates an identifier with the default configuration.
#[must_use]
pub fn generate_id() -> String {
    IdGenerator::default().generate()
}
