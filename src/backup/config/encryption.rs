use crate::backup::encrypt::{EnvKeyProvider, HexKeyProvider, KeyProvider};
use crate::backup::redacted::RedactedString;
use crate::backup::validate::validate_hex_key;
use serde::{Deserialize, Serialize};
use std::result;
use validator::{Validate, ValidationErrors};

/// Where the symmetric key comes from.
#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(tag = "key_source")]
#[serde(rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum EncryptionConfig {
    Hex { key: RedactedString },
    Env { var: String },
}

impl EncryptionConfig {
    pub fn key_provider(&self) -> Box<dyn KeyProvider> {
        match self {
            EncryptionConfig::Hex { key } => Box::new(HexKeyProvider::new(key.clone())),
            EncryptionConfig::Env { var } => Box::new(EnvKeyProvider::new(var.as_str())),
        }
    }
}

impl Validate for EncryptionConfig {
    fn validate(&self) -> result::Result<(), ValidationErrors> {
        match self {
            EncryptionConfig::Hex { key } => validate_hex_key(key.expose()).map_err(|e| {
                let mut errors = ValidationErrors::new();
                errors.add("key", e);
                errors
            }),
            // resolved when the cipher is built
            EncryptionConfig::Env { .. } => Ok(()),
        }
    }
}
