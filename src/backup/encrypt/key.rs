use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::validate::VALID_KEY_LENGTHS;
use std::fmt::{Debug, Formatter};
use zeroize::Zeroizing;

/// Source of the raw symmetric key.
pub trait KeyProvider: Debug + Send + Sync {
    fn key(&self) -> Result<Zeroizing<Vec<u8>>>;
}

fn decode_hex(source: &str, hex_key: &str) -> Result<Zeroizing<Vec<u8>>> {
    let key = Zeroizing::new(hex::decode(hex_key.trim()).map_err(|e| {
        Error::configuration(format!("{source}: encryption key is not valid hex: {e}"))
    })?);
    check_len(source, key)
}

fn check_len(source: &str, key: Zeroizing<Vec<u8>>) -> Result<Zeroizing<Vec<u8>>> {
    if !VALID_KEY_LENGTHS.contains(&key.len()) {
        return Err(Error::configuration(format!(
            "{source}: encryption key must be 16, 24 or 32 bytes, got {}",
            key.len()
        )));
    }
    Ok(key)
}

/// Hex key taken straight from the configuration file.
#[derive(Debug, Clone)]
pub struct HexKeyProvider {
    key: RedactedString,
}

impl HexKeyProvider {
    pub fn new<K: Into<RedactedString>>(key: K) -> Self {
        Self { key: key.into() }
    }
}

impl KeyProvider for HexKeyProvider {
    fn key(&self) -> Result<Zeroizing<Vec<u8>>> {
        decode_hex("inline key", self.key.expose())
    }
}

/// Hex key read from an environment variable when the cipher is built.
#[derive(Debug, Clone)]
pub struct EnvKeyProvider {
    var: String,
}

impl EnvKeyProvider {
    pub fn new<S: Into<String>>(var: S) -> Self {
        Self { var: var.into() }
    }
}

impl KeyProvider for EnvKeyProvider {
    fn key(&self) -> Result<Zeroizing<Vec<u8>>> {
        let value = Zeroizing::new(std::env::var(&self.var).map_err(|e| {
            Error::configuration(format!("encryption key variable {:?}: {e}", self.var))
        })?);
        decode_hex(&self.var, &value)
    }
}

/// Raw key bytes, mostly for tests.
#[derive(Clone)]
pub struct StaticKeyProvider(Zeroizing<Vec<u8>>);

impl StaticKeyProvider {
    pub fn new<B: Into<Vec<u8>>>(bytes: B) -> Self {
        Self(Zeroizing::new(bytes.into()))
    }
}

impl Debug for StaticKeyProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "StaticKeyProvider({} bytes)", self.0.len())
    }
}

impl KeyProvider for StaticKeyProvider {
    fn key(&self) -> Result<Zeroizing<Vec<u8>>> {
        check_len("static key", self.0.clone())
    }
}
