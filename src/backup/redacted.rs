//! Secret string handling with redacted display and serialization.
//!
//! `RedactedString` holds credentials, database passwords and key material.
//! Debug output and regular serialization only ever show a placeholder. The one
//! place that needs the real value (the driver argument blob) goes through
//! [`Revealed`] explicitly.

use bon::Builder;
use derive_more::From;
use getset::Getters;
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Debug, Formatter};
use std::result;
use validator::Validate;
use zeroize::Zeroize;

/// Placeholder text shown instead of the actual secret in logs/debug output
pub static REDACTED_SECRET: &str = "###REDACTED_SECRET###";

#[derive(Validate, Clone, Zeroize, From, Builder, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct RedactedString {
    #[validate(length(min = 1))]
    #[builder(into)]
    inner: String,
}

impl RedactedString {
    pub fn new<S: Into<String>>(inner: S) -> Self {
        Self::builder().inner(inner).build()
    }

    pub fn expose(&self) -> &str {
        self.inner.as_str()
    }
}

impl From<&str> for RedactedString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl Debug for RedactedString {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", REDACTED_SECRET)
    }
}

impl Serialize for RedactedString {
    fn serialize<S: Serializer>(&self, serializer: S) -> result::Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED_SECRET)
    }
}

impl<'de> Deserialize<'de> for RedactedString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> result::Result<Self, D::Error> {
        deserializer.deserialize_str(RedactedStringVisitor)
    }
}

impl Drop for RedactedString {
    fn drop(&mut self) {
        self.zeroize();
    }
}

pub struct RedactedStringVisitor;

impl Visitor<'_> for RedactedStringVisitor {
    type Value = RedactedString;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a string")
    }

    fn visit_str<E>(self, v: &str) -> result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(RedactedString::new(v))
    }
}

/// Serializes the wrapped secret in clear text.
///
/// Only used when building the argument blob handed to a driver process.
pub struct Revealed<'a>(pub &'a RedactedString);

impl Serialize for Revealed<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.expose())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_string_debug() {
        let redacted = RedactedString::new("hunter22");
        assert_eq!(format!("{:?}", redacted), REDACTED_SECRET);
    }

    #[test]
    fn test_redacted_string_serialize() {
        let redacted = RedactedString::new("hunter22");
        let serialized = serde_json::to_string(&redacted).unwrap();
        assert_eq!(serialized, format!("\"{}\"", REDACTED_SECRET));
    }

    #[test]
    fn test_revealed_serialize() {
        let redacted = RedactedString::new("hunter22");
        let serialized = serde_json::to_string(&Revealed(&redacted)).unwrap();
        assert_eq!(serialized, "\"hunter22\"");
    }

    #[test]
    fn test_redacted_string_deserialize() {
        let redacted: RedactedString = serde_json::from_str("\"s3cr3t\"").unwrap();
        assert_eq!(redacted.expose(), "s3cr3t");
    }

    #[test]
    fn test_redacted_string_validation() {
        assert!(RedactedString::new("x").validate().is_ok());
        assert!(RedactedString::new("").validate().is_err());
    }
}
