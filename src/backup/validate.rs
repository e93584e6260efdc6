//! Validation functions for configuration values.
//!
//! Custom `validator` hooks for backup names, staging directories, cron
//! expressions, remote prefixes, manifest versions and hex encryption keys.

use chrono::Utc;
use sanitize_filename::{is_sanitized, sanitize};
use validator::ValidationError;

use std::path::Path;

/// Key lengths accepted by the cipher: AES-128, AES-192 and AES-256.
pub const VALID_KEY_LENGTHS: [usize; 3] = [16, 24, 32];

pub fn validate_backup_name<S: AsRef<str>>(name: S) -> Result<(), ValidationError> {
    let name = name.as_ref();
    if name.is_empty() {
        return Err(ValidationError::new("InvalidBackupName")
            .with_message("backup name must not be empty".into()));
    }
    if !is_sanitized(name) {
        return Err(ValidationError::new("InvalidBackupName").with_message(
            format!("Invalid backup name, try sanitizing like {:?}", sanitize(name)).into(),
        ));
    }

    Ok(())
}

pub fn validate_dir_exist_or_created<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.exists() {
        if !dir.is_dir() {
            return Err(ValidationError::new("InvalidDirectory")
                .with_message(format!("{:?} is not a directory", dir).into()));
        }
    } else {
        return std::fs::create_dir_all(dir).map_err(|e| {
            ValidationError::new("InvalidDirectory").with_message(
                format!("cannot create or access staging path {:?}: {}", dir, e).into(),
            )
        });
    }

    Ok(())
}

pub fn validate_cron_str<S: AsRef<str>>(cron: S) -> Result<(), ValidationError> {
    let cron = cron.as_ref();
    if cron_parser::parse(cron, &Utc::now()).is_err() {
        return Err(ValidationError::new("InvalidCron")
            .with_message(format!("Invalid cron string: {cron:?}").into()));
    }

    Ok(())
}

pub fn validate_remote_prefix<S: AsRef<str>>(prefix: S) -> Result<(), ValidationError> {
    let prefix = prefix.as_ref();
    if prefix.starts_with('/') || prefix.contains("//") {
        return Err(ValidationError::new("InvalidRemotePrefix").with_message(
            format!("remote prefix {prefix:?} must be relative and must not contain '//'").into(),
        ));
    }

    Ok(())
}

/// Accepts `MAJOR.MINOR.PATCH` with an optional `-pre` or `+build` suffix.
pub fn validate_semver<S: AsRef<str>>(version: S) -> Result<(), ValidationError> {
    let version = version.as_ref();
    let core = version.split(['-', '+']).next().unwrap_or_default();
    let parts: Vec<_> = core.split('.').collect();
    let valid = parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));
    if !valid {
        return Err(ValidationError::new("InvalidVersion")
            .with_message(format!("{version:?} is not a semantic version").into()));
    }

    Ok(())
}

pub fn validate_hex_key<S: AsRef<str>>(key: S) -> Result<(), ValidationError> {
    let decoded = hex::decode(key.as_ref().trim()).map_err(|e| {
        ValidationError::new("InvalidKey")
            .with_message(format!("encryption key is not valid hex: {e}").into())
    })?;
    if !VALID_KEY_LENGTHS.contains(&decoded.len()) {
        return Err(ValidationError::new("InvalidKey").with_message(
            format!(
                "encryption key must be 16, 24 or 32 bytes, got {}",
                decoded.len()
            )
            .into(),
        ));
    }

    Ok(())
}
