//! Object storage backends.
//!
//! Everything above this module talks to [`ObjectStorage`]. [`s3::S3Storage`]
//! is the production implementation; tests use an in-memory double.

pub mod credentials;
#[cfg(test)]
pub mod memory;
pub mod s3;

use crate::backup::result_error::result::Result;
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::Path;
use std::time::Duration;

pub static STANDARD_CLASS: &str = "STANDARD";
pub static GLACIER_CLASS: &str = "GLACIER";
pub static DEEP_ARCHIVE_CLASS: &str = "DEEP_ARCHIVE";

/// Storage tier an artifact is written to and swept in.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[display("standard")]
    Standard,
    #[display("glacier")]
    Glacier,
}

impl Tier {
    pub fn from_glacier_mode(glacier: bool) -> Self {
        if glacier {
            Tier::Glacier
        } else {
            Tier::Standard
        }
    }

    pub fn is_glacier(&self) -> bool {
        matches!(self, Tier::Glacier)
    }

    /// Storage class requested on upload.
    pub fn upload_class(&self) -> &'static str {
        match self {
            Tier::Standard => STANDARD_CLASS,
            Tier::Glacier => GLACIER_CLASS,
        }
    }

    /// Tier an object with the given storage class belongs to. Anything that is
    /// not an archive class counts as standard.
    pub fn of_class(class: &str) -> Self {
        if class == GLACIER_CLASS || class == DEEP_ARCHIVE_CLASS {
            Tier::Glacier
        } else {
            Tier::Standard
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// Synchronous view of one bucket.
pub trait ObjectStorage: Debug + Send + Sync {
    /// Target name, also used as the credentials profile.
    fn name(&self) -> &str;

    fn upload(&self, local: &Path, key: &str, tier: Tier) -> Result<()>;

    /// Downloads `key` to `local`, creating parent directories as needed.
    fn download(&self, key: &str, local: &Path) -> Result<()>;

    /// Objects under `prefix`. Only the first page the backend returns.
    fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>>;

    /// Storage class reported by the backend. Backends that omit the class for
    /// standard objects report `STANDARD`.
    fn storage_class(&self, key: &str) -> Result<String>;

    fn delete(&self, key: &str) -> Result<()>;

    fn bucket_exists(&self) -> Result<bool>;

    fn create_bucket(&self) -> Result<()>;

    fn presigned_url(&self, key: &str, ttl: Duration) -> Result<String>;

    fn ensure_bucket(&self) -> Result<()> {
        if !self.bucket_exists()? {
            tracing::info!(source = self.name(), "Bucket missing, creating it");
            self.create_bucket()?;
        }
        Ok(())
    }
}

/// `backups/site` + `a.enc` -> `backups/site/a.enc`.
pub fn join_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

/// Listing prefix that only matches keys inside the `prefix` namespace.
pub fn list_prefix(prefix: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        String::new()
    } else {
        format!("{prefix}/")
    }
}
