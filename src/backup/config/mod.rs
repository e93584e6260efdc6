//! YAML configuration: encryption key source, storage targets, backup
//! definitions and runtime knobs.
//!
//! `${{ VAR }}` placeholders anywhere in the file are replaced with the
//! value of the environment variable before parsing. Unset variables are
//! left as written.

pub mod definition;
pub mod encryption;
pub mod target;

use crate::backup::config::definition::BackupDefinition;
use crate::backup::config::encryption::EncryptionConfig;
use crate::backup::config::target::StorageTarget;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::{convert_error_vec, Result};
use crate::backup::result_error::WithMsg;
use crate::backup::validate::validate_backup_name;
use itertools::Itertools;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use validator::Validate;

static ENV_PLACEHOLDER: &str = r"\$\{\{\s*(\w+)\s*\}\}";

#[skip_serializing_none]
#[derive(Clone, Serialize, Deserialize, Debug, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub encryption: EncryptionConfig,
    /// Shared credentials file; `~/.aws/credentials` when unset.
    pub credentials_file: Option<PathBuf>,
    #[serde(default = "default_modules_dir")]
    pub modules_dir: PathBuf,
    #[serde(default = "default_upload_parallelism")]
    #[validate(range(min = 1, max = 64))]
    pub upload_parallelism: usize,
    #[serde(with = "humantime_serde", default = "default_presign_ttl")]
    pub presign_ttl: Duration,
    #[validate(length(min = 1))]
    pub storage: Vec<StorageTarget>,
    #[serde(default)]
    pub backups: BTreeMap<String, BackupDefinition>,
}

fn default_modules_dir() -> PathBuf {
    PathBuf::from("./modules")
}

fn default_upload_parallelism() -> usize {
    1
}

fn default_presign_ttl() -> Duration {
    Duration::from_secs(3600)
}

/// Replaces `${{ VAR }}` with the value of `VAR` when it is set.
pub fn resolve_env_placeholders(text: &str) -> Result<String> {
    let re = Regex::new(ENV_PLACEHOLDER).map_err(|e| Error::configuration(e.to_string()))?;
    Ok(re
        .replace_all(text, |caps: &Captures| match std::env::var(&caps[1]) {
            Ok(value) => value,
            Err(_) => {
                warn!("Environment variable {} is not set, keeping placeholder", &caps[1]);
                caps[0].to_string()
            }
        })
        .into_owned())
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        std::fs::read_to_string(path)
            .map_err(Error::from)
            .and_then(|text| Self::from_yaml_str(&text))
            .with_msg(format!("Loading config {:?} failed", path))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let resolved = resolve_env_placeholders(text)?;
        let config: AppConfig = serde_yml::from_str(&resolved)
            .map_err(Error::from)
            .with_msg("Parse YAML config failed")?;
        config.check()?;
        debug!(
            "Loaded {} storage targets and {} backup definitions",
            config.storage.len(),
            config.backups.len()
        );
        Ok(config)
    }

    /// Validates every part of the configuration and reports all problems at
    /// once.
    pub fn check(&self) -> Result<()> {
        let mut errors = vec![];
        if let Err(e) = self.validate() {
            errors.push(Error::from(e).with_msg("Config validation failed"));
        }
        if let Err(e) = self.encryption.validate() {
            errors.push(Error::from(e).with_msg("Invalid encryption settings"));
        }

        for target in &self.storage {
            if let Err(e) = target.validate().and(target.secret_key.validate()) {
                errors.push(Error::from(e).with_msg(format!("Invalid storage target {:?}", target.name)));
            }
        }
        for name in self.storage.iter().map(|t| t.name.as_str()).duplicates() {
            errors.push(Error::configuration(format!("duplicate storage target name {name:?}")));
        }

        for (name, definition) in &self.backups {
            if let Err(e) = validate_backup_name(name) {
                errors.push(Error::configuration(format!("invalid backup name {name:?}: {e}")));
            }
            if let Err(e) = definition.validate_all() {
                errors.push(Error::from(e).with_msg(format!("Invalid backup definition {name:?}")));
            }
        }

        convert_error_vec(errors)
    }

    pub fn definition(&self, name: &str) -> Result<&BackupDefinition> {
        self.backups
            .get(name)
            .ok_or_else(|| Error::configuration(format!("unknown backup {name:?}")))
    }

    /// Index of the named target, or of the first one when no name is given.
    pub fn target_index(&self, name: Option<&str>) -> Result<usize> {
        match name {
            None if self.storage.is_empty() => {
                Err(Error::configuration("no storage target configured"))
            }
            None => Ok(0),
            Some(name) => self
                .storage
                .iter()
                .position(|t| t.name == name)
                .ok_or_else(|| Error::configuration(format!("unknown storage target {name:?}"))),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    pub(crate) fn sample_yaml(staging: &Path) -> String {
        format!(
            r#"
encryption:
  key_source: hex
  key: "{key}"
modules_dir: ./modules
storage:
  - name: minio
    endpoint: http://localhost:9000
    bucket: backups
    access_key: ak
    secret_key: ${{{{ TIER_BACKUP_TEST_SECRET }}}}
    path_style: true
  - name: wasabi
    endpoint: https://s3.wasabisys.com
    bucket: offsite
    region: eu-central-1
    access_key: ak2
    secret_key: sk2
backups:
  folder-site:
    source:
      type: folder
      folders: [/srv/www]
    path:
      local: {staging:?}
      remote: backups/site
    retention:
      standard: {{ days: 7 }}
      glacier: {{ days: 365 }}
    schedule:
      standard: "0 3 * * *"
"#,
            key = "0f".repeat(32),
            staging = staging,
        )
    }

    #[test]
    fn test_load_full_config() {
        std::env::set_var("TIER_BACKUP_TEST_SECRET", "from-env");
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, sample_yaml(&dir.path().join("staging"))).unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.storage.len(), 2);
        assert_eq!(config.storage[0].secret_key.expose(), "from-env");
        assert_eq!(config.storage[1].region, "eu-central-1");
        assert_eq!(config.upload_parallelism, 1);
        assert_eq!(config.presign_ttl, Duration::from_secs(3600));
        assert_eq!(config.target_index(None).unwrap(), 0);
        assert_eq!(config.target_index(Some("wasabi")).unwrap(), 1);
        assert!(config.target_index(Some("nope")).is_err());

        let def = config.definition("folder-site").unwrap();
        assert_eq!(def.path.remote, "backups/site");
        assert_eq!(def.retention.standard.days, Some(7));
        assert!(config.definition("missing").is_err());
    }

    #[test]
    fn test_unset_placeholder_is_kept() {
        let text = resolve_env_placeholders("a: ${{ TIER_BACKUP_TEST_NEVER_SET }}").unwrap();
        assert_eq!(text, "a: ${{ TIER_BACKUP_TEST_NEVER_SET }}");
    }

    #[test]
    fn test_placeholder_without_spaces() {
        std::env::set_var("TIER_BACKUP_TEST_TIGHT", "v");
        assert_eq!(
            resolve_env_placeholders("x: ${{TIER_BACKUP_TEST_TIGHT}}").unwrap(),
            "x: v"
        );
    }

    #[test]
    fn test_duplicate_targets_and_bad_names_are_all_reported() {
        std::env::set_var("TIER_BACKUP_TEST_SECRET", "from-env");
        let dir = TempDir::new().unwrap();
        let yaml = sample_yaml(&dir.path().join("staging"))
            .replace("name: wasabi", "name: minio")
            .replace("folder-site:", "bad/name:");

        let err = AppConfig::from_yaml_str(&yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate storage target name"));
        assert!(err.to_string().contains("invalid backup name"));
    }

    #[test]
    fn test_zero_parallelism_is_rejected() {
        std::env::set_var("TIER_BACKUP_TEST_SECRET", "from-env");
        let dir = TempDir::new().unwrap();
        let yaml = format!(
            "{}upload_parallelism: 0\n",
            sample_yaml(&dir.path().join("staging"))
        );
        assert!(AppConfig::from_yaml_str(&yaml).is_err());
    }
}
