use crate::backup::redacted::RedactedString;
use crate::backup::validate::validate_backup_name;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// One S3-compatible destination. `name` doubles as the credentials profile.
#[derive(Clone, Serialize, Deserialize, Debug, Validate)]
#[serde(deny_unknown_fields)]
pub struct StorageTarget {
    #[validate(custom(function = validate_backup_name))]
    pub name: String,
    #[validate(length(min = 1))]
    pub endpoint: String,
    #[validate(length(min = 1))]
    pub bucket: String,
    #[serde(default = "default_region")]
    #[validate(length(min = 1))]
    pub region: String,
    #[validate(length(min = 1))]
    pub access_key: String,
    pub secret_key: RedactedString,
    #[serde(default)]
    pub path_style: bool,
    #[serde(default)]
    pub create_bucket: bool,
}

fn default_region() -> String {
    "us-east-1".to_string()
}
