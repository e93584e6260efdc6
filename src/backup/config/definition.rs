use crate::backup::redacted::{RedactedString, Revealed};
use crate::backup::retention::RetentionPolicy;
use crate::backup::validate::{validate_cron_str, validate_dir_exist_or_created, validate_remote_prefix};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use serde_with::skip_serializing_none;
use std::path::PathBuf;
use std::result;
use validator::{Validate, ValidationErrors};

/// One named backup: which driver produces it, where it is staged and where
/// it lands remotely.
#[derive(Clone, Serialize, Deserialize, Debug, Validate)]
#[serde(deny_unknown_fields)]
pub struct BackupDefinition {
    pub source: DriverParams,
    pub path: PathConfig,
    #[serde(default)]
    pub retention: RetentionPolicy,
    #[serde(default)]
    pub schedule: Schedule,
}

impl BackupDefinition {
    /// Validates the definition together with its nested parts.
    pub fn validate_all(&self) -> result::Result<(), ValidationErrors> {
        self.source.validate()?;
        self.path.validate()?;
        self.schedule.validate()
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, Validate)]
#[serde(deny_unknown_fields)]
pub struct PathConfig {
    /// Staging directory handed to the driver.
    #[validate(custom(function = validate_dir_exist_or_created))]
    pub local: PathBuf,
    /// Key prefix inside every target bucket.
    #[validate(custom(function = validate_remote_prefix))]
    pub remote: String,
}

/// Cron expressions used by an external scheduler. Only validated here.
#[skip_serializing_none]
#[derive(Clone, Default, Serialize, Deserialize, Debug, Validate)]
#[serde(deny_unknown_fields)]
pub struct Schedule {
    #[validate(custom(function = validate_cron_str))]
    pub standard: Option<String>,
    #[validate(custom(function = validate_cron_str))]
    pub glacier: Option<String>,
}

/// Driver parameters, one variant per supported source type.
#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum DriverParams {
    Folder(FolderParams),
    Mysql(MysqlParams),
    Mongo(MongoParams),
    S3(S3SourceParams),
    Kubernetes(KubernetesParams),
}

#[derive(Clone, Serialize, Deserialize, Debug, Validate)]
pub struct FolderParams {
    #[validate(length(min = 1))]
    pub folders: Vec<PathBuf>,
}

#[derive(Clone, Serialize, Deserialize, Debug, Validate)]
pub struct MysqlParams {
    #[validate(length(min = 1))]
    pub host: String,
    #[serde(default = "default_mysql_port")]
    pub port: u16,
    #[validate(length(min = 1))]
    pub user: String,
    pub password: RedactedString,
    #[validate(length(min = 1))]
    pub databases: Vec<String>,
    #[serde(default)]
    pub ssl: bool,
}

fn default_mysql_port() -> u16 {
    3306
}

#[derive(Clone, Serialize, Deserialize, Debug, Validate)]
pub struct MongoParams {
    pub uri: RedactedString,
    #[serde(default)]
    pub databases: Vec<String>,
}

#[derive(Clone, Serialize, Deserialize, Debug, Validate)]
pub struct S3SourceParams {
    #[validate(length(min = 1))]
    pub endpoint: String,
    #[validate(length(min = 1))]
    pub region: String,
    #[validate(length(min = 1))]
    pub buckets: Vec<String>,
    #[validate(length(min = 1))]
    pub access_key: String,
    pub secret_key: RedactedString,
    #[serde(default)]
    pub path_style: bool,
}

#[skip_serializing_none]
#[derive(Clone, Serialize, Deserialize, Debug, Validate)]
pub struct KubernetesParams {
    pub kubeconfig: Option<PathBuf>,
    #[serde(default)]
    pub namespaces: Vec<String>,
    #[serde(default)]
    pub include_volumes: bool,
}

impl Validate for DriverParams {
    fn validate(&self) -> result::Result<(), ValidationErrors> {
        match self {
            DriverParams::Folder(inner) => inner.validate(),
            DriverParams::Mysql(inner) => inner.validate().and(inner.password.validate()),
            DriverParams::Mongo(inner) => inner.validate().and(inner.uri.validate()),
            DriverParams::S3(inner) => inner.validate().and(inner.secret_key.validate()),
            DriverParams::Kubernetes(inner) => inner.validate(),
        }
    }
}

impl DriverParams {
    /// Type tag used to look up the driver.
    pub fn type_name(&self) -> &'static str {
        match self {
            DriverParams::Folder(_) => "folder",
            DriverParams::Mysql(_) => "mysql",
            DriverParams::Mongo(_) => "mongo",
            DriverParams::S3(_) => "s3",
            DriverParams::Kubernetes(_) => "kubernetes",
        }
    }

    /// Whether the restore driver takes the compressed artifact as is.
    pub fn consumes_compressed(&self) -> bool {
        matches!(self, DriverParams::Mongo(_))
    }

    /// Parameters as handed to the driver, secrets in clear.
    pub fn payload(&self) -> Value {
        match self {
            DriverParams::Folder(p) => json!({ "folders": p.folders }),
            DriverParams::Mysql(p) => json!({
                "host": p.host,
                "port": p.port,
                "user": p.user,
                "password": Revealed(&p.password),
                "databases": p.databases,
                "ssl": p.ssl,
            }),
            DriverParams::Mongo(p) => json!({
                "uri": Revealed(&p.uri),
                "databases": p.databases,
            }),
            DriverParams::S3(p) => json!({
                "endpoint": p.endpoint,
                "region": p.region,
                "buckets": p.buckets,
                "access_key": p.access_key,
                "secret_key": Revealed(&p.secret_key),
                "path_style": p.path_style,
            }),
            DriverParams::Kubernetes(p) => json!({
                "kubeconfig": p.kubeconfig,
                "namespaces": p.namespaces,
                "include_volumes": p.include_volumes,
            }),
        }
    }
}
