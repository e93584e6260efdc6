//! [`ObjectStorage`] over an S3-compatible endpoint.
//!
//! The SDK is async; each backend owns a small tokio runtime and blocks on it,
//! so the rest of the crate stays synchronous.

use crate::backup::config::target::StorageTarget;
use crate::backup::file_ext::write_atomically;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::storage::credentials::CredentialsStore;
use crate::backup::storage::{ObjectInfo, ObjectStorage, Tier, STANDARD_CLASS};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration, StorageClass};
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use std::fmt::{Debug, Formatter};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, info};

static CONTENT_TYPE: &str = "application/octet-stream";

pub struct S3Storage {
    name: String,
    bucket: String,
    region: String,
    endpoint: String,
    client: Client,
    runtime: Runtime,
}

impl Debug for S3Storage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Storage")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .finish()
    }
}

fn storage_err<E: std::fmt::Display>(what: String) -> impl FnOnce(E) -> Error {
    move |e| Error::storage(format!("{what}: {e}"))
}

fn to_utc(dt: &aws_sdk_s3::primitives::DateTime) -> DateTime<Utc> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos()).unwrap_or_default()
}

impl S3Storage {
    /// Materializes the target's profile in `credentials`, then builds a client
    /// that authenticates through that profile.
    pub fn connect(target: &StorageTarget, credentials: &CredentialsStore) -> Result<Self> {
        credentials.write_profile(&target.name, &target.access_key, &target.secret_key)?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name(format!("s3-{}", target.name))
            .enable_all()
            .build()?;

        let sdk_config = runtime.block_on(
            aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(target.region.clone()))
                .endpoint_url(&target.endpoint)
                .credentials_provider(credentials.profile_provider(&target.name))
                .load(),
        );
        let config = S3ConfigBuilder::from(&sdk_config)
            .force_path_style(target.path_style)
            .build();

        info!(
            source = target.name.as_str(),
            "Connected to bucket {} at {}", target.bucket, target.endpoint
        );
        Ok(Self {
            name: target.name.clone(),
            bucket: target.bucket.clone(),
            region: target.region.clone(),
            endpoint: target.endpoint.clone(),
            client: Client::from_conf(config),
            runtime,
        })
    }
}

impl ObjectStorage for S3Storage {
    fn name(&self) -> &str {
        &self.name
    }

    fn upload(&self, local: &Path, key: &str, tier: Tier) -> Result<()> {
        self.runtime.block_on(async {
            let body = ByteStream::from_path(local)
                .await
                .map_err(storage_err(format!("reading {local:?}")))?;
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .content_type(CONTENT_TYPE)
                .storage_class(StorageClass::from(tier.upload_class()))
                .body(body)
                .send()
                .await
                .map_err(storage_err(format!("uploading {key} to {}", self.bucket)))
        })?;
        info!(source = self.name.as_str(), "Uploaded {:?} to {} ({})", local, key, tier);
        Ok(())
    }

    fn download(&self, key: &str, local: &Path) -> Result<()> {
        if let Some(parent) = local.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = self.runtime.block_on(async {
            let response = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| Error::storage(format!("downloading {key}: {}", e.into_service_error())))?;
            response
                .body
                .collect()
                .await
                .map(|data| data.into_bytes())
                .map_err(storage_err(format!("reading body of {key}")))
        })?;
        write_atomically(local, |f| Ok(f.write_all(&bytes)?))?;
        info!(source = self.name.as_str(), "Downloaded {} to {:?}", key, local);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let output = self.runtime.block_on(
            self.client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .send(),
        )
        .map_err(|e| Error::storage(format!("listing {prefix:?}: {}", e.into_service_error())))?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|o| {
                Some(ObjectInfo {
                    key: o.key()?.to_string(),
                    size: o.size().unwrap_or_default().max(0) as u64,
                    last_modified: o.last_modified().map(to_utc).unwrap_or_default(),
                })
            })
            .collect::<Vec<_>>();
        debug!(source = self.name.as_str(), "Listed {} objects under {:?}", objects.len(), prefix);
        Ok(objects)
    }

    fn storage_class(&self, key: &str) -> Result<String> {
        let head = self
            .runtime
            .block_on(self.client.head_object().bucket(&self.bucket).key(key).send())
            .map_err(|e| Error::storage(format!("reading metadata of {key}: {}", e.into_service_error())))?;
        Ok(head
            .storage_class()
            .map(|c| c.as_str().to_string())
            .unwrap_or_else(|| STANDARD_CLASS.to_string()))
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.runtime
            .block_on(self.client.delete_object().bucket(&self.bucket).key(key).send())
            .map_err(|e| Error::storage(format!("deleting {key}: {}", e.into_service_error())))?;
        Ok(())
    }

    fn bucket_exists(&self) -> Result<bool> {
        match self
            .runtime
            .block_on(self.client.head_bucket().bucket(&self.bucket).send())
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(Error::storage(format!(
                        "checking bucket {}: {service_error}",
                        self.bucket
                    )))
                }
            }
        }
    }

    fn create_bucket(&self) -> Result<()> {
        let mut request = self.client.create_bucket().bucket(&self.bucket);
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        self.runtime
            .block_on(request.send())
            .map_err(|e| Error::storage(format!("creating bucket {}: {}", self.bucket, e.into_service_error())))?;
        info!(source = self.name.as_str(), "Created bucket {}", self.bucket);
        Ok(())
    }

    fn presigned_url(&self, key: &str, ttl: Duration) -> Result<String> {
        let config = PresigningConfig::expires_in(ttl)
            .map_err(storage_err(format!("presigning {key} for {ttl:?}")))?;
        let request = self
            .runtime
            .block_on(
                self.client
                    .get_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .presigned(config),
            )
            .map_err(storage_err(format!("presigning {key}")))?;
        Ok(request.uri().to_string())
    }
}
