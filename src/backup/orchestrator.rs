//! Entry points tying configuration, drivers, the cipher and the storage
//! targets together.

use crate::backup::config::AppConfig;
use crate::backup::encrypt::Cipher;
use crate::backup::file_ext::{has_ext, ENC_EXT};
use crate::backup::naming::timestamp_from_key;
use crate::backup::pipeline::processing::{BackupReport, DeliveryPlan, Processor};
use crate::backup::pipeline::retrieval::{resolve_key, retrieve, Selector};
use crate::backup::pipeline::Destination;
use crate::backup::plugin::invoker::{driver_args, invoke_backup, invoke_restore};
use crate::backup::plugin::registry::{Driver, DriverRegistry};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::storage::credentials::CredentialsStore;
use crate::backup::storage::s3::S3Storage;
use crate::backup::storage::{list_prefix, ObjectInfo, ObjectStorage, Tier};
use chrono::{DateTime, Utc};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// One listed artifact with the timestamp parsed from its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedArtifact {
    pub info: ObjectInfo,
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct Orchestrator {
    config: AppConfig,
    registry: DriverRegistry,
    cipher: Cipher,
    /// Same order as `config.storage`.
    destinations: Vec<Destination>,
    pool: ThreadPool,
}

impl Orchestrator {
    /// Connects every storage target, loads the drivers and derives the
    /// cipher from the configured key source.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let cipher = Cipher::new(config.encryption.key_provider().as_ref())
            .with_msg("Loading the encryption key failed")?;

        let credentials = match &config.credentials_file {
            Some(path) => CredentialsStore::new(path),
            None => CredentialsStore::default_location()?,
        };
        let destinations = config
            .storage
            .iter()
            .map(|target| {
                S3Storage::connect(target, &credentials)
                    .map(|s| Destination::new(Arc::new(s), target.create_bucket))
                    .with_msg(format!("Connecting storage target {:?} failed", target.name))
            })
            .collect::<Result<Vec<_>>>()?;

        let registry = DriverRegistry::load(&config.modules_dir)?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.upload_parallelism)
            .thread_name(|i| format!("upload-{i}"))
            .build()?;

        Ok(Self::new(config, registry, cipher, destinations, pool))
    }

    pub fn new(
        config: AppConfig,
        registry: DriverRegistry,
        cipher: Cipher,
        destinations: Vec<Destination>,
        pool: ThreadPool,
    ) -> Self {
        Self {
            config,
            registry,
            cipher,
            destinations,
            pool,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    /// Runs the driver's backup verb and ships every artifact to all targets.
    pub fn backup(&self, name: &str, tier: Tier) -> Result<BackupReport> {
        guarded(name, "Backup", || self.run_backup(name, tier))
    }

    /// Fetches one artifact from a target and hands it to the driver's
    /// restore verb. Returns the path the driver was given.
    pub fn restore(&self, name: &str, selector: &Selector, target: Option<&str>) -> Result<PathBuf> {
        guarded(name, "Restore", || self.run_restore(name, selector, target))
    }

    /// Encrypted artifacts of a backup on one target, newest first.
    pub fn list(&self, name: &str, target: Option<&str>) -> Result<Vec<ListedArtifact>> {
        guarded(name, "Listing", || self.run_list(name, target))
    }

    /// Time-limited GET URL; `ttl` falls back to the configured default.
    pub fn presign(&self, key: &str, ttl: Option<Duration>, target: Option<&str>) -> Result<String> {
        guarded(key, "Presign", || {
            let storage = self.storage(target)?;
            storage.presigned_url(key, ttl.unwrap_or(self.config.presign_ttl))
        })
    }

    /// Rescans the modules directory and returns the enabled drivers.
    pub fn modules(&self) -> Result<Vec<Arc<Driver>>> {
        let count = self.registry.reload()?;
        info!("{} driver(s) registered", count);
        self.registry.drivers()
    }

    fn run_backup(&self, name: &str, tier: Tier) -> Result<BackupReport> {
        let definition = self.config.definition(name)?;
        let driver = self.driver_for(name)?;
        let args = driver_args(definition, tier);

        info!(source = name, "Starting {} backup with driver {}", tier, driver.manifest.name);
        let raws = invoke_backup(&driver, name, &args)?;

        let plan = DeliveryPlan {
            name,
            prefix: &definition.path.remote,
            retention: &definition.retention,
            tier,
            now: Utc::now(),
        };
        let report = Processor::new(&self.cipher, &self.destinations, &self.pool).process_all(&raws, &plan)?;

        if report.is_complete() {
            info!(source = name, "Delivered {} artifact(s)", report.delivered.len());
        } else {
            warn!(
                source = name,
                "Delivered {} artifact(s), {} failed, some targets missed",
                report.delivered.len(),
                report.failed.len()
            );
        }
        Ok(report)
    }

    fn run_restore(&self, name: &str, selector: &Selector, target: Option<&str>) -> Result<PathBuf> {
        let definition = self.config.definition(name)?;
        let driver = self.driver_for(name)?;
        let storage = self.storage(target)?;

        let key = resolve_key(storage.as_ref(), &definition.path.remote, selector)?;
        info!(source = name, "Restoring {} from {}", key, storage.name());
        let artifact = retrieve(
            storage.as_ref(),
            &self.cipher,
            &key,
            &definition.path.local,
            definition.source.consumes_compressed(),
        )?;

        invoke_restore(&driver, name, &artifact, &driver_args(definition, Tier::Standard))?;
        Ok(artifact)
    }

    fn run_list(&self, name: &str, target: Option<&str>) -> Result<Vec<ListedArtifact>> {
        let definition = self.config.definition(name)?;
        let storage = self.storage(target)?;
        let mut listed: Vec<_> = storage
            .list(&list_prefix(&definition.path.remote))?
            .into_iter()
            .filter(|o| !o.key.ends_with('/') && has_ext(&o.key, ENC_EXT))
            .map(|info| ListedArtifact {
                created: timestamp_from_key(&info.key),
                info,
            })
            .collect();
        listed.sort_by(|a, b| b.info.key.cmp(&a.info.key));
        Ok(listed)
    }

    fn driver_for(&self, name: &str) -> Result<Arc<Driver>> {
        let definition = self.config.definition(name)?;
        self.registry.get(definition.source.type_name())
    }

    fn storage(&self, target: Option<&str>) -> Result<Arc<dyn ObjectStorage>> {
        let index = self.config.target_index(target)?;
        self.destinations
            .get(index)
            .map(|d| d.storage.clone())
            .ok_or_else(|| Error::configuration(format!("storage target #{index} is not connected")))
    }
}

/// Runs `f`, turning a panic into [`Error::Panic`] and logging any failure
/// against `source`.
fn guarded<T, F: FnOnce() -> Result<T>>(source: &str, what: &str, f: F) -> Result<T> {
    let res = catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| Err(Error::from_panic(payload)));
    if let Err(e) = &res {
        error!(source, "{what} failed: {e}");
    }
    res
}
