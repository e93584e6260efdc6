use crate::backup::compress::compress;
use crate::backup::encrypt::Cipher;
use crate::backup::file_ext::{append_ext, has_ext, remove_path, ENC_EXT, GZ_EXT};
use crate::backup::pipeline::Destination;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::retention::{manage_retention, RetentionPolicy};
use crate::backup::storage::{join_key, Tier};
use chrono::{DateTime, Utc};
use itertools::{Either, Itertools};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Where and how one backup run delivers its artifacts.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryPlan<'a> {
    pub name: &'a str,
    pub prefix: &'a str,
    pub retention: &'a RetentionPolicy,
    pub tier: Tier,
    pub now: DateTime<Utc>,
}

/// One artifact that reached at least one target.
#[derive(Debug)]
pub struct ArtifactOutcome {
    pub raw: PathBuf,
    pub key: String,
    pub delivered_to: Vec<String>,
    /// Failures on the other targets.
    pub error: Option<Error>,
}

#[derive(Debug, Default)]
pub struct BackupReport {
    pub delivered: Vec<ArtifactOutcome>,
    pub failed: Vec<(PathBuf, Error)>,
}

impl BackupReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.delivered.iter().all(|o| o.error.is_none())
    }
}

/// Turns one raw driver output into an uploaded `.enc` object on every
/// destination it can reach.
pub struct Processor<'a> {
    cipher: &'a Cipher,
    destinations: &'a [Destination],
    pool: &'a ThreadPool,
}

impl<'a> Processor<'a> {
    pub fn new(cipher: &'a Cipher, destinations: &'a [Destination], pool: &'a ThreadPool) -> Self {
        Self {
            cipher,
            destinations,
            pool,
        }
    }

    /// Processes every raw artifact independently. Fails only when none of
    /// them was delivered anywhere.
    pub fn process_all(&self, raws: &[PathBuf], plan: &DeliveryPlan) -> Result<BackupReport> {
        if raws.is_empty() {
            return Err(Error::driver(format!("{}: driver produced no artifacts", plan.name)));
        }

        let (delivered, failed): (Vec<_>, Vec<_>) =
            raws.iter()
                .map(|raw| (raw, self.process(raw, plan)))
                .partition_map(|(raw, res)| match res {
                    Ok(outcome) => Either::Left(outcome),
                    Err(e) => {
                        warn!(source = plan.name, "Artifact {:?} was not delivered: {}", raw, e);
                        Either::Right((raw.clone(), e))
                    }
                });

        if delivered.is_empty() {
            return Err(Error::from(failed.into_iter().map(|(_, e)| e).collect_vec())
                .with_msg(format!("No artifact of {} was delivered", plan.name)));
        }
        Ok(BackupReport { delivered, failed })
    }

    pub fn process(&self, raw: &Path, plan: &DeliveryPlan) -> Result<ArtifactOutcome> {
        let source = plan.name;
        if self.destinations.is_empty() {
            return Err(Error::configuration("no storage target to deliver to"));
        }
        let compressed = if has_ext(raw, GZ_EXT) {
            info!(source, "{:?} is already compressed", raw);
            raw.to_path_buf()
        } else {
            let compressed = compress(raw)?;
            discard(source, raw);
            compressed
        };

        let encrypted = append_ext(&compressed, ENC_EXT);
        let file_name = encrypted
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::codec(format!("{:?} has no usable file name", encrypted)))?;
        let key = join_key(plan.prefix, file_name);

        self.cipher
            .encrypt_file(&compressed, &encrypted)
            .with_msg(format!("Encrypting {:?} failed", compressed))?;
        discard(source, &compressed);

        let results: Vec<(String, Result<()>)> = self.pool.install(|| {
            self.destinations
                .par_iter()
                .map(|d| (d.name().to_string(), self.deliver(d, &encrypted, &key, plan)))
                .collect()
        });
        discard(source, &encrypted);

        let (delivered_to, errors): (Vec<_>, Vec<_>) =
            results.into_iter().partition_map(|(name, res)| match res {
                Ok(_) => Either::Left(name),
                Err(e) => {
                    warn!(source, "Delivery of {} to {} failed: {}", key, name, e);
                    Either::Right(e.with_msg(format!("Target {name}")))
                }
            });

        if delivered_to.is_empty() {
            return Err(Error::from(errors).with_msg(format!("{key} reached no target")));
        }
        info!(source, "Delivered {} to {}", key, delivered_to.join(", "));
        Ok(ArtifactOutcome {
            raw: raw.to_path_buf(),
            key,
            delivered_to,
            error: (!errors.is_empty()).then(|| Error::from(errors)),
        })
    }

    fn deliver(&self, destination: &Destination, local: &Path, key: &str, plan: &DeliveryPlan) -> Result<()> {
        let storage = destination.storage.as_ref();
        if destination.create_bucket {
            storage.ensure_bucket()?;
        }
        if let Err(e) = manage_retention(storage, plan.prefix, plan.retention, plan.tier, plan.now) {
            warn!(source = storage.name(), "Retention on {:?} failed: {}", plan.prefix, e);
        }
        storage.upload(local, key, plan.tier)
    }
}

fn discard(source: &str, path: &Path) {
    if let Err(e) = remove_path(path) {
        warn!(source, "Failed to remove {:?}: {}", path, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::encrypt::StaticKeyProvider;
    use crate::backup::retention::TierRetention;
    use crate::backup::storage::memory::MemoryStorage;
    use crate::backup::storage::ObjectStorage;
    use chrono::Duration;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn cipher() -> Cipher {
        Cipher::new(&StaticKeyProvider::new(vec![5u8; 32])).unwrap()
    }

    fn pool(threads: usize) -> ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(threads).build().unwrap()
    }

    fn site(staging: &Path, name: &str) -> PathBuf {
        let dir = staging.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        for f in ["index.html", "style.css", "app.js"] {
            std::fs::write(dir.join(f), format!("content of {f}")).unwrap();
        }
        dir
    }

    fn plan<'a>(retention: &'a RetentionPolicy) -> DeliveryPlan<'a> {
        DeliveryPlan {
            name: "folder-site",
            prefix: "backups/site",
            retention,
            tier: Tier::Standard,
            now: Utc::now(),
        }
    }

    #[test]
    fn test_folder_artifact_end_to_end() {
        let staging = TempDir::new().unwrap();
        let raw = site(staging.path(), "folder-site-site-20240102_030405");
        let storage = Arc::new(MemoryStorage::new("minio"));
        let destinations = vec![Destination::new(storage.clone(), false)];
        let retention = RetentionPolicy {
            standard: TierRetention { days: Some(7) },
            ..Default::default()
        };
        let (cipher, pool) = (cipher(), pool(1));

        let outcome = Processor::new(&cipher, &destinations, &pool)
            .process(&raw, &plan(&retention))
            .unwrap();

        let key = "backups/site/folder-site-site-20240102_030405.tar.gz.enc";
        assert_eq!(outcome.key, key);
        assert_eq!(outcome.delivered_to, vec!["minio".to_string()]);
        assert!(outcome.error.is_none());
        assert_eq!(storage.keys(), vec![key.to_string()]);
        assert_eq!(storage.get(key).unwrap().class, "STANDARD");

        assert!(!raw.exists());
        assert!(!staging.path().join("folder-site-site-20240102_030405.tar.gz").exists());
        assert!(!staging.path().join("folder-site-site-20240102_030405.tar.gz.enc").exists());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_unusable_name_writes_no_encrypted_copy() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let staging = TempDir::new().unwrap();
        let raw = staging.path().join(OsStr::from_bytes(b"dump-\xff.sql"));
        std::fs::write(&raw, "SELECT 1;").unwrap();
        let storage = Arc::new(MemoryStorage::new("minio"));
        let destinations = vec![Destination::new(storage.clone(), false)];
        let retention = RetentionPolicy::default();
        let (cipher, pool) = (cipher(), pool(1));

        let res = Processor::new(&cipher, &destinations, &pool).process(&raw, &plan(&retention));

        assert!(matches!(res, Err(Error::Codec(_))));
        assert!(storage.keys().is_empty());
        let left: Vec<_> = std::fs::read_dir(staging.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(left.len(), 1);
        assert!(left.iter().all(|n| !n.ends_with(".enc")));
    }

    #[test]
    fn test_one_target_failing_does_not_stop_the_other() {
        let staging = TempDir::new().unwrap();
        let raw = site(staging.path(), "s-www-20240101_000000");
        let broken = Arc::new(MemoryStorage::failing_uploads("a"));
        let healthy = Arc::new(MemoryStorage::new("b"));
        let destinations = vec![
            Destination::new(broken.clone(), false),
            Destination::new(healthy.clone(), false),
        ];
        let retention = RetentionPolicy::default();
        let (cipher, pool) = (cipher(), pool(2));

        let outcome = Processor::new(&cipher, &destinations, &pool)
            .process(&raw, &plan(&retention))
            .unwrap();

        assert_eq!(outcome.delivered_to, vec!["b".to_string()]);
        assert_eq!(outcome.error.as_ref().map(Error::count), Some(1));
        assert!(broken.keys().is_empty());
        assert_eq!(healthy.keys().len(), 1);
        assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_all_targets_failing_fails_the_artifact_and_cleans_up() {
        let staging = TempDir::new().unwrap();
        let raw = site(staging.path(), "s-www-20240101_000000");
        let destinations = vec![Destination::new(Arc::new(MemoryStorage::failing_uploads("a")), false)];
        let retention = RetentionPolicy::default();
        let (cipher, pool) = (cipher(), pool(1));

        let res = Processor::new(&cipher, &destinations, &pool).process(&raw, &plan(&retention));
        assert!(res.is_err());
        assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_gz_input_skips_compression_and_round_trips() {
        let staging = TempDir::new().unwrap();
        let raw = staging.path().join("db-app-20240101_000000.sql.gz");
        std::fs::write(&raw, b"already gzipped bytes").unwrap();
        let storage = Arc::new(MemoryStorage::new("minio"));
        let destinations = vec![Destination::new(storage.clone(), false)];
        let retention = RetentionPolicy::default();
        let (cipher, pool) = (cipher(), pool(1));

        let outcome = Processor::new(&cipher, &destinations, &pool)
            .process(&raw, &plan(&retention))
            .unwrap();
        assert_eq!(outcome.key, "backups/site/db-app-20240101_000000.sql.gz.enc");
        let stored = storage.get(&outcome.key).unwrap().data;
        assert_eq!(cipher.decrypt(&stored).unwrap(), b"already gzipped bytes");
        assert!(!raw.exists());
    }

    #[test]
    fn test_retention_runs_before_upload_and_bucket_is_created() {
        let staging = TempDir::new().unwrap();
        let raw = site(staging.path(), "s-www-20240101_000000");
        let storage = Arc::new(MemoryStorage::without_bucket("minio"));
        storage.put("backups/site/s-www-20200101_000000.tar.gz.enc", b"old", "STANDARD", Duration::days(90));
        let destinations = vec![Destination::new(storage.clone(), true)];
        let retention = RetentionPolicy {
            standard: TierRetention { days: Some(30) },
            ..Default::default()
        };
        let (cipher, pool) = (cipher(), pool(1));

        Processor::new(&cipher, &destinations, &pool)
            .process(&raw, &plan(&retention))
            .unwrap();
        assert!(storage.bucket_exists().unwrap());
        assert_eq!(
            storage.keys(),
            vec!["backups/site/s-www-20240101_000000.tar.gz.enc".to_string()]
        );
    }

    #[test]
    fn test_artifacts_fail_independently() {
        let staging = TempDir::new().unwrap();
        let good = site(staging.path(), "s-www-20240101_000000");
        let missing = staging.path().join("s-gone-20240101_000000");
        let storage = Arc::new(MemoryStorage::new("minio"));
        let destinations = vec![Destination::new(storage.clone(), false)];
        let retention = RetentionPolicy::default();
        let (cipher, pool) = (cipher(), pool(1));
        let processor = Processor::new(&cipher, &destinations, &pool);

        let report = processor
            .process_all(&[missing.clone(), good], &plan(&retention))
            .unwrap();
        assert_eq!(report.delivered.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, missing);
        assert!(!report.is_complete());

        assert!(processor.process_all(&[missing], &plan(&retention)).is_err());
        assert!(processor.process_all(&[], &plan(&retention)).is_err());
    }
}
