use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::storage::{ObjectInfo, ObjectStorage, Tier};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct MemoryObject {
    pub data: Vec<u8>,
    pub class: String,
    pub last_modified: DateTime<Utc>,
}

/// In-process bucket with switchable failures.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    name: String,
    objects: Mutex<BTreeMap<String, MemoryObject>>,
    bucket: AtomicBool,
    pub fail_uploads: AtomicBool,
    pub fail_lists: AtomicBool,
    pub panic_on_list: AtomicBool,
    failing_heads: Mutex<BTreeSet<String>>,
}

impl MemoryStorage {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            bucket: AtomicBool::new(true),
            ..Default::default()
        }
    }

    pub fn without_bucket(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn failing_uploads(name: &str) -> Self {
        let storage = Self::new(name);
        storage.fail_uploads.store(true, Ordering::SeqCst);
        storage
    }

    pub fn put(&self, key: &str, data: &[u8], class: &str, age: Duration) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            MemoryObject {
                data: data.to_vec(),
                class: class.to_string(),
                last_modified: Utc::now() - age,
            },
        );
    }

    pub fn fail_head_of(&self, key: &str) {
        self.failing_heads.lock().unwrap().insert(key.to_string());
    }

    pub fn get(&self, key: &str) -> Option<MemoryObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

impl ObjectStorage for MemoryStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn upload(&self, local: &Path, key: &str, tier: Tier) -> Result<()> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(Error::storage(format!("{}: upload refused", self.name)));
        }
        let data = std::fs::read(local)?;
        self.put(key, &data, tier.upload_class(), Duration::zero());
        Ok(())
    }

    fn download(&self, key: &str, local: &Path) -> Result<()> {
        let object = self
            .get(key)
            .ok_or_else(|| Error::storage(format!("{}: no such key {key}", self.name)))?;
        if let Some(parent) = local.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(std::fs::write(local, object.data)?)
    }

    fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        if self.panic_on_list.load(Ordering::SeqCst) {
            panic!("{}: list exploded", self.name);
        }
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(Error::storage(format!("{}: list refused", self.name)));
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, o)| ObjectInfo {
                key: k.clone(),
                size: o.data.len() as u64,
                last_modified: o.last_modified,
            })
            .collect())
    }

    fn storage_class(&self, key: &str) -> Result<String> {
        if self.failing_heads.lock().unwrap().contains(key) {
            return Err(Error::storage(format!("{}: head refused for {key}", self.name)));
        }
        self.get(key)
            .map(|o| o.class)
            .ok_or_else(|| Error::storage(format!("{}: no such key {key}", self.name)))
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    fn bucket_exists(&self) -> Result<bool> {
        Ok(self.bucket.load(Ordering::SeqCst))
    }

    fn create_bucket(&self) -> Result<()> {
        self.bucket.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn presigned_url(&self, key: &str, ttl: std::time::Duration) -> Result<String> {
        Ok(format!("memory://{}/{key}?ttl={}", self.name, ttl.as_secs()))
    }
}
