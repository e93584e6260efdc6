use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::validate::validate_semver;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};
use validator::Validate;

pub static MANIFEST_FILE: &str = "module.yaml";

/// How a driver reports its result on stdout.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    #[default]
    Structured,
    Streamed,
}

/// `module.yaml` of one driver directory.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ModuleManifest {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(custom(function = validate_semver))]
    pub version: String,
    #[serde(rename = "type")]
    #[validate(length(min = 1))]
    pub type_name: String,
    #[serde(default)]
    pub enable: bool,
    #[validate(length(min = 1))]
    pub bin: String,
    #[serde(default)]
    pub output: OutputMode,
}

#[derive(Debug, Clone)]
pub struct Driver {
    pub manifest: ModuleManifest,
    pub dir: PathBuf,
}

impl Driver {
    pub fn binary(&self) -> PathBuf {
        self.dir.join(&self.manifest.bin)
    }
}

/// Enabled drivers keyed by type.
///
/// Module directories are visited in lexicographic order and the first
/// manifest claiming a type wins; later ones are ignored with a warning.
#[derive(Debug)]
pub struct DriverRegistry {
    root: PathBuf,
    drivers: RwLock<BTreeMap<String, Arc<Driver>>>,
}

impl DriverRegistry {
    pub fn load<P: Into<PathBuf>>(root: P) -> Result<Self> {
        let root = root.into();
        let drivers = scan(&root)?;
        Ok(Self {
            root,
            drivers: RwLock::new(drivers),
        })
    }

    /// Rescans the modules root and swaps the registered set. Returns the
    /// number of drivers now registered.
    pub fn reload(&self) -> Result<usize> {
        let drivers = scan(&self.root)?;
        let count = drivers.len();
        *self
            .drivers
            .write()
            .map_err(|e| Error::driver(format!("driver registry lock poisoned: {e}")))? = drivers;
        Ok(count)
    }

    pub fn get(&self, type_name: &str) -> Result<Arc<Driver>> {
        self.drivers
            .read()
            .map_err(|e| Error::driver(format!("driver registry lock poisoned: {e}")))?
            .get(type_name)
            .cloned()
            .ok_or_else(|| {
                Error::configuration(format!(
                    "no enabled driver for type {type_name:?} under {:?}",
                    self.root
                ))
            })
    }

    pub fn drivers(&self) -> Result<Vec<Arc<Driver>>> {
        Ok(self
            .drivers
            .read()
            .map_err(|e| Error::driver(format!("driver registry lock poisoned: {e}")))?
            .values()
            .cloned()
            .collect())
    }
}

fn read_manifest(path: &Path) -> Result<ModuleManifest> {
    let manifest: ModuleManifest = serde_yml::from_reader(std::fs::File::open(path)?)?;
    manifest.validate()?;
    Ok(manifest)
}

fn scan(root: &Path) -> Result<BTreeMap<String, Arc<Driver>>> {
    let mut drivers = BTreeMap::new();
    if !root.exists() {
        warn!("Modules directory {:?} does not exist, no drivers registered", root);
        return Ok(drivers);
    }

    let mut dirs: Vec<PathBuf> = std::fs::read_dir(root)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();

    for dir in dirs {
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            debug!("No {} in {:?}, skipping", MANIFEST_FILE, dir);
            continue;
        }
        let manifest = match read_manifest(&manifest_path) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!("Ignoring invalid manifest {:?}: {}", manifest_path, e);
                continue;
            }
        };
        if !manifest.enable {
            debug!("Driver {} in {:?} is disabled", manifest.name, dir);
            continue;
        }

        match drivers.entry(manifest.type_name.clone()) {
            Entry::Occupied(existing) => {
                let existing: &Arc<Driver> = existing.get();
                warn!(
                    "Driver {} in {:?} also claims type {:?}, keeping {} from {:?}",
                    manifest.name, dir, manifest.type_name, existing.manifest.name, existing.dir
                );
            }
            Entry::Vacant(slot) => {
                info!(
                    source = manifest.name.as_str(),
                    "Loaded driver for {:?} (version {}) from {:?}",
                    manifest.type_name,
                    manifest.version,
                    dir
                );
                slot.insert(Arc::new(Driver { manifest, dir }));
            }
        }
    }

    Ok(drivers)
}
