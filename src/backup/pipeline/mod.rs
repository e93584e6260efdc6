//! Outbound (compress, encrypt, deliver) and inbound (fetch, decrypt,
//! decompress) artifact pipelines.

pub mod processing;
pub mod retrieval;

use crate::backup::storage::ObjectStorage;
use std::sync::Arc;

/// A storage handle plus the per-target delivery options.
#[derive(Debug, Clone)]
pub struct Destination {
    pub storage: Arc<dyn ObjectStorage>,
    pub create_bucket: bool,
}

impl Destination {
    pub fn new(storage: Arc<dyn ObjectStorage>, create_bucket: bool) -> Self {
        Self {
            storage,
            create_bucket,
        }
    }

    pub fn name(&self) -> &str {
        self.storage.name()
    }
}
