use crate::backup::result_error::result::Result;
use crate::backup::storage::{list_prefix, ObjectStorage, Tier};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use tracing::{debug, info, warn};
use validator::Validate;

/// Age limit for one tier. No `days` means objects in that tier are kept
/// forever.
#[skip_serializing_none]
#[derive(Clone, Copy, Default, Validate, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TierRetention {
    pub days: Option<u32>,
}

#[derive(Clone, Copy, Default, Validate, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RetentionPolicy {
    #[serde(default)]
    pub standard: TierRetention,
    #[serde(default)]
    pub glacier: TierRetention,
}

impl RetentionPolicy {
    pub fn days(&self, tier: Tier) -> Option<u32> {
        match tier {
            Tier::Standard => self.standard.days,
            Tier::Glacier => self.glacier.days,
        }
    }

    /// Objects last modified before the returned instant are expired.
    pub fn cutoff(&self, tier: Tier, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.days(tier).map(|d| now - Duration::days(i64::from(d)))
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RetentionReport {
    pub deleted: Vec<String>,
    pub kept: usize,
    /// Directory markers, objects of another tier and objects whose class
    /// could not be read.
    pub skipped: usize,
}

/// Deletes expired objects of `tier` under `prefix`.
///
/// The tier of an object is taken from the storage class the backend reports,
/// never from its key. Failures on single objects are logged and the sweep
/// goes on; only a failed listing aborts it.
pub fn manage_retention(
    storage: &dyn ObjectStorage,
    prefix: &str,
    policy: &RetentionPolicy,
    tier: Tier,
    now: DateTime<Utc>,
) -> Result<RetentionReport> {
    let source = storage.name();
    let mut report = RetentionReport::default();
    let Some(cutoff) = policy.cutoff(tier, now) else {
        debug!(source, "No {} retention configured for {:?}", tier, prefix);
        return Ok(report);
    };

    for object in storage.list(&list_prefix(prefix))? {
        if object.key.ends_with('/') {
            report.skipped += 1;
            continue;
        }

        let class = match storage.storage_class(&object.key) {
            Ok(class) => class,
            Err(e) => {
                warn!(source, "Cannot read storage class of {}: {}", object.key, e);
                report.skipped += 1;
                continue;
            }
        };
        if Tier::of_class(&class) != tier {
            report.skipped += 1;
            continue;
        }

        if object.last_modified >= cutoff {
            report.kept += 1;
            continue;
        }

        match storage.delete(&object.key) {
            Ok(_) => {
                info!(
                    source,
                    "Deleted {} ({}, last modified {})", object.key, class, object.last_modified
                );
                report.deleted.push(object.key);
            }
            Err(e) => {
                warn!(source, "Failed to delete expired {}: {}", object.key, e);
                report.kept += 1;
            }
        }
    }

    info!(
        source,
        "Retention on {:?} ({}): {} deleted, {} kept, {} skipped",
        prefix,
        tier,
        report.deleted.len(),
        report.kept,
        report.skipped
    );
    Ok(report)
}
