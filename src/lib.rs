//! # tier_backup
//!
//! Backup orchestration over pluggable source drivers and S3-compatible
//! object storage.
//!
//! ## Features
//!
//! - **Drivers**: per-source backup and restore executables discovered from
//!   `module.yaml` manifests
//! - **Compression**: gzip, with directories packed as `.tar.gz`
//! - **Encryption**: AES-GCM with a 12-byte random nonce per artifact
//! - **Tiers**: standard or glacier storage classes, each with its own
//!   retention window
//! - **Fan-out**: every artifact goes to every configured target, and one
//!   failing target does not stop the others
//!
//! ## Quick Start
//!
//! ```no_run
//! use tier_backup::backup::config::AppConfig;
//! use tier_backup::backup::orchestrator::Orchestrator;
//! use tier_backup::backup::storage::Tier;
//!
//! let config = AppConfig::load("config.yml")?;
//! let orchestrator = Orchestrator::from_config(config)?;
//! let report = orchestrator.backup("folder-site", Tier::Standard)?;
//! println!("{} artifact(s) delivered", report.delivered.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
