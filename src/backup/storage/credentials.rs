//! Named profiles in an AWS-style shared credentials file.
//!
//! ```text
//! [minio]
//! aws_access_key_id = ...
//! aws_secret_access_key = ...
//! ```
//!
//! Sections are only ever appended. An existing profile is never rewritten.
//! Reading a profile back goes through the SDK's own profile loader.

use crate::backup::file_ext::write_atomically;
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use aws_config::profile::profile_file::{ProfileFileKind, ProfileFiles};
use aws_config::profile::ProfileFileCredentialsProvider;
use directories::BaseDirs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

static ACCESS_KEY_FIELD: &str = "aws_access_key_id";
static SECRET_KEY_FIELD: &str = "aws_secret_access_key";

// read-modify-write of the file is serialized across all stores in the process
static FILE_LOCK: Mutex<()> = Mutex::new(());

#[derive(Debug, Clone)]
pub struct CredentialsStore {
    path: PathBuf,
}

impl CredentialsStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// `~/.aws/credentials`.
    pub fn default_location() -> Result<Self> {
        let base = BaseDirs::new()
            .ok_or_else(|| Error::configuration("cannot determine the home directory"))?;
        Ok(Self::new(base.home_dir().join(".aws").join("credentials")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `[name]` unless it already exists. Returns whether the file
    /// changed.
    pub fn write_profile(&self, name: &str, access_key: &str, secret_key: &RedactedString) -> Result<bool> {
        let _guard = FILE_LOCK.lock().map_err(|e| Error::storage(e.to_string()))?;
        let current = self.read_contents()?;
        if has_section(&current, name) {
            debug!(source = name, "Credentials profile already present in {:?}", self.path);
            return Ok(false);
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut updated = current;
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        if !updated.is_empty() {
            updated.push('\n');
        }
        updated.push_str(&format!(
            "[{name}]\n{ACCESS_KEY_FIELD} = {access_key}\n{SECRET_KEY_FIELD} = {}\n",
            secret_key.expose()
        ));

        write_atomically(&self.path, |f| {
            restrict_permissions(f)?;
            Ok(f.write_all(updated.as_bytes())?)
        })
        .with_msg(format!("Failed to write credentials file {:?}", self.path))?;
        info!(source = name, "Added credentials profile to {:?}", self.path);
        Ok(true)
    }

    /// SDK provider resolving profile `[name]` from this file alone.
    pub fn profile_provider(&self, name: &str) -> ProfileFileCredentialsProvider {
        let files = ProfileFiles::builder()
            .with_file(ProfileFileKind::Credentials, &self.path)
            .build();
        ProfileFileCredentialsProvider::builder()
            .profile_files(files)
            .profile_name(name)
            .build()
    }

    fn read_contents(&self) -> Result<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(s) => Ok(s),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(Error::from(e)),
        }
    }
}

fn has_section(contents: &str, name: &str) -> bool {
    contents.lines().any(|l| section_name(l.trim()) == Some(name))
}

fn section_name(line: &str) -> Option<&str> {
    line.strip_prefix('[')?.strip_suffix(']').map(str::trim)
}

#[cfg(unix)]
fn restrict_permissions(f: &std::fs::File) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    Ok(f.set_permissions(std::fs::Permissions::from_mode(0o600))?)
}

#[cfg(not(unix))]
fn restrict_permissions(_f: &std::fs::File) -> Result<()> {
    Ok(())
}
