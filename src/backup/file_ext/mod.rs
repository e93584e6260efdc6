//! Path helpers shared by the codec and the pipelines: suffix handling,
//! write-then-rename output files and removal of files or directory trees.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use std::ffi::OsString;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub static GZ_EXT: &str = "gz";
pub static TAR_EXT: &str = "tar";
pub static TAR_GZ_EXT: &str = "tar.gz";
pub static TGZ_EXT: &str = "tgz";
pub static ENC_EXT: &str = "enc";

/// `dump.sql` + `gz` -> `dump.sql.gz`. Never replaces an existing extension.
pub fn append_ext<P: AsRef<Path>>(path: P, ext: &str) -> PathBuf {
    let mut os: OsString = path.as_ref().as_os_str().to_owned();
    os.push(".");
    os.push(ext);
    PathBuf::from(os)
}

pub fn has_ext<P: AsRef<Path>>(path: P, ext: &str) -> bool {
    path.as_ref()
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.len() > ext.len() + 1 && n.ends_with(&format!(".{ext}")))
}

/// Drops a trailing `.{ext}`; returns `None` when the path does not carry it.
pub fn strip_ext<P: AsRef<Path>>(path: P, ext: &str) -> Option<PathBuf> {
    let path = path.as_ref();
    if !has_ext(path, ext) {
        return None;
    }
    let name = path.file_name()?.to_str()?;
    let stem = &name[..name.len() - ext.len() - 1];
    Some(path.with_file_name(stem))
}

/// Writes through a hidden temporary sibling of `target` and renames it into
/// place once `write` succeeds. On failure the temporary file is discarded and
/// `target` is untouched.
pub fn write_atomically<F>(target: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    let parent = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(".tier-backup-")
        .suffix(".tmp")
        .tempfile_in(parent)?;
    write(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| Error::from(e.error))?;
    Ok(())
}

/// Removes a file or a whole directory tree. A missing path is not an error.
pub fn remove_path<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    let path = path.as_ref();
    let res = match std::fs::symlink_metadata(path) {
        Ok(md) if md.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(e) => Err(e),
    };
    match res {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
