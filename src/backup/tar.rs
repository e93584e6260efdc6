use crate::backup::finish::Finish;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use tar::EntryType;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Counts reported by [`write_tar_gz`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TarSummary {
    pub entries: usize,
    pub skipped: usize,
}

/// Writes `src_dir` as a gzip-compressed TAR stream into `writer`.
///
/// Entry names are relative to `src_dir` and visited in file-name order.
/// Irregular entries (sockets, devices, symlinks) and entries that cannot be
/// read are skipped with a warning instead of failing the archive.
pub fn write_tar_gz<W: Write>(src_dir: &Path, writer: W) -> Result<(W, TarSummary)> {
    let mut builder = tar::Builder::new(GzEncoder::new(
        BufWriter::new(writer),
        Compression::default(),
    ));
    builder.follow_symlinks(false);

    let mut summary = TarSummary::default();
    for entry in WalkDir::new(src_dir).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping inaccessible entry under {:?}: {}", src_dir, e);
                summary.skipped += 1;
                continue;
            }
        };

        let relative = match entry.path().strip_prefix(src_dir) {
            Ok(relative) if relative.as_os_str().is_empty() => continue,
            Ok(relative) => relative.to_path_buf(),
            Err(e) => {
                return Err(Error::codec(e.to_string())
                    .with_msg(format!("Stripping {:?} from {:?} failed", src_dir, entry.path())))
            }
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            builder.append_dir(&relative, entry.path())?;
        } else if file_type.is_file() {
            let mut file = match File::open(entry.path()) {
                Ok(file) => file,
                Err(e) => {
                    warn!("Skipping unreadable file {:?}: {}", entry.path(), e);
                    summary.skipped += 1;
                    continue;
                }
            };
            builder.append_file(&relative, &mut file)?;
        } else {
            warn!("Skipping special file {:?}", entry.path());
            summary.skipped += 1;
            continue;
        }
        debug!("Added {:?} to archive", relative);
        summary.entries += 1;
    }

    let writer = Finish::finish(builder)
        .and_then(Finish::finish)
        .and_then(Finish::finish)?;

    info!(
        "Archived {} entries from {:?} ({} skipped)",
        summary.entries, src_dir, summary.skipped
    );
    Ok((writer, summary))
}

/// Unpacks a TAR stream into `output_dir`.
///
/// Only directories and regular files are accepted. Any other entry type, or
/// an entry whose path would land outside `output_dir`, fails the whole unpack.
pub fn unpack_tar<R: Read>(reader: R, output_dir: &Path) -> Result<usize> {
    std::fs::create_dir_all(output_dir)?;
    let mut archive = tar::Archive::new(reader);
    let mut count = 0;
    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_type = entry.header().entry_type();
        let entry_path = entry.path()?.to_path_buf();
        match entry_type {
            EntryType::Directory | EntryType::Regular => {}
            other => {
                return Err(Error::codec(format!(
                    "unsupported tar entry type {:?} for {:?}",
                    other, entry_path
                )))
            }
        }

        if !entry.unpack_in(output_dir)? {
            return Err(Error::codec(format!(
                "tar entry {:?} escapes the output directory",
                entry_path
            )));
        }
        count += 1;
    }

    info!("Unpacked {} entries into {:?}", count, output_dir);
    Ok(count)
}
