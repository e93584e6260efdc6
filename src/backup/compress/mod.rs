pub mod gzip;

use crate::backup::file_ext::{
    append_ext, has_ext, remove_path, strip_ext, write_atomically, GZ_EXT, TAR_EXT, TAR_GZ_EXT,
    TGZ_EXT,
};
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};
use crate::backup::tar::{unpack_tar, write_tar_gz};
use flate2::read::GzDecoder;
use function_name::named;
use io_enum::Read;
use std::fs::File;
use std::io::BufReader;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Container formats understood by [`decompress`], picked by file suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    Gz,
    Tar,
}

impl ArchiveFormat {
    pub fn detect<P: AsRef<Path>>(path: P) -> Option<Self> {
        let path = path.as_ref();
        if has_ext(path, TAR_GZ_EXT) || has_ext(path, TGZ_EXT) {
            Some(Self::TarGz)
        } else if has_ext(path, GZ_EXT) {
            Some(Self::Gz)
        } else if has_ext(path, TAR_EXT) {
            Some(Self::Tar)
        } else {
            None
        }
    }

    /// Path of the decompressed output: `x.tar.gz` -> `x`, `x.gz` -> `x`.
    pub fn output_path<P: AsRef<Path>>(&self, path: P) -> Option<PathBuf> {
        let path = path.as_ref();
        match self {
            Self::TarGz => strip_ext(path, TAR_GZ_EXT).or_else(|| strip_ext(path, TGZ_EXT)),
            Self::Gz => strip_ext(path, GZ_EXT),
            Self::Tar => strip_ext(path, TAR_EXT),
        }
    }
}

#[derive(Read)]
pub enum ArchiveReader<R: Read> {
    Plain(R),
    Gzip(GzDecoder<R>),
}

/// Compresses a directory to `<path>.tar.gz` or a regular file to `<path>.gz`.
///
/// Returns the path of the compressed artifact. The input is left in place.
#[named]
pub fn compress<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    let metadata = std::fs::metadata(path)
        .map_err(Error::from)
        .with_msg(format!("Failed to access {:?}", path))?;

    let target = if metadata.is_dir() {
        let target = append_ext(path, TAR_GZ_EXT);
        write_atomically(&target, |f| write_tar_gz(path, f).map(|_| ()))
            .map(|_| target)
    } else {
        let target = append_ext(path, GZ_EXT);
        write_atomically(&target, |f| gzip::gzip_into(path, f).map(|_| ()))
            .map(|_| target)
    }
    .with_debug_object_and_fn_name(path.to_path_buf(), function_path!())?;

    tracing::info!("Compressed {:?} to {:?}", path, target);
    Ok(target)
}

/// Reverses [`compress`] (and also accepts a plain `.tar`).
///
/// The result is unpacked next to `output` first and only then moved into
/// place, replacing whatever `output` held before. It becomes a directory for
/// TAR input and a file for plain gzip input. On failure `output` is left as
/// it was, so a restore never sees a partial tree.
#[named]
pub fn decompress<P1: AsRef<Path>, P2: AsRef<Path>>(compressed: P1, output: P2) -> Result<PathBuf> {
    let compressed = compressed.as_ref();
    let output = output.as_ref();
    let format = ArchiveFormat::detect(compressed).ok_or_else(|| {
        Error::codec(format!("unsupported file format: {:?}", compressed))
    })?;

    unpack_beside(compressed, output, format)
        .with_debug_object_and_fn_name(compressed.to_path_buf(), function_path!())?;

    tracing::info!("Decompressed {:?} to {:?}", compressed, output);
    Ok(output.to_path_buf())
}

fn unpack_beside(compressed: &Path, output: &Path, format: ArchiveFormat) -> Result<()> {
    let parent = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent)?;
    let scratch = tempfile::Builder::new()
        .prefix(".tier-backup-")
        .tempdir_in(parent)?;
    let staged = scratch.path().join("out");

    match format {
        ArchiveFormat::Gz => {
            let mut file = File::create(&staged)?;
            gzip::gunzip_into(compressed, &mut file)?;
            file.sync_all()?;
        }
        ArchiveFormat::TarGz | ArchiveFormat::Tar => {
            let reader = BufReader::new(File::open(compressed)?);
            let reader = match format {
                ArchiveFormat::TarGz => ArchiveReader::Gzip(GzDecoder::new(reader)),
                _ => ArchiveReader::Plain(reader),
            };
            unpack_tar(reader, &staged)?;
        }
    }

    if output.exists() {
        tracing::warn!("Replacing existing {:?}", output);
        remove_path(output)?;
    }
    std::fs::rename(&staged, output)
        .map_err(Error::from)
        .with_msg(format!("Moving unpacked {:?} into place failed", compressed))
}
