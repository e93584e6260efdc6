use crate::backup::finish::Finish;
use crate::backup::result_error::result::Result;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Gzips a single file into `writer`.
pub fn gzip_into<W: Write>(src: &Path, writer: W) -> Result<W> {
    let mut reader = BufReader::new(File::open(src)?);
    let mut encoder = GzEncoder::new(BufWriter::new(writer), Compression::default());
    let bytes = std::io::copy(&mut reader, &mut encoder)?;
    tracing::debug!("Gzipped {} bytes from {:?}", bytes, src);

    Ok(Finish::finish(encoder).and_then(Finish::finish)?)
}

/// Inflates a single gzip file into `writer`.
pub fn gunzip_into<W: Write>(src: &Path, writer: W) -> Result<W> {
    let mut decoder = GzDecoder::new(BufReader::new(File::open(src)?));
    let mut writer = BufWriter::new(writer);
    let bytes = std::io::copy(&mut decoder, &mut writer)?;
    tracing::debug!("Inflated {} bytes from {:?}", bytes, src);

    Ok(Finish::finish(writer)?)
}
