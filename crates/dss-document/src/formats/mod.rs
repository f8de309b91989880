#![forbid(unsafe_code)]

//! Per-format behaviour of the signature and verification services.
//!
//! Each format module knows how to reference the document, where the
//! signature lives, how to rebuild the signed document and which extra
//! rules verification applies.

pub mod asic;
pub mod ooxml;
pub mod package;
pub mod xml;

use std::io::{Cursor, Read, Seek, Write};

use dss_core::{Error, Result};
use dss_xades::ZipSource;
use ::zip::write::SimpleFileOptions;
use ::zip::{CompressionMethod, ZipArchive, ZipWriter};

fn zip_err(e: ::zip::result::ZipError) -> Error {
    Error::Zip(e.to_string())
}

/// Open `data` as a ZIP archive, reporting failure as a format error.
pub(crate) fn open_archive(data: &[u8]) -> Result<ZipSource<Cursor<&[u8]>>> {
    ZipSource::new(Cursor::new(data))
        .map_err(|e| Error::DocumentFormat(format!("not a ZIP archive: {e}")))
}

/// Copy every entry of `archive` for which `keep` holds, raw and in order,
/// then append `additions` deflated.
pub(crate) fn rebuild_archive<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    keep: &dyn Fn(&str) -> bool,
    additions: &[(String, Vec<u8>)],
    out: &mut dyn Write,
) -> Result<()> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for i in 0..archive.len() {
        let file = archive.by_index_raw(i).map_err(zip_err)?;
        let name = file.name().to_owned();
        if !keep(&name) {
            log::debug!("dropping entry {name}");
            continue;
        }
        writer.raw_copy_file(file).map_err(zip_err)?;
    }
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, data) in additions {
        writer.start_file(name.as_str(), options).map_err(zip_err)?;
        writer.write_all(data)?;
    }
    let buffer = writer.finish().map_err(zip_err)?.into_inner();
    out.write_all(&buffer)?;
    out.flush()?;
    Ok(())
}

/// Dereference detached URIs as entries of `source`.
pub(crate) fn entry_dereferencer<'s>(
    source: &'s dyn dss_xades::DocumentSource,
) -> impl Fn(&str) -> Result<Vec<u8>> + 's {
    move |uri: &str| {
        let name = dss_xades::facets::container::entry_name_from_uri(uri)?;
        source.read_entry(&name)
    }
}
