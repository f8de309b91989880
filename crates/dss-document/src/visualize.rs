#![forbid(unsafe_code)]

//! What a signature over a container would cover.

use dss_core::{Error, Result};
use dss_xades::facets::container::{is_asic_data_entry, is_signature_file, MIMETYPE_ENTRY};
use dss_xades::facets::ooxml::is_unsigned_part;
use dss_xades::DocumentSource;

use crate::formats::open_archive;
use crate::request::ContentType;

/// Names of the entries of `container` that a new signature references,
/// in archive order.
pub fn visualize(container: &[u8], content_type: ContentType) -> Result<Vec<String>> {
    let covered: fn(&str) -> bool = match content_type {
        ContentType::Xml => {
            return Err(Error::InvalidArgument(
                "XML documents have no entries to list".into(),
            ))
        }
        ContentType::Zip => |n| !is_signature_file(n),
        ContentType::Odf => |n| n != MIMETYPE_ENTRY && !is_signature_file(n),
        ContentType::Asic => is_asic_data_entry,
        ContentType::Ooxml => |n| !is_unsigned_part(n),
    };
    let source = open_archive(container)?;
    Ok(source
        .entry_names()
        .into_iter()
        .filter(|n| covered(n))
        .collect())
}
