#![forbid(unsafe_code)]

//! ZIP archives and OpenDocument packages.
//!
//! Both keep their signatures in `META-INF/documentsignatures.xml` under a
//! `document-signatures` root; new signatures are appended to the ones
//! already there. ODF leaves `mimetype` out of the references.

use std::collections::HashSet;
use std::io::{Read, Seek, Write};

use dss_core::{ns, Error, Result};
use dss_xades::facets::container::{
    entry_name_from_uri, is_signature_file, DOCUMENT_SIGNATURES_ENTRY, MIMETYPE_ENTRY,
};
use dss_xades::facets::{OdfFacet, ZipFacet};
use dss_xades::{DocumentSource, SignatureFacet, SignatureInfo, ValidatedSignature, XadesValidator};
use zip::ZipArchive;

use super::{entry_dereferencer, open_archive, rebuild_archive, xml};
use crate::verification::validate_all;

pub(crate) fn facets<'a>(odf: bool) -> Vec<Box<dyn SignatureFacet + 'a>> {
    if odf {
        vec![Box::new(OdfFacet)]
    } else {
        vec![Box::new(ZipFacet)]
    }
}

/// The signature file to append to: the existing one or an empty root.
pub(crate) fn host_document(source: &dyn DocumentSource) -> Result<String> {
    if source.contains(DOCUMENT_SIGNATURES_ENTRY) {
        return xml::host_document(&source.read_entry(DOCUMENT_SIGNATURES_ENTRY)?);
    }
    Ok(format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><document-signatures xmlns="{}"/>"#,
        ns::ODF_DSIG
    ))
}

pub(crate) fn write_signed<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    signed: &str,
    out: &mut dyn Write,
) -> Result<()> {
    rebuild_archive(
        archive,
        &|name| name != DOCUMENT_SIGNATURES_ENTRY,
        &[(DOCUMENT_SIGNATURES_ENTRY.to_owned(), signed.as_bytes().to_vec())],
        out,
    )
}

/// Entries a signature must reference.
fn must_be_signed(name: &str, odf: bool) -> bool {
    !is_signature_file(name) && !(odf && name == MIMETYPE_ENTRY)
}

fn covered_entries(v: &ValidatedSignature) -> Result<HashSet<String>> {
    v.core.detached_uris().map(entry_name_from_uri).collect()
}

pub(crate) fn verify(
    validator: &XadesValidator<'_>,
    document: &[u8],
    original: Option<&[u8]>,
    odf: bool,
) -> Result<Vec<SignatureInfo>> {
    let source = open_archive(document)?;
    let original = original.map(open_archive).transpose()?;
    if !source.contains(DOCUMENT_SIGNATURES_ENTRY) {
        return Ok(Vec::new());
    }
    let text = xml::host_document(&source.read_entry(DOCUMENT_SIGNATURES_ENTRY)?)?;
    let dereferencer = entry_dereferencer(&source);

    let mut infos = Vec::new();
    for v in validate_all(validator, &text, &dereferencer)? {
        let covered = covered_entries(&v)?;
        if let Some(missing) = source
            .entry_names()
            .into_iter()
            .find(|n| must_be_signed(n, odf) && !covered.contains(n))
        {
            log::warn!("entry {missing} is not covered by the signature");
            continue;
        }
        if let Some(original) = &original {
            check_original(&text, &v, &covered, original)?;
        }
        infos.push(v.info);
    }
    Ok(infos)
}

/// The references of `v` must digest the same over `original`, and every
/// entry of `original` must be referenced.
fn check_original(
    text: &str,
    v: &ValidatedSignature,
    covered: &HashSet<String>,
    original: &dyn DocumentSource,
) -> Result<()> {
    if let Some(name) = original
        .entry_names()
        .into_iter()
        .find(|n| must_be_signed(n, false) && !covered.contains(n))
    {
        return Err(Error::InvalidArgument(format!(
            "original entry {name} is not signed"
        )));
    }
    let id = v
        .core
        .signature_id
        .as_deref()
        .ok_or_else(|| Error::InvalidArgument("signature without Id".into()))?;
    let doc = dss_xml::parse(text)?;
    let signature = dss_xades::builder::find_signature(&doc, id)?;
    dss_xades::verify_signature(text, signature, &entry_dereferencer(original))
        .map_err(|e| Error::InvalidArgument(format!("original document does not match: {e}")))?;
    Ok(())
}
