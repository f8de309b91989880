#![forbid(unsafe_code)]

//! Detached references to the entries of ZIP based containers.

use dss_c14n::C14nMode;
use dss_core::{ns, Error, Result};
use dss_crypto::DigestAlgo;
use dss_xml::XmlWriter;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use super::xades::xml_datetime;
use crate::facet::{ReferenceSpec, SignatureContext, SignatureFacet, TransformSpec, XmlObject};

/// Signature entry of plain ZIP and ODF packages.
pub const DOCUMENT_SIGNATURES_ENTRY: &str = "META-INF/documentsignatures.xml";
/// Signature entry of ASiC containers.
pub const ASIC_SIGNATURES_ENTRY: &str = "META-INF/signatures.xml";
pub const MIMETYPE_ENTRY: &str = "mimetype";
pub const META_INF: &str = "META-INF/";

/// Characters left alone by form encoding of entry names.
const FORM_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'.').remove(b'-').remove(b'_').remove(b'*');
/// Like [`FORM_ESCAPE`] but keeps path separators.
const PATH_ESCAPE: &AsciiSet = &FORM_ESCAPE.remove(b'/');

/// Whether `name` is a signature file of an ODF style package.
pub fn is_signature_file(name: &str) -> bool {
    name.starts_with(META_INF) && name.contains("signatures") && name.ends_with(".xml")
}

/// Whether an ASiC entry holds signed data.
pub fn is_asic_data_entry(name: &str) -> bool {
    name != MIMETYPE_ENTRY && !name.starts_with(META_INF)
}

/// Reference URI of a ZIP entry: every reserved character escaped.
pub fn zip_entry_uri(name: &str) -> String {
    utf8_percent_encode(name, FORM_ESCAPE).to_string()
}

/// Reference URI of an ASiC entry.
pub fn asic_entry_uri(name: &str) -> String {
    utf8_percent_encode(name, PATH_ESCAPE).to_string()
}

/// Reference URI of an ODF entry: only spaces are escaped.
pub fn odf_entry_uri(name: &str) -> String {
    name.replace(' ', "%20")
}

/// The entry name addressed by a detached reference URI.
pub fn entry_name_from_uri(uri: &str) -> Result<String> {
    percent_decode_str(uri)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| Error::InvalidUri(format!("{uri}: {e}")))
}

// ── ZIP ──────────────────────────────────────────────────────────────

/// References every entry of a ZIP archive except its signature file.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipFacet;

impl SignatureFacet for ZipFacet {
    fn name(&self) -> &'static str {
        "zip"
    }

    fn pre_sign(&self, ctx: &mut SignatureContext<'_>) -> Result<()> {
        let source = ctx.source();
        for name in source.entry_names() {
            if is_signature_file(&name) {
                continue;
            }
            let data = source.read_entry(&name)?;
            let reference = ReferenceSpec::external(zip_entry_uri(&name), data, Vec::new(), ctx.digest())?;
            ctx.add_reference(reference);
        }
        Ok(())
    }
}

// ── ODF ──────────────────────────────────────────────────────────────

/// References the parts of an OpenDocument package.
///
/// ODF consumers only understand SHA-1 references, whatever digest the
/// signature itself uses.
#[derive(Debug, Default, Clone, Copy)]
pub struct OdfFacet;

impl OdfFacet {
    pub const DIGEST: DigestAlgo = DigestAlgo::Sha1;
}

impl SignatureFacet for OdfFacet {
    fn name(&self) -> &'static str {
        "odf"
    }

    fn pre_sign(&self, ctx: &mut SignatureContext<'_>) -> Result<()> {
        let source = ctx.source();
        for name in source.entry_names() {
            if name == MIMETYPE_ENTRY || is_signature_file(&name) {
                continue;
            }
            let transforms = if name.ends_with(".xml") {
                vec![TransformSpec::C14n(C14nMode::Inclusive)]
            } else {
                Vec::new()
            };
            let data = source.read_entry(&name)?;
            let reference = ReferenceSpec::external(odf_entry_uri(&name), data, transforms, Self::DIGEST)?;
            ctx.add_reference(reference);
        }

        let property_id = format!("{}-signature-property", ctx.signature_id());
        let mut w = XmlWriter::new();
        w.start_element("ds:SignatureProperties", &[]);
        w.start_element(
            "ds:SignatureProperty",
            &[
                ("Id", &property_id),
                ("Target", &format!("#{}", ctx.signature_id())),
            ],
        );
        w.text_element("dc:date", &[("xmlns:dc", ns::DC)], &xml_datetime(&ctx.signing_time()));
        w.end_element("ds:SignatureProperty");
        w.end_element("ds:SignatureProperties");
        ctx.add_object(XmlObject {
            id: None,
            content: w.into_string(),
        });
        ctx.add_reference(ReferenceSpec::same_document(format!("#{property_id}"), Self::DIGEST));
        Ok(())
    }
}

// ── ASiC ─────────────────────────────────────────────────────────────

/// References the data entries of an ASiC container.
#[derive(Debug, Default, Clone, Copy)]
pub struct AsicFacet;

impl SignatureFacet for AsicFacet {
    fn name(&self) -> &'static str {
        "asic"
    }

    fn pre_sign(&self, ctx: &mut SignatureContext<'_>) -> Result<()> {
        let source = ctx.source();
        let mut count = 0;
        for name in source.entry_names() {
            if !is_asic_data_entry(&name) {
                continue;
            }
            let data = source.read_entry(&name)?;
            let reference = ReferenceSpec::external(asic_entry_uri(&name), data, Vec::new(), ctx.digest())?;
            ctx.add_reference(reference);
            count += 1;
        }
        if count == 0 {
            return Err(Error::DocumentFormat("ASiC container without data entries".into()));
        }
        Ok(())
    }
}
