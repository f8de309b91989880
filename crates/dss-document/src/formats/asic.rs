#![forbid(unsafe_code)]

//! ASiC containers: every data entry is referenced from a signature in
//! `META-INF/signatures.xml`.

use std::collections::HashSet;
use std::io::{Read, Seek, Write};

use dss_core::{ns, Result};
use dss_xades::facets::container::{entry_name_from_uri, is_asic_data_entry, ASIC_SIGNATURES_ENTRY};
use dss_xades::facets::AsicFacet;
use dss_xades::{DocumentSource, SignatureFacet, SignatureInfo, XadesValidator};
use zip::ZipArchive;

use super::{entry_dereferencer, open_archive, rebuild_archive, xml};
use crate::verification::validate_all;

pub(crate) fn facets<'a>() -> Vec<Box<dyn SignatureFacet + 'a>> {
    vec![Box::new(AsicFacet)]
}

pub(crate) fn host_document(source: &dyn DocumentSource) -> Result<String> {
    if source.contains(ASIC_SIGNATURES_ENTRY) {
        return xml::host_document(&source.read_entry(ASIC_SIGNATURES_ENTRY)?);
    }
    Ok(format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><asic:XAdESSignatures xmlns:asic="{}"/>"#,
        ns::ASIC
    ))
}

pub(crate) fn write_signed<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    signed: &str,
    out: &mut dyn Write,
) -> Result<()> {
    rebuild_archive(
        archive,
        &|name| name != ASIC_SIGNATURES_ENTRY,
        &[(ASIC_SIGNATURES_ENTRY.to_owned(), signed.as_bytes().to_vec())],
        out,
    )
}

pub(crate) fn verify(validator: &XadesValidator<'_>, document: &[u8]) -> Result<Vec<SignatureInfo>> {
    let source = open_archive(document)?;
    if !source.contains(ASIC_SIGNATURES_ENTRY) {
        return Ok(Vec::new());
    }
    let text = xml::host_document(&source.read_entry(ASIC_SIGNATURES_ENTRY)?)?;
    let data_entries: Vec<String> = source
        .entry_names()
        .into_iter()
        .filter(|n| is_asic_data_entry(n))
        .collect();

    let mut infos = Vec::new();
    for v in validate_all(validator, &text, &entry_dereferencer(&source))? {
        let covered: HashSet<String> = v.core.detached_uris().map(entry_name_from_uri).collect::<Result<_>>()?;
        if let Some(missing) = data_entries.iter().find(|n| !covered.contains(*n)) {
            log::warn!("data entry {missing} is not covered by the signature");
            continue;
        }
        infos.push(v.info);
    }
    Ok(infos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::tests::build_zip;
    use crate::request::{ContentType, SigningRequest};
    use crate::testutil::Fixture;

    const ASICE: &[u8] = b"application/vnd.etsi.asic-e+zip";

    fn container() -> Vec<u8> {
        build_zip(&[
            ("mimetype", ASICE),
            ("report.pdf", b"%PDF-1.4 not really"),
            ("data/notes 1.txt", b"notes"),
        ])
    }

    #[test]
    fn round_trip_and_cosign() {
        let f = Fixture::new();
        let signed = f.sign(SigningRequest::new(container(), ContentType::Asic)).unwrap();
        let source = open_archive(&signed).unwrap();
        let text = String::from_utf8(source.read_entry(ASIC_SIGNATURES_ENTRY).unwrap()).unwrap();
        assert!(text.contains("asic:XAdESSignatures"));
        assert!(text.contains(r#"URI="data/notes%201.txt""#));
        assert!(!text.contains(r#"URI="mimetype""#));
        assert_eq!(f.verifier().verify_signatures(&signed, ContentType::Asic, None).unwrap().len(), 1);

        let twice = f.sign(SigningRequest::new(signed, ContentType::Asic)).unwrap();
        assert_eq!(f.verifier().verify_signatures(&twice, ContentType::Asic, None).unwrap().len(), 2);
    }

    #[test]
    fn added_data_entry_invalidates() {
        let f = Fixture::new();
        let signed = f.sign(SigningRequest::new(container(), ContentType::Asic)).unwrap();
        let signatures = open_archive(&signed).unwrap().read_entry(ASIC_SIGNATURES_ENTRY).unwrap();
        let extended = build_zip(&[
            ("mimetype", ASICE),
            ("report.pdf", b"%PDF-1.4 not really"),
            ("data/notes 1.txt", b"notes"),
            ("smuggled.txt", b"!"),
            (ASIC_SIGNATURES_ENTRY, &signatures),
        ]);
        assert!(f
            .verifier()
            .verify_signatures(&extended, ContentType::Asic, None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn unsigned_container_has_no_signatures() {
        let f = Fixture::new();
        assert!(f
            .verifier()
            .verify_signatures(&container(), ContentType::Asic, None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn cosignature_over_added_entry_still_verifies() {
        let f = Fixture::new();
        let signed = f.sign(SigningRequest::new(container(), ContentType::Asic)).unwrap();
        let signatures = open_archive(&signed).unwrap().read_entry(ASIC_SIGNATURES_ENTRY).unwrap();
        let extended = build_zip(&[
            ("mimetype", ASICE),
            ("report.pdf", b"%PDF-1.4 not really"),
            ("data/notes 1.txt", b"notes"),
            ("appendix.txt", b"later"),
            (ASIC_SIGNATURES_ENTRY, &signatures),
        ]);
        let twice = f.sign(SigningRequest::new(extended, ContentType::Asic)).unwrap();
        assert_eq!(f.verifier().verify_signatures(&twice, ContentType::Asic, None).unwrap().len(), 1);
    }
}
