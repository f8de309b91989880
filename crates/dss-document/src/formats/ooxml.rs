#![forbid(unsafe_code)]

//! Office Open XML packages.
//!
//! Each signature is a part of its own under `_xmlsignatures/`, reached
//! from the package root through the signature origin part. Signing adds
//! the new part, its relationship from the origin and the content types
//! both need; every other part is copied unchanged.

use std::collections::HashSet;
use std::io::{Read, Seek, Write};

use dss_core::{ns, Error, Result};
use dss_xades::facets::ooxml::{
    is_relationships_part, is_unsigned_part, part_name_from_uri, CONTENT_TYPES_PART,
    ORIGIN_CONTENT_TYPE, ORIGIN_PART, ORIGIN_RELATIONSHIP_TYPE, SIGNATURES_DIR,
    SIGNATURE_CONTENT_TYPE, SIGNATURE_RELATIONSHIP_TYPE,
};
use dss_xades::facets::OoxmlFacet;
use dss_xades::{DocumentSource, SignatureFacet, SignatureInfo, XadesValidator, ZipSource};
use dss_xml::document::{child_elements, is_element};
use dss_xml::splice::Splicer;
use dss_xml::XmlDocument;

use super::{open_archive, rebuild_archive, xml};
use crate::verification::validate_all;

pub const ROOT_RELATIONSHIPS_PART: &str = "_rels/.rels";
pub const ORIGIN_RELATIONSHIPS_PART: &str = "_xmlsignatures/_rels/origin.sigs.rels";

pub(crate) fn facets<'a>() -> Vec<Box<dyn SignatureFacet + 'a>> {
    vec![Box::new(OoxmlFacet)]
}

/// Whether `name` is a signature part such as `_xmlsignatures/sig1.xml`.
pub fn is_signature_part(name: &str) -> bool {
    name.strip_prefix(SIGNATURES_DIR)
        .map_or(false, |rest| rest.ends_with(".xml") && !rest.contains('/'))
}

/// The first free `_xmlsignatures/sigN.xml`.
fn next_signature_part(source: &dyn DocumentSource) -> String {
    let names = source.entry_names();
    let mut n = names.iter().filter(|n| is_signature_part(n)).count() + 1;
    loop {
        let name = format!("{SIGNATURES_DIR}sig{n}.xml");
        if !names.contains(&name) {
            return name;
        }
        n += 1;
    }
}

/// Write the package of `source` with the signature document `signed`
/// added as a new signature part.
pub(crate) fn write_signed<R: Read + Seek>(
    source: ZipSource<R>,
    signed: &str,
    out: &mut dyn Write,
) -> Result<()> {
    let part = next_signature_part(&source);
    let file_name = part.trim_start_matches(SIGNATURES_DIR).to_owned();
    log::debug!("adding signature part {part}");

    let mut additions = vec![(part.clone(), signed.as_bytes().to_vec())];
    if !source.contains(ORIGIN_PART) {
        additions.push((ORIGIN_PART.to_owned(), Vec::new()));
    }
    additions.push((
        ORIGIN_RELATIONSHIPS_PART.to_owned(),
        add_relationship(
            read_optional(&source, ORIGIN_RELATIONSHIPS_PART)?.as_deref(),
            SIGNATURE_RELATIONSHIP_TYPE,
            &file_name,
            false,
        )?,
    ));
    additions.push((
        ROOT_RELATIONSHIPS_PART.to_owned(),
        add_relationship(
            read_optional(&source, ROOT_RELATIONSHIPS_PART)?.as_deref(),
            ORIGIN_RELATIONSHIP_TYPE,
            ORIGIN_PART,
            true,
        )?,
    ));
    additions.push((
        CONTENT_TYPES_PART.to_owned(),
        add_content_types(&source.read_entry(CONTENT_TYPES_PART)?, &part)?,
    ));

    let replaced: HashSet<String> = additions.iter().map(|(n, _)| n.clone()).collect();
    let mut archive = source.into_inner();
    rebuild_archive(&mut archive, &|name| !replaced.contains(name), &additions, out)
}

fn read_optional(source: &dyn DocumentSource, name: &str) -> Result<Option<Vec<u8>>> {
    if source.contains(name) {
        source.read_entry(name).map(Some)
    } else {
        Ok(None)
    }
}

/// Add a relationship to a relationships part, creating the part if
/// needed. With `unique_type` nothing is added when a relationship of
/// `type_` already exists.
fn add_relationship(
    existing: Option<&[u8]>,
    type_: &str,
    target: &str,
    unique_type: bool,
) -> Result<Vec<u8>> {
    let Some(existing) = existing else {
        return Ok(format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{}"><Relationship Id="rId1" Type="{type_}" Target="{target}"/></Relationships>"#,
            ns::RELATIONSHIPS
        )
        .into_bytes());
    };
    let doc = XmlDocument::parse_bytes(existing)?;
    let parsed = doc.parse_doc()?;
    let root = parsed.root_element();
    let relationships: Vec<_> = child_elements(root, ns::RELATIONSHIPS, "Relationship").collect();
    if relationships.iter().any(|r| {
        r.attribute("Type") == Some(type_) && (unique_type || r.attribute("Target") == Some(target))
    }) {
        return Ok(existing.to_vec());
    }
    let ids: HashSet<&str> = relationships.iter().filter_map(|r| r.attribute("Id")).collect();
    let id = (relationships.len() + 1..)
        .map(|n| format!("rId{n}"))
        .find(|id| !ids.contains(id.as_str()))
        .unwrap_or_default();

    let mut splicer = Splicer::new(doc.text());
    splicer.append_child(
        &root,
        &format!(r#"<Relationship Id="{id}" Type="{type_}" Target="{target}"/>"#),
    )?;
    Ok(splicer.finish()?.into_bytes())
}

/// Declare the origin extension and override the content type of `part`.
fn add_content_types(existing: &[u8], part: &str) -> Result<Vec<u8>> {
    let doc = XmlDocument::parse_bytes(existing)?;
    let parsed = doc.parse_doc()?;
    let root = parsed.root_element();
    if !is_element(&root, ns::CONTENT_TYPES, "Types") {
        return Err(Error::DocumentFormat("not a content types part".into()));
    }
    let mut fragment = String::new();
    let has_origin = child_elements(root, ns::CONTENT_TYPES, "Default")
        .any(|d| d.attribute("Extension").map_or(false, |e| e.eq_ignore_ascii_case("sigs")));
    if !has_origin {
        fragment.push_str(&format!(
            r#"<Default Extension="sigs" ContentType="{ORIGIN_CONTENT_TYPE}"/>"#
        ));
    }
    fragment.push_str(&format!(
        r#"<Override PartName="/{part}" ContentType="{SIGNATURE_CONTENT_TYPE}"/>"#
    ));
    let mut splicer = Splicer::new(doc.text());
    splicer.append_child(&root, &fragment)?;
    Ok(splicer.finish()?.into_bytes())
}

pub(crate) fn verify(validator: &XadesValidator<'_>, document: &[u8]) -> Result<Vec<SignatureInfo>> {
    let source = open_archive(document)?;
    let signed_parts: Vec<String> = source
        .entry_names()
        .into_iter()
        .filter(|n| !is_unsigned_part(n) && !is_relationships_part(n))
        .collect();
    let dereferencer = |uri: &str| source.read_entry(&part_name_from_uri(uri));

    let mut infos = Vec::new();
    for part in source.entry_names().into_iter().filter(|n| is_signature_part(n)) {
        let text = xml::host_document(&source.read_entry(&part)?)?;
        for v in validate_all(validator, &text, &dereferencer)? {
            let covered: HashSet<String> = v.core.detached_uris().map(part_name_from_uri).collect();
            match signed_parts.iter().find(|n| !covered.contains(*n)) {
                Some(missing) => log::warn!("{part}: part {missing} is not signed"),
                None => infos.push(v.info),
            }
        }
    }
    Ok(infos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::tests::build_zip;
    use crate::request::{ContentType, SigningRequest};
    use crate::testutil::Fixture;

    fn docx() -> Vec<u8> {
        let types = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="{}"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#,
            ns::CONTENT_TYPES
        );
        let rels = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="{}"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#,
            ns::RELATIONSHIPS
        );
        build_zip(&[
            (CONTENT_TYPES_PART, types.as_bytes()),
            (ROOT_RELATIONSHIPS_PART, rels.as_bytes()),
            ("word/document.xml", b"<w:document xmlns:w=\"urn:w\"><w:body/></w:document>"),
        ])
    }

    fn read(package: &[u8], name: &str) -> String {
        String::from_utf8(open_archive(package).unwrap().read_entry(name).unwrap()).unwrap()
    }

    #[test]
    fn signature_part_names() {
        assert!(is_signature_part("_xmlsignatures/sig1.xml"));
        assert!(!is_signature_part(ORIGIN_PART));
        assert!(!is_signature_part(ORIGIN_RELATIONSHIPS_PART));
        assert!(!is_signature_part("word/sig1.xml"));
    }

    #[test]
    fn relationship_ids_stay_unique() {
        let rels = add_relationship(None, "t:a", "x.xml", false).unwrap();
        let rels = add_relationship(Some(&rels), "t:a", "y.xml", false).unwrap();
        let text = String::from_utf8(rels.clone()).unwrap();
        assert!(text.contains(r#"Id="rId1""#) && text.contains(r#"Id="rId2""#));
        assert_eq!(add_relationship(Some(&rels), "t:a", "z.xml", true).unwrap(), rels);
    }

    #[test]
    fn signing_adds_signature_parts() {
        let f = Fixture::new();
        let signed = f.sign(SigningRequest::new(docx(), ContentType::Ooxml)).unwrap();
        let names = open_archive(&signed).unwrap().entry_names();
        assert_eq!(names[0], "word/document.xml");
        for part in ["_xmlsignatures/sig1.xml", ORIGIN_PART, ORIGIN_RELATIONSHIPS_PART, ROOT_RELATIONSHIPS_PART, CONTENT_TYPES_PART] {
            assert!(names.iter().any(|n| n == part), "{part} missing");
        }
        assert!(read(&signed, ROOT_RELATIONSHIPS_PART).contains(ORIGIN_RELATIONSHIP_TYPE));
        assert!(read(&signed, ORIGIN_RELATIONSHIPS_PART).contains(r#"Target="sig1.xml""#));
        let types = read(&signed, CONTENT_TYPES_PART);
        assert!(types.contains(r#"Extension="sigs""#));
        assert!(types.contains(r#"PartName="/_xmlsignatures/sig1.xml""#));

        let infos = f.verifier().verify_signatures(&signed, ContentType::Ooxml, None).unwrap();
        assert_eq!(infos.len(), 1);
    }

    #[test]
    fn cosignature_gets_second_part() {
        let f = Fixture::new();
        let once = f.sign(SigningRequest::new(docx(), ContentType::Ooxml)).unwrap();
        let twice = f.sign(SigningRequest::new(once, ContentType::Ooxml)).unwrap();
        let types = read(&twice, CONTENT_TYPES_PART);
        assert_eq!(types.matches(r#"Extension="sigs""#).count(), 1);
        assert!(types.contains("/_xmlsignatures/sig2.xml"));
        assert_eq!(read(&twice, ROOT_RELATIONSHIPS_PART).matches(ORIGIN_RELATIONSHIP_TYPE).count(), 1);
        let infos = f.verifier().verify_signatures(&twice, ContentType::Ooxml, None).unwrap();
        assert_eq!(infos.len(), 2);
    }

    #[test]
    fn tampered_part_is_skipped() {
        let f = Fixture::new();
        let signed = f.sign(SigningRequest::new(docx(), ContentType::Ooxml)).unwrap();
        let source = open_archive(&signed).unwrap();
        let entries: Vec<(String, Vec<u8>)> = source
            .entry_names()
            .into_iter()
            .map(|n| {
                let data = if n == "word/document.xml" {
                    b"<w:document xmlns:w=\"urn:w\"><w:body>forged</w:body></w:document>".to_vec()
                } else {
                    source.read_entry(&n).unwrap()
                };
                (n, data)
            })
            .collect();
        let pairs: Vec<(&str, &[u8])> = entries.iter().map(|(n, d)| (n.as_str(), d.as_slice())).collect();
        let tampered = build_zip(&pairs);
        assert!(f
            .verifier()
            .verify_signatures(&tampered, ContentType::Ooxml, None)
            .unwrap()
            .is_empty());
    }
}
