#![forbid(unsafe_code)]

//! Office Open XML package signatures.
//!
//! The parts of the package are referenced from a `ds:Manifest` inside the
//! `idPackageObject` object; relationship parts go through the OPC
//! relationship transform so that relationships added later (such as the
//! signature origin) do not break the signature. An `idOfficeObject` object
//! carries the Office signature details.

use dss_c14n::C14nMode;
use dss_core::{algorithm, ns, Error, Result};
use dss_transforms::RelationshipTransform;
use dss_xml::document::child_elements;
use dss_xml::XmlWriter;

use crate::facet::{ReferenceSpec, SignatureContext, SignatureFacet, TransformSpec, XmlObject};

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub const SIGNATURES_DIR: &str = "_xmlsignatures/";
pub const ORIGIN_PART: &str = "_xmlsignatures/origin.sigs";
pub const RELATIONSHIPS_CONTENT_TYPE: &str = "application/vnd.openxmlformats-package.relationships+xml";
pub const ORIGIN_CONTENT_TYPE: &str = "application/vnd.openxmlformats-package.digital-signature-origin";
pub const SIGNATURE_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-package.digital-signature-xmlsignature+xml";
pub const ORIGIN_RELATIONSHIP_TYPE: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships/digital-signature/origin";
pub const SIGNATURE_RELATIONSHIP_TYPE: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships/digital-signature/signature";

pub const PACKAGE_OBJECT_ID: &str = "idPackageObject";
pub const OFFICE_OBJECT_ID: &str = "idOfficeObject";

/// Whether a part is never covered by the package manifest.
pub fn is_unsigned_part(name: &str) -> bool {
    name == CONTENT_TYPES_PART || name.starts_with(SIGNATURES_DIR)
}

pub fn is_relationships_part(name: &str) -> bool {
    name.ends_with(".rels") && (name.starts_with("_rels/") || name.contains("/_rels/"))
}

/// The part name addressed by a manifest reference URI.
pub fn part_name_from_uri(uri: &str) -> String {
    let path = uri.split('?').next().unwrap_or(uri);
    path.trim_start_matches('/').to_owned()
}

/// `[Content_Types].xml` of a package.
#[derive(Debug, Clone, Default)]
pub struct ContentTypes {
    defaults: Vec<(String, String)>,
    overrides: Vec<(String, String)>,
}

impl ContentTypes {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let doc = dss_xml::XmlDocument::parse_bytes(data)?;
        let parsed = doc.parse_doc()?;
        let root = parsed.root_element();
        if !dss_xml::document::is_element(&root, ns::CONTENT_TYPES, "Types") {
            return Err(Error::DocumentFormat("not a content types part".into()));
        }
        let mut types = Self::default();
        for d in child_elements(root, ns::CONTENT_TYPES, "Default") {
            if let (Some(ext), Some(ct)) = (d.attribute("Extension"), d.attribute("ContentType")) {
                types.defaults.push((ext.to_ascii_lowercase(), ct.to_owned()));
            }
        }
        for o in child_elements(root, ns::CONTENT_TYPES, "Override") {
            if let (Some(part), Some(ct)) = (o.attribute("PartName"), o.attribute("ContentType")) {
                types.overrides.push((part.to_owned(), ct.to_owned()));
            }
        }
        Ok(types)
    }

    /// Content type of the part `name` (without leading slash).
    pub fn content_type(&self, name: &str) -> Option<&str> {
        let part = format!("/{name}");
        if let Some((_, ct)) = self.overrides.iter().find(|(p, _)| p.eq_ignore_ascii_case(&part)) {
            return Some(ct);
        }
        let ext = name.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase())?;
        self.defaults.iter().find(|(e, _)| *e == ext).map(|(_, ct)| ct.as_str())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OoxmlFacet;

impl SignatureFacet for OoxmlFacet {
    fn name(&self) -> &'static str {
        "ooxml"
    }

    fn pre_sign(&self, ctx: &mut SignatureContext<'_>) -> Result<()> {
        let source = ctx.source();
        let types = ContentTypes::parse(&source.read_entry(CONTENT_TYPES_PART)?)?;
        let digest = ctx.digest();
        let signature_id = ctx.signature_id().to_owned();

        let mut manifest = Vec::new();
        for name in source.entry_names() {
            if is_unsigned_part(&name) {
                continue;
            }
            let data = source.read_entry(&name)?;
            if is_relationships_part(&name) {
                let ids = signed_relationship_ids(&data)?;
                let transforms = vec![
                    TransformSpec::Relationship(RelationshipTransform::new(ids, Vec::new())),
                    TransformSpec::C14n(C14nMode::Inclusive),
                ];
                let uri = format!("/{name}?ContentType={RELATIONSHIPS_CONTENT_TYPE}");
                manifest.push(ReferenceSpec::external(uri, data, transforms, digest)?);
            } else {
                let ct = types
                    .content_type(&name)
                    .ok_or_else(|| Error::DocumentFormat(format!("no content type for {name}")))?;
                let uri = format!("/{name}?ContentType={ct}");
                manifest.push(ReferenceSpec::external(uri, data, Vec::new(), digest)?);
            }
        }
        if manifest.is_empty() {
            return Err(Error::DocumentFormat("package without parts".into()));
        }

        let mut w = XmlWriter::new();
        w.start_element("ds:Manifest", &[]);
        for reference in &manifest {
            reference.write(&mut w);
        }
        w.end_element("ds:Manifest");
        w.start_element("ds:SignatureProperties", &[]);
        w.start_element(
            "ds:SignatureProperty",
            &[("Id", "idSignatureTime"), ("Target", &format!("#{signature_id}"))],
        );
        w.start_element("mdssi:SignatureTime", &[("xmlns:mdssi", ns::OPC_DSIG)]);
        w.text_element("mdssi:Format", &[], "YYYY-MM-DDThh:mm:ssTZD");
        w.text_element(
            "mdssi:Value",
            &[],
            &ctx.signing_time().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        );
        w.end_element("mdssi:SignatureTime");
        w.end_element("ds:SignatureProperty");
        w.end_element("ds:SignatureProperties");
        ctx.add_object(XmlObject {
            id: Some(PACKAGE_OBJECT_ID.into()),
            content: w.into_string(),
        });

        let mut w = XmlWriter::new();
        w.start_element("ds:SignatureProperties", &[]);
        w.start_element(
            "ds:SignatureProperty",
            &[("Id", "idOfficeV1Details"), ("Target", &format!("#{signature_id}"))],
        );
        w.start_element("SignatureInfoV1", &[("xmlns", ns::OFFICE_DSIG)]);
        w.text_element("SetupID", &[], "");
        w.text_element("SignatureText", &[], "");
        w.text_element("SignatureComments", &[], "");
        w.text_element("SignatureProviderId", &[], "{00000000-0000-0000-0000-000000000000}");
        w.text_element("SignatureProviderDetails", &[], "9");
        w.text_element("ManifestHashAlgorithm", &[], digest.xml_uri());
        w.text_element("SignatureType", &[], "1");
        w.end_element("SignatureInfoV1");
        w.end_element("ds:SignatureProperty");
        w.end_element("ds:SignatureProperties");
        ctx.add_object(XmlObject {
            id: Some(OFFICE_OBJECT_ID.into()),
            content: w.into_string(),
        });

        for id in [PACKAGE_OBJECT_ID, OFFICE_OBJECT_ID] {
            ctx.add_reference(
                ReferenceSpec::same_document(format!("#{id}"), digest).with_type(algorithm::OBJECT_TYPE),
            );
        }
        Ok(())
    }
}

/// Ids of the relationships of a part, except the signature origin.
fn signed_relationship_ids(data: &[u8]) -> Result<Vec<String>> {
    let doc = dss_xml::XmlDocument::parse_bytes(data)?;
    let parsed = doc.parse_doc()?;
    Ok(child_elements(parsed.root_element(), ns::RELATIONSHIPS, "Relationship")
        .filter(|r| r.attribute("Type") != Some(ORIGIN_RELATIONSHIP_TYPE))
        .filter_map(|r| r.attribute("Id").map(str::to_owned))
        .collect())
}
