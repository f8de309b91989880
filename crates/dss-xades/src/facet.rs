#![forbid(unsafe_code)]

//! The signature facet contract.
//!
//! A signature is assembled by an ordered list of facets. During pre-sign
//! each facet contributes references, objects or key information to a
//! [`SignatureContext`]; after the external signer produced the signature
//! value each facet may complete the serialized signature through a
//! [`PostSignContext`]. The order of the list is significant: a facet only
//! sees what earlier facets contributed.

use base64::Engine;
use chrono::{DateTime, Utc};
use dss_c14n::C14nMode;
use dss_core::{algorithm, Error, Result};
use dss_crypto::DigestAlgo;
use dss_transforms::{
    C14nTransform, RelationshipTransform, Transform, TransformData, TransformPipeline,
};
use dss_xml::XmlWriter;

use crate::source::DocumentSource;

pub(crate) const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// Decode base64 element content, ignoring line breaks and indentation.
pub(crate) fn decode_base64(text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    B64.decode(compact.as_bytes())
        .map_err(|e| Error::Base64(e.to_string()))
}

/// A transform of a reference built by a facet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformSpec {
    C14n(C14nMode),
    /// `not(ancestor-or-self::ds:Signature)`
    SignatureExclusion,
    Relationship(RelationshipTransform),
}

impl TransformSpec {
    fn write(&self, w: &mut XmlWriter) {
        match self {
            TransformSpec::C14n(mode) => {
                w.empty_element("ds:Transform", &[("Algorithm", mode.uri())]);
            }
            TransformSpec::SignatureExclusion => {
                w.start_element("ds:Transform", &[("Algorithm", algorithm::XPATH)]);
                w.text_element(
                    "ds:XPath",
                    &[],
                    &dss_transforms::enveloped::signature_exclusion_xpath("ds"),
                );
                w.end_element("ds:Transform");
            }
            TransformSpec::Relationship(rel) => {
                w.start_element("ds:Transform", &[("Algorithm", algorithm::RELATIONSHIP)]);
                rel.write_parameters(w);
                w.end_element("ds:Transform");
            }
        }
    }

    fn to_transform(&self) -> Result<Box<dyn Transform>> {
        match self {
            TransformSpec::C14n(mode) => Ok(Box::new(C14nTransform::new(*mode, Vec::new()))),
            TransformSpec::Relationship(rel) => Ok(Box::new(rel.clone())),
            TransformSpec::SignatureExclusion => Err(Error::Transform(
                "signature exclusion needs a same-document reference".into(),
            )),
        }
    }
}

/// A `ds:Reference` under construction.
#[derive(Debug, Clone)]
pub struct ReferenceSpec {
    pub id: Option<String>,
    pub uri: String,
    pub type_: Option<String>,
    pub transforms: Vec<TransformSpec>,
    pub digest: DigestAlgo,
    /// Digest of external data. Same-document references leave this empty
    /// and are digested once the signature is placed in its document.
    pub digest_value: Option<Vec<u8>>,
}

impl ReferenceSpec {
    pub fn same_document(uri: impl Into<String>, digest: DigestAlgo) -> Self {
        Self {
            id: None,
            uri: uri.into(),
            type_: None,
            transforms: Vec::new(),
            digest,
            digest_value: None,
        }
    }

    /// A reference to external data, digested through `transforms`.
    pub fn external(
        uri: impl Into<String>,
        data: Vec<u8>,
        transforms: Vec<TransformSpec>,
        digest: DigestAlgo,
    ) -> Result<Self> {
        let value = digest_external(data, &transforms, digest)?;
        Ok(Self {
            id: None,
            uri: uri.into(),
            type_: None,
            transforms,
            digest,
            digest_value: Some(value),
        })
    }

    pub fn with_type(mut self, type_: &str) -> Self {
        self.type_ = Some(type_.to_owned());
        self
    }

    pub fn with_transform(mut self, transform: TransformSpec) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn is_same_document(&self) -> bool {
        dss_transforms::uri::is_same_document(&self.uri)
    }

    pub(crate) fn write(&self, w: &mut XmlWriter) {
        let mut attrs: Vec<(&str, &str)> = Vec::new();
        if let Some(id) = &self.id {
            attrs.push(("Id", id));
        }
        attrs.push(("URI", &self.uri));
        if let Some(t) = &self.type_ {
            attrs.push(("Type", t));
        }
        w.start_element("ds:Reference", &attrs);
        if !self.transforms.is_empty() {
            w.start_element("ds:Transforms", &[]);
            for t in &self.transforms {
                t.write(w);
            }
            w.end_element("ds:Transforms");
        }
        w.empty_element("ds:DigestMethod", &[("Algorithm", self.digest.xml_uri())]);
        let value = self
            .digest_value
            .as_ref()
            .map(|v| B64.encode(v))
            .unwrap_or_default();
        w.text_element("ds:DigestValue", &[], &value);
        w.end_element("ds:Reference");
    }
}

/// Digest `data` after applying `transforms`.
pub fn digest_external(
    data: Vec<u8>,
    transforms: &[TransformSpec],
    digest: DigestAlgo,
) -> Result<Vec<u8>> {
    let mut pipeline = TransformPipeline::new();
    for t in transforms {
        pipeline.push(t.to_transform()?);
    }
    let out = pipeline.execute(TransformData::Binary(data))?.to_binary()?;
    Ok(digest.digest(&out))
}

/// The content of a `ds:Object`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlObject {
    pub id: Option<String>,
    /// Serialized children; prefixes other than `ds` declare their own
    /// namespaces.
    pub content: String,
}

// ── Contexts ─────────────────────────────────────────────────────────

/// The accumulated contributions of the pre-sign pass.
pub struct SignatureContext<'a> {
    signature_id: String,
    chain: &'a [Vec<u8>],
    digest: DigestAlgo,
    signing_time: DateTime<Utc>,
    source: &'a dyn DocumentSource,
    references: Vec<ReferenceSpec>,
    objects: Vec<XmlObject>,
    key_info: Option<String>,
}

impl<'a> SignatureContext<'a> {
    pub fn new(
        signature_id: impl Into<String>,
        chain: &'a [Vec<u8>],
        digest: DigestAlgo,
        source: &'a dyn DocumentSource,
    ) -> Self {
        Self {
            signature_id: signature_id.into(),
            chain,
            digest,
            signing_time: Utc::now(),
            source,
            references: Vec::new(),
            objects: Vec::new(),
            key_info: None,
        }
    }

    /// Use a fixed signing time instead of the current time.
    pub fn with_signing_time(mut self, at: DateTime<Utc>) -> Self {
        self.signing_time = at;
        self
    }

    pub fn signature_id(&self) -> &str {
        &self.signature_id
    }

    pub fn chain(&self) -> &'a [Vec<u8>] {
        self.chain
    }

    /// `chain[0]`.
    pub fn signer_certificate(&self) -> Result<&'a [u8]> {
        self.chain
            .first()
            .map(Vec::as_slice)
            .ok_or_else(|| Error::Precondition("empty certificate chain".into()))
    }

    pub fn digest(&self) -> DigestAlgo {
        self.digest
    }

    pub fn signing_time(&self) -> DateTime<Utc> {
        self.signing_time
    }

    pub fn source(&self) -> &'a dyn DocumentSource {
        self.source
    }

    pub fn add_reference(&mut self, reference: ReferenceSpec) {
        self.references.push(reference);
    }

    pub fn add_object(&mut self, object: XmlObject) {
        self.objects.push(object);
    }

    pub fn references(&self) -> &[ReferenceSpec] {
        &self.references
    }

    pub fn objects(&self) -> &[XmlObject] {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> &mut [XmlObject] {
        &mut self.objects
    }

    /// Set the serialized `ds:KeyInfo` element.
    pub fn set_key_info(&mut self, key_info: String) {
        self.key_info = Some(key_info);
    }

    pub fn key_info(&self) -> Option<&str> {
        self.key_info.as_deref()
    }

    pub(crate) fn into_parts(self) -> (Vec<ReferenceSpec>, Vec<XmlObject>, Option<String>) {
        (self.references, self.objects, self.key_info)
    }
}

/// The serialized document holding a signature with its value.
pub struct PostSignContext<'a> {
    document: String,
    signature_id: &'a str,
    chain: &'a [Vec<u8>],
}

impl<'a> PostSignContext<'a> {
    pub fn new(document: String, signature_id: &'a str, chain: &'a [Vec<u8>]) -> Self {
        Self {
            document,
            signature_id,
            chain,
        }
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn set_document(&mut self, document: String) {
        self.document = document;
    }

    pub fn signature_id(&self) -> &str {
        self.signature_id
    }

    pub fn chain(&self) -> &'a [Vec<u8>] {
        self.chain
    }

    pub fn into_document(self) -> String {
        self.document
    }
}

/// One contributor to signature construction.
pub trait SignatureFacet {
    fn name(&self) -> &'static str;

    fn pre_sign(&self, ctx: &mut SignatureContext<'_>) -> Result<()>;

    /// Runs once the signature value is in place.
    fn post_sign(&self, ctx: &mut PostSignContext<'_>) -> Result<()> {
        require_chain(ctx.chain())
    }
}

/// Fail with `Precondition` when `chain` is empty.
pub fn require_chain(chain: &[Vec<u8>]) -> Result<()> {
    if chain.is_empty() {
        return Err(Error::Precondition("empty certificate chain".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::NoSource;

    struct Nop;

    impl SignatureFacet for Nop {
        fn name(&self) -> &'static str {
            "nop"
        }

        fn pre_sign(&self, _ctx: &mut SignatureContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn default_post_sign_requires_chain() {
        let mut empty = PostSignContext::new(String::new(), "s", &[]);
        assert!(matches!(Nop.post_sign(&mut empty), Err(Error::Precondition(_))));
        let chain = vec![vec![1u8]];
        let mut ok = PostSignContext::new(String::new(), "s", &chain);
        assert!(Nop.post_sign(&mut ok).is_ok());
    }

    #[test]
    fn external_reference_applies_c14n() {
        let r = ReferenceSpec::external(
            "content.xml",
            b"<a  b='1'/>".to_vec(),
            vec![TransformSpec::C14n(C14nMode::Inclusive)],
            DigestAlgo::Sha256,
        )
        .unwrap();
        assert_eq!(r.digest_value, Some(DigestAlgo::Sha256.digest(br#"<a b="1"></a>"#)));
        let mut w = XmlWriter::new();
        r.write(&mut w);
        let xml = w.into_string();
        assert!(xml.starts_with(r#"<ds:Reference URI="content.xml"><ds:Transforms>"#));
        assert!(xml.contains(algorithm::SHA256));
    }

    #[test]
    fn signer_certificate_needs_chain() {
        let ctx = SignatureContext::new("s", &[], DigestAlgo::Sha256, &NoSource);
        assert!(matches!(ctx.signer_certificate(), Err(Error::Precondition(_))));
    }
}
