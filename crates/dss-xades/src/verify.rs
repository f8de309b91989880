#![forbid(unsafe_code)]

//! XML-DSig core validation of one `ds:Signature`.
//!
//! Every reference of `SignedInfo` and of the signature's manifests is
//! dereferenced, transformed and digested; the signature value is checked
//! with the key of the first `KeyInfo` certificate.

use dss_c14n::C14nMode;
use dss_core::{ns, Error, Result};
use dss_crypto::DigestAlgo;
use dss_transforms::TransformData;
use dss_xml::document::{child_element, child_elements, element_text};

use crate::facet::decode_base64;

/// Resolves the URIs of detached references.
pub trait UriDereferencer {
    fn dereference(&self, uri: &str) -> Result<Vec<u8>>;
}

impl<F> UriDereferencer for F
where
    F: Fn(&str) -> Result<Vec<u8>>,
{
    fn dereference(&self, uri: &str) -> Result<Vec<u8>> {
        self(uri)
    }
}

/// Rejects every detached reference.
pub struct SameDocumentOnly;

impl UriDereferencer for SameDocumentOnly {
    fn dereference(&self, uri: &str) -> Result<Vec<u8>> {
        Err(Error::InvalidUri(format!("detached reference not allowed: {uri}")))
    }
}

/// A reference that passed digest validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedReference {
    pub uri: String,
    pub type_: Option<String>,
    /// Listed in a `ds:Manifest` rather than in `SignedInfo`.
    pub in_manifest: bool,
}

/// Outcome of core validation.
#[derive(Debug, Clone)]
pub struct CoreValidation {
    /// `Id` of the `ds:Signature` element.
    pub signature_id: Option<String>,
    /// `KeyInfo` certificates, leaf first.
    pub key_info_chain: Vec<Vec<u8>>,
    pub references: Vec<VerifiedReference>,
}

impl CoreValidation {
    pub fn signer(&self) -> &[u8] {
        &self.key_info_chain[0]
    }

    /// URIs of the detached references, `SignedInfo` and manifests alike.
    pub fn detached_uris(&self) -> impl Iterator<Item = &str> {
        self.references
            .iter()
            .map(|r| r.uri.as_str())
            .filter(|u| !dss_transforms::uri::is_same_document(u))
    }
}

/// Validate `signature`, an element of the parsed `document`.
pub fn verify_signature(
    document: &str,
    signature: roxmltree::Node<'_, '_>,
    dereferencer: &dyn UriDereferencer,
) -> Result<CoreValidation> {
    let signed_info = child_element(signature, ns::DSIG, ns::node::SIGNED_INFO)
        .ok_or_else(|| Error::MissingElement("SignedInfo".into()))?;

    let key_info_chain = key_info_certificates(signature)?;
    let signer = key_info_chain
        .first()
        .ok_or_else(|| Error::MissingElement("KeyInfo/X509Data/X509Certificate".into()))?;
    let key = dss_keys::cert::public_key(&dss_keys::cert::parse_certificate(signer)?)?;

    let c14n = child_element(signed_info, ns::DSIG, ns::node::CANONICALIZATION_METHOD)
        .ok_or_else(|| Error::MissingElement("CanonicalizationMethod".into()))?;
    let c14n_uri = c14n
        .attribute(ns::attr::ALGORITHM)
        .ok_or_else(|| Error::MissingAttribute("CanonicalizationMethod/@Algorithm".into()))?;
    let mode = C14nMode::from_uri(c14n_uri)
        .ok_or_else(|| Error::UnsupportedAlgorithm(format!("C14N: {c14n_uri}")))?;
    let method_uri = child_element(signed_info, ns::DSIG, ns::node::SIGNATURE_METHOD)
        .and_then(|m| m.attribute(ns::attr::ALGORITHM))
        .ok_or_else(|| Error::MissingElement("SignatureMethod".into()))?;
    let method = dss_crypto::sign::from_uri(method_uri)?;

    let value = child_element(signature, ns::DSIG, ns::node::SIGNATURE_VALUE)
        .ok_or_else(|| Error::MissingElement("SignatureValue".into()))?;
    let value = decode_base64(&element_text(value))?;
    let octets = dss_c14n::canonicalize_node(
        signed_info,
        mode,
        &dss_transforms::read_inclusive_prefixes(c14n),
    )?;
    if !method.verify(&key, &octets, &value)? {
        return Err(Error::SignatureInvalid("SignatureValue does not verify".into()));
    }

    let mut references = Vec::new();
    for reference in child_elements(signed_info, ns::DSIG, ns::node::REFERENCE) {
        references.push(verify_reference(document, signature, reference, dereferencer, false)?);
    }
    for manifest in child_elements(signature, ns::DSIG, ns::node::OBJECT)
        .flat_map(|o| child_elements(o, ns::DSIG, ns::node::MANIFEST))
    {
        for reference in child_elements(manifest, ns::DSIG, ns::node::REFERENCE) {
            references.push(verify_reference(document, signature, reference, dereferencer, true)?);
        }
    }
    if references.is_empty() {
        return Err(Error::MissingElement("Reference".into()));
    }

    Ok(CoreValidation {
        signature_id: signature.attribute(ns::attr::ID).map(str::to_owned),
        key_info_chain,
        references,
    })
}

fn verify_reference(
    document: &str,
    signature: roxmltree::Node<'_, '_>,
    reference: roxmltree::Node<'_, '_>,
    dereferencer: &dyn UriDereferencer,
    in_manifest: bool,
) -> Result<VerifiedReference> {
    let uri = reference.attribute(ns::attr::URI).unwrap_or("");
    let method = child_element(reference, ns::DSIG, ns::node::DIGEST_METHOD)
        .and_then(|m| m.attribute(ns::attr::ALGORITHM))
        .ok_or_else(|| Error::MissingElement("DigestMethod".into()))?;
    let digest = DigestAlgo::from_xml_uri(method)?;
    let expected = child_element(reference, ns::DSIG, ns::node::DIGEST_VALUE)
        .map(element_text)
        .ok_or_else(|| Error::MissingElement("DigestValue".into()))?;
    let expected = decode_base64(&expected)?;

    let data = if dss_transforms::uri::is_same_document(uri) {
        dss_transforms::uri::resolve_same_document(uri, document)?
    } else {
        TransformData::Binary(dereferencer.dereference(uri)?)
    };
    let pipeline = dss_transforms::build_pipeline(
        child_element(reference, ns::DSIG, ns::node::TRANSFORMS),
        signature,
    )?;
    let octets = pipeline.execute(data)?.to_binary()?;
    if digest.digest(&octets) != expected {
        return Err(Error::DigestMismatch(uri.to_owned()));
    }
    log::debug!("reference {uri:?} verified");
    Ok(VerifiedReference {
        uri: uri.to_owned(),
        type_: reference.attribute(ns::attr::TYPE).map(str::to_owned),
        in_manifest,
    })
}

/// The `X509Certificate`s of the signature's `KeyInfo`, in document order.
pub fn key_info_certificates(signature: roxmltree::Node<'_, '_>) -> Result<Vec<Vec<u8>>> {
    let Some(key_info) = child_element(signature, ns::DSIG, ns::node::KEY_INFO) else {
        return Ok(Vec::new());
    };
    child_elements(key_info, ns::DSIG, ns::node::X509_DATA)
        .flat_map(|d| child_elements(d, ns::DSIG, ns::node::X509_CERTIFICATE))
        .map(|c| decode_base64(&element_text(c)))
        .collect()
}

/// Every `ds:Signature` element of `doc`, in document order.
pub fn find_signatures<'a, 'input>(
    doc: &'a roxmltree::Document<'input>,
) -> Vec<roxmltree::Node<'a, 'input>> {
    dss_xml::XmlDocument::find_elements(doc, ns::DSIG, ns::node::SIGNATURE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SignatureBuilder;
    use crate::facets::{CoSignatureFacet, KeyInfoFacet};
    use crate::source::NoSource;
    use dss_crypto::sign::{self, SignatureFormat};
    use dss_keys::testing::pki;

    fn signed_xml(xml: &str) -> String {
        let pki = pki();
        let chain = pki.signer.chain();
        let builder = SignatureBuilder::new(DigestAlgo::Sha256)
            .with_facet(Box::new(CoSignatureFacet))
            .with_facet(Box::new(KeyInfoFacet::default()));
        let pending = builder.pre_sign(chain, &NoSource, Some(xml)).unwrap();
        let value = sign::sign_prehash(
            pki.signer.key(),
            DigestAlgo::Sha256,
            &pending.digest_info.digest_value,
            SignatureFormat::XmlDsig,
        )
        .unwrap();
        builder.post_sign(pending, &value, chain).unwrap()
    }

    #[test]
    fn verifies_own_signature() {
        let signed = signed_xml("<doc><a>1</a></doc>");
        let doc = dss_xml::parse(&signed).unwrap();
        let sigs = find_signatures(&doc);
        assert_eq!(sigs.len(), 1);
        let core = verify_signature(&signed, sigs[0], &SameDocumentOnly).unwrap();
        assert_eq!(core.signer(), pki().signer.chain()[0].as_slice());
        assert_eq!(core.key_info_chain.len(), 2);
        assert_eq!(core.references[0].uri, "");
        assert_eq!(core.detached_uris().count(), 0);
        assert!(core.signature_id.unwrap().starts_with("xmldsig-"));
    }

    #[test]
    fn detects_content_change() {
        let signed = signed_xml("<doc><a>1</a></doc>").replace("<a>1</a>", "<a>2</a>");
        let doc = dss_xml::parse(&signed).unwrap();
        let err = verify_signature(&signed, find_signatures(&doc)[0], &SameDocumentOnly).unwrap_err();
        assert!(matches!(err, Error::DigestMismatch(_)));
    }

    #[test]
    fn detects_signature_value_change() {
        let signed = signed_xml("<doc/>");
        let doc = dss_xml::parse(&signed).unwrap();
        let value = doc
            .descendants()
            .find(|n| n.has_tag_name((ns::DSIG, ns::node::SIGNATURE_VALUE)))
            .unwrap();
        let text = value.text().unwrap();
        let flipped = if text.starts_with('A') { "B" } else { "A" };
        let tampered = signed.replacen(text, &format!("{flipped}{}", &text[1..]), 1);
        let doc = dss_xml::parse(&tampered).unwrap();
        let err = verify_signature(&tampered, find_signatures(&doc)[0], &SameDocumentOnly).unwrap_err();
        assert!(matches!(err, Error::SignatureInvalid(_)));
    }
}
