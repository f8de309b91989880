#![forbid(unsafe_code)]

//! Two-phase signature construction.
//!
//! [`SignatureBuilder::pre_sign`] runs the facets, serializes a
//! `ds:Signature` with an empty `SignatureValue`, places it in its host
//! document, digests the same-document references and returns the digest of
//! the canonical `SignedInfo`. [`SignatureBuilder::post_sign`] inserts the
//! externally computed signature value and lets every facet complete the
//! signature.

use base64::Engine;
use chrono::{DateTime, Utc};
use dss_c14n::C14nMode;
use dss_core::{algorithm, ns, Error, Result};
use dss_crypto::DigestAlgo;
use dss_xml::document::{child_element, child_elements, is_element};
use dss_xml::splice::Splicer;
use dss_xml::XmlWriter;

use crate::facet::{PostSignContext, SignatureContext, SignatureFacet, B64};
use crate::source::DocumentSource;
use crate::spi::DigestInfo;

/// A signature waiting for its signature value.
#[derive(Debug, Clone)]
pub struct PendingSignature {
    /// The host document with the signature in place.
    pub document: String,
    pub signature_id: String,
    pub digest_info: DigestInfo,
}

/// An ordered facet chain plus the signing digest.
pub struct SignatureBuilder<'a> {
    facets: Vec<Box<dyn SignatureFacet + 'a>>,
    digest: DigestAlgo,
}

impl<'a> SignatureBuilder<'a> {
    pub fn new(digest: DigestAlgo) -> Self {
        Self {
            facets: Vec::new(),
            digest,
        }
    }

    pub fn add_facet(&mut self, facet: Box<dyn SignatureFacet + 'a>) {
        self.facets.push(facet);
    }

    pub fn with_facet(mut self, facet: Box<dyn SignatureFacet + 'a>) -> Self {
        self.add_facet(facet);
        self
    }

    pub fn digest(&self) -> DigestAlgo {
        self.digest
    }

    pub fn facet_names(&self) -> Vec<&'static str> {
        self.facets.iter().map(|f| f.name()).collect()
    }

    /// Build the signature and append it to the document element of `host`.
    /// Without a host the signature is the document.
    pub fn pre_sign(
        &self,
        chain: &[Vec<u8>],
        source: &dyn DocumentSource,
        host: Option<&str>,
    ) -> Result<PendingSignature> {
        self.pre_sign_at(chain, source, host, Utc::now())
    }

    /// [`pre_sign`](Self::pre_sign) with a fixed claimed signing time.
    pub fn pre_sign_at(
        &self,
        chain: &[Vec<u8>],
        source: &dyn DocumentSource,
        host: Option<&str>,
        signing_time: DateTime<Utc>,
    ) -> Result<PendingSignature> {
        crate::facet::require_chain(chain)?;
        let signature_id = new_signature_id();
        let mut ctx = SignatureContext::new(signature_id.clone(), chain, self.digest, source)
            .with_signing_time(signing_time);
        for facet in &self.facets {
            log::debug!("pre-sign facet {}", facet.name());
            facet.pre_sign(&mut ctx)?;
        }

        let signature = self.render(ctx)?;
        let document = match host {
            Some(host) => {
                let doc = dss_xml::parse(host)?;
                let mut splicer = Splicer::new(host);
                splicer.append_child(&doc.root_element(), &signature)?;
                splicer.finish()?
            }
            None => signature,
        };

        let document = digest_references(&document, &signature_id)?;
        let digest_value = signed_info_digest(&document, &signature_id, self.digest)?;
        Ok(PendingSignature {
            document,
            signature_id,
            digest_info: DigestInfo {
                digest_algorithm: self.digest,
                digest_value,
            },
        })
    }

    /// Insert `signature_value` and run the facets' post-sign step.
    pub fn post_sign(
        &self,
        pending: PendingSignature,
        signature_value: &[u8],
        chain: &[Vec<u8>],
    ) -> Result<String> {
        crate::facet::require_chain(chain)?;
        let document = {
            let doc = dss_xml::parse(&pending.document)?;
            let signature = find_signature(&doc, &pending.signature_id)?;
            let value = child_element(signature, ns::DSIG, ns::node::SIGNATURE_VALUE)
                .ok_or_else(|| Error::MissingElement("SignatureValue".into()))?;
            let mut splicer = Splicer::new(&pending.document);
            let r = value.range();
            splicer.replace(
                r.start,
                r.end,
                format!(
                    r#"<ds:SignatureValue Id="{}-signature-value">{}</ds:SignatureValue>"#,
                    pending.signature_id,
                    B64.encode(signature_value)
                ),
            );
            splicer.finish()?
        };

        let mut ctx = PostSignContext::new(document, &pending.signature_id, chain);
        for facet in &self.facets {
            log::debug!("post-sign facet {}", facet.name());
            facet.post_sign(&mut ctx)?;
        }
        Ok(ctx.into_document())
    }

    fn render(&self, ctx: SignatureContext<'_>) -> Result<String> {
        let signer = dss_keys::cert::parse_certificate(ctx.signer_certificate()?)?;
        let key = dss_keys::cert::public_key(&signer)?;
        let signature_method = dss_crypto::sign::signature_uri(&key, self.digest)?;
        let signature_id = ctx.signature_id().to_owned();
        let (references, objects, key_info) = ctx.into_parts();
        if references.is_empty() {
            return Err(Error::Precondition("no facet contributed a reference".into()));
        }

        let mut w = XmlWriter::new();
        w.start_element(
            "ds:Signature",
            &[("xmlns:ds", ns::DSIG), ("Id", &signature_id)],
        );
        w.start_element("ds:SignedInfo", &[]);
        w.empty_element("ds:CanonicalizationMethod", &[("Algorithm", algorithm::EXC_C14N)]);
        w.empty_element("ds:SignatureMethod", &[("Algorithm", signature_method)]);
        for reference in &references {
            reference.write(&mut w);
        }
        w.end_element("ds:SignedInfo");
        w.text_element(
            "ds:SignatureValue",
            &[("Id", &format!("{signature_id}-signature-value"))],
            "",
        );
        if let Some(key_info) = key_info {
            w.write_raw(&key_info);
        }
        for object in &objects {
            match &object.id {
                Some(id) => w.start_element("ds:Object", &[("Id", id)]),
                None => w.start_element("ds:Object", &[]),
            }
            w.write_raw(&object.content);
            w.end_element("ds:Object");
        }
        w.end_element("ds:Signature");
        Ok(w.into_string())
    }
}

/// `xmldsig-` followed by 128 random bits in hex.
pub fn new_signature_id() -> String {
    let bytes: [u8; 16] = rand::random();
    format!("xmldsig-{}", hex::encode(bytes))
}

/// The `ds:Signature` element with `Id` equal to `id`.
pub fn find_signature<'a, 'input>(
    doc: &'a roxmltree::Document<'input>,
    id: &str,
) -> Result<roxmltree::Node<'a, 'input>> {
    doc.descendants()
        .find(|n| is_element(n, ns::DSIG, ns::node::SIGNATURE) && n.attribute(ns::attr::ID) == Some(id))
        .ok_or_else(|| Error::MissingElement(format!("Signature {id}")))
}

/// Fill the empty digest values of the signature's same-document references.
fn digest_references(document: &str, signature_id: &str) -> Result<String> {
    let doc = dss_xml::parse(document)?;
    let signature = find_signature(&doc, signature_id)?;
    let signed_info = child_element(signature, ns::DSIG, ns::node::SIGNED_INFO)
        .ok_or_else(|| Error::MissingElement("SignedInfo".into()))?;
    let mut splicer = Splicer::new(document);
    for reference in child_elements(signed_info, ns::DSIG, ns::node::REFERENCE) {
        let value = child_element(reference, ns::DSIG, ns::node::DIGEST_VALUE)
            .ok_or_else(|| Error::MissingElement("DigestValue".into()))?;
        if !dss_xml::document::element_text(value).is_empty() {
            continue;
        }
        let uri = reference.attribute(ns::attr::URI).unwrap_or("");
        let method = child_element(reference, ns::DSIG, ns::node::DIGEST_METHOD)
            .and_then(|m| m.attribute(ns::attr::ALGORITHM))
            .ok_or_else(|| Error::MissingElement("DigestMethod".into()))?;
        let digest = DigestAlgo::from_xml_uri(method)?;
        let data = dss_transforms::uri::resolve_same_document(uri, document)?;
        let pipeline = dss_transforms::build_pipeline(
            child_element(reference, ns::DSIG, ns::node::TRANSFORMS),
            signature,
        )?;
        let octets = pipeline.execute(data)?.to_binary()?;
        log::debug!("reference {uri:?}: {} octets digested", octets.len());
        let r = value.range();
        splicer.replace(
            r.start,
            r.end,
            format!(
                "<ds:DigestValue>{}</ds:DigestValue>",
                B64.encode(digest.digest(&octets))
            ),
        );
    }
    splicer.finish()
}

fn signed_info_digest(document: &str, signature_id: &str, digest: DigestAlgo) -> Result<Vec<u8>> {
    let doc = dss_xml::parse(document)?;
    let signature = find_signature(&doc, signature_id)?;
    let signed_info = child_element(signature, ns::DSIG, ns::node::SIGNED_INFO)
        .ok_or_else(|| Error::MissingElement("SignedInfo".into()))?;
    let octets = dss_c14n::canonicalize_node(signed_info, C14nMode::Exclusive, &[])?;
    Ok(digest.digest(&octets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facet::{ReferenceSpec, TransformSpec};
    use crate::source::NoSource;
    use dss_crypto::sign::{self, SignatureFormat};
    use dss_keys::testing::pki;

    struct WholeDocument;

    impl SignatureFacet for WholeDocument {
        fn name(&self) -> &'static str {
            "whole-document"
        }

        fn pre_sign(&self, ctx: &mut SignatureContext<'_>) -> Result<()> {
            let reference = ReferenceSpec::same_document("", ctx.digest())
                .with_transform(TransformSpec::SignatureExclusion)
                .with_transform(TransformSpec::C14n(C14nMode::Exclusive));
            ctx.add_reference(reference);
            Ok(())
        }
    }

    #[test]
    fn two_phase_signing() {
        let pki = pki();
        let chain = pki.signer.chain();
        let builder = SignatureBuilder::new(DigestAlgo::Sha256).with_facet(Box::new(WholeDocument));
        let pending = builder
            .pre_sign(chain, &NoSource, Some("<doc><p>hello</p></doc>"))
            .unwrap();
        assert!(pending.signature_id.starts_with("xmldsig-"));
        assert_eq!(pending.digest_info.digest_value.len(), 32);

        let expected = DigestAlgo::Sha256.digest(b"<doc><p>hello</p></doc>");
        assert!(pending.document.contains(&B64.encode(expected)));

        let value = sign::sign_prehash(
            pki.signer.key(),
            DigestAlgo::Sha256,
            &pending.digest_info.digest_value,
            SignatureFormat::XmlDsig,
        )
        .unwrap();
        let signed = builder.post_sign(pending, &value, chain).unwrap();
        assert!(signed.starts_with("<doc><p>hello</p><ds:Signature"));
        assert!(signed.contains(&B64.encode(&value)));
    }

    #[test]
    fn empty_chain_is_precondition() {
        let builder = SignatureBuilder::new(DigestAlgo::Sha256).with_facet(Box::new(WholeDocument));
        let err = builder.pre_sign(&[], &NoSource, Some("<doc/>")).unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }

    #[test]
    fn signature_without_references_is_rejected() {
        let builder = SignatureBuilder::new(DigestAlgo::Sha256);
        let err = builder
            .pre_sign(pki().signer.chain(), &NoSource, Some("<doc/>"))
            .unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }

    #[test]
    fn signature_ids_are_unique() {
        assert_ne!(new_signature_id(), new_signature_id());
    }
}
