#![forbid(unsafe_code)]

//! XAdES-X-L: time-stamps plus the complete validation data.
//!
//! Pre-sign reserves an empty `xades:UnsignedProperties` in the qualifying
//! properties written by [`XadesFacet`](super::XadesFacet), so this facet must
//! come after it. Post-sign time-stamps the signature value, collects
//! revocation data for the chain, writes the certificate and revocation
//! references, time-stamps those together with the signature value and
//! finally embeds the certificates and revocation values themselves. When
//! the second time-stamp brings revocation data of its own, the references
//! are extended and stamped again so every embedded value stays referenced.

use base64::Engine;
use der::Decode;
use dss_c14n::TimeStampDigestInput;
use dss_core::{algorithm, ns, Error, Result};
use dss_crypto::ocsp::{OcspResponse, ResponderId};
use dss_crypto::DigestAlgo;
use dss_keys::cert::Crl;
use dss_xml::document::{child_element, child_elements, descend};
use dss_xml::splice::Splicer;
use dss_xml::XmlWriter;

use super::xades::{check_xades_digest, write_cert_id, write_digest_alg_and_value, xml_datetime};
use crate::builder::find_signature;
use crate::facet::{require_chain, PostSignContext, SignatureContext, SignatureFacet, B64};
use crate::spi::{RevocationData, RevocationDataService, TimestampService};

const QUALIFYING_PROPERTIES_END: &str = "</xades:QualifyingProperties>";
const MAX_SIG_AND_REFS_ROUNDS: usize = 3;
const UNSIGNED_PLACEHOLDER: &str = "<xades:UnsignedProperties>\
<xades:UnsignedSignatureProperties></xades:UnsignedSignatureProperties>\
</xades:UnsignedProperties>";

pub struct XadesXlFacet<'a> {
    timestamp: &'a dyn TimestampService,
    revocation: &'a dyn RevocationDataService,
    digest: DigestAlgo,
}

impl<'a> XadesXlFacet<'a> {
    pub fn new(
        timestamp: &'a dyn TimestampService,
        revocation: &'a dyn RevocationDataService,
        digest: DigestAlgo,
    ) -> Result<Self> {
        check_xades_digest(digest)?;
        Ok(Self {
            timestamp,
            revocation,
            digest,
        })
    }
}

impl SignatureFacet for XadesXlFacet<'_> {
    fn name(&self) -> &'static str {
        "xades-x-l"
    }

    fn pre_sign(&self, ctx: &mut SignatureContext<'_>) -> Result<()> {
        let object = ctx
            .objects_mut()
            .iter_mut()
            .find(|o| {
                o.content.starts_with("<xades:QualifyingProperties")
                    && o.content.ends_with(QUALIFYING_PROPERTIES_END)
            })
            .ok_or_else(|| {
                Error::Precondition("XAdES-X-L requires the qualifying properties first".into())
            })?;
        if object.content.contains("<xades:UnsignedProperties>") {
            return Err(Error::Precondition("unsigned properties already present".into()));
        }
        let at = object.content.len() - QUALIFYING_PROPERTIES_END.len();
        object.content.insert_str(at, UNSIGNED_PLACEHOLDER);
        Ok(())
    }

    fn post_sign(&self, ctx: &mut PostSignContext<'_>) -> Result<()> {
        require_chain(ctx.chain())?;
        let chain = ctx.chain();
        let signature_id = ctx.signature_id().to_owned();

        let input = {
            let doc = dss_xml::parse(ctx.document())?;
            let signature = find_signature(&doc, &signature_id)?;
            let mut input = TimeStampDigestInput::new(algorithm::EXC_C14N)?;
            input.add_node(child_element(signature, ns::DSIG, ns::node::SIGNATURE_VALUE))?;
            input.compute_bytes()?
        };
        let signature_ts = self.timestamp.timestamp(&input, self.digest)?;
        let mut revocation = self.revocation.revocation_data(chain)?;
        revocation.merge(&signature_ts.revocation);
        log::debug!(
            "{signature_id}: {} OCSP responses, {} CRLs",
            revocation.ocsp_responses.len(),
            revocation.crls.len()
        );

        // The references are covered by the second time-stamp, so revocation
        // data it brings along forces another round over extended references.
        let mut round = 1;
        let (document, refs_ts) = loop {
            let fragment = references_fragment(
                &signature_id,
                &signature_ts.token,
                chain,
                &revocation,
                self.digest,
            )?;
            let document = append_unsigned(ctx.document(), &signature_id, &fragment)?;
            let input = sig_and_refs_input(&document, &signature_id)?;
            let refs_ts = self.timestamp.timestamp(&input, self.digest)?;

            let known = revocation.ocsp_responses.len() + revocation.crls.len();
            let mut merged = revocation.clone();
            merged.merge(&refs_ts.revocation);
            if merged.ocsp_responses.len() + merged.crls.len() == known {
                break (document, refs_ts);
            }
            if round == MAX_SIG_AND_REFS_ROUNDS {
                log::warn!("{signature_id}: revocation data of the last SigAndRefsTimeStamp is not embedded");
                break (document, refs_ts);
            }
            log::debug!("{signature_id}: SigAndRefsTimeStamp brought new revocation data, re-stamping");
            revocation = merged;
            round += 1;
        };

        let mut w = XmlWriter::new();
        write_timestamp(
            &mut w,
            ns::node::SIG_AND_REFS_TIME_STAMP,
            &format!("{signature_id}-sig-and-refs-timestamp"),
            &refs_ts.token,
        );
        w.start_element("xades:CertificateValues", &[]);
        for cert in chain {
            w.text_element("xades:EncapsulatedX509Certificate", &[], &B64.encode(cert));
        }
        w.end_element("xades:CertificateValues");
        w.start_element("xades:RevocationValues", &[]);
        if !revocation.crls.is_empty() {
            w.start_element("xades:CRLValues", &[]);
            for crl in &revocation.crls {
                w.text_element("xades:EncapsulatedCRLValue", &[], &B64.encode(crl));
            }
            w.end_element("xades:CRLValues");
        }
        if !revocation.ocsp_responses.is_empty() {
            w.start_element("xades:OCSPValues", &[]);
            for ocsp in &revocation.ocsp_responses {
                w.text_element("xades:EncapsulatedOCSPValue", &[], &B64.encode(ocsp));
            }
            w.end_element("xades:OCSPValues");
        }
        w.end_element("xades:RevocationValues");
        ctx.set_document(append_unsigned(&document, &signature_id, &w.into_string())?);
        Ok(())
    }
}

/// `SignatureTimeStamp`, `CompleteCertificateRefs` and `CompleteRevocationRefs`.
fn references_fragment(
    signature_id: &str,
    token: &[u8],
    chain: &[Vec<u8>],
    revocation: &RevocationData,
    digest: DigestAlgo,
) -> Result<String> {
    let mut w = XmlWriter::new();
    write_timestamp(
        &mut w,
        ns::node::SIGNATURE_TIME_STAMP,
        &format!("{signature_id}-signature-timestamp"),
        token,
    );
    w.start_element("xades:CompleteCertificateRefs", &[]);
    w.start_element("xades:CertRefs", &[]);
    for cert in chain.iter().skip(1) {
        write_cert_id(&mut w, cert, digest)?;
    }
    w.end_element("xades:CertRefs");
    w.end_element("xades:CompleteCertificateRefs");
    write_revocation_refs(&mut w, revocation, digest)?;
    Ok(w.into_string())
}

/// Canonical input of the `SigAndRefsTimeStamp`.
fn sig_and_refs_input(document: &str, signature_id: &str) -> Result<Vec<u8>> {
    let doc = dss_xml::parse(document)?;
    let signature = find_signature(&doc, signature_id)?;
    let unsigned = unsigned_signature_properties(signature, signature_id)?;
    let mut input = TimeStampDigestInput::new(algorithm::EXC_C14N)?;
    input.add_node(child_element(signature, ns::DSIG, ns::node::SIGNATURE_VALUE))?;
    for name in [
        ns::node::SIGNATURE_TIME_STAMP,
        ns::node::COMPLETE_CERTIFICATE_REFS,
        ns::node::COMPLETE_REVOCATION_REFS,
    ] {
        input.add_node(child_element(unsigned, ns::XADES, name))?;
    }
    input.compute_bytes()
}

fn write_timestamp(w: &mut XmlWriter, local_name: &str, id: &str, token: &[u8]) {
    let name = format!("xades:{local_name}");
    w.start_element(&name, &[("Id", id)]);
    w.empty_element("ds:CanonicalizationMethod", &[("Algorithm", algorithm::EXC_C14N)]);
    w.text_element("xades:EncapsulatedTimeStamp", &[], &B64.encode(token));
    w.end_element(&name);
}

fn write_revocation_refs(w: &mut XmlWriter, revocation: &RevocationData, digest: DigestAlgo) -> Result<()> {
    w.start_element("xades:CompleteRevocationRefs", &[]);
    if !revocation.crls.is_empty() {
        w.start_element("xades:CRLRefs", &[]);
        for der in &revocation.crls {
            let crl = Crl::from_der(der)?;
            w.start_element("xades:CRLRef", &[]);
            write_digest_alg_and_value(w, "xades:DigestAlgAndValue", digest, der);
            w.start_element("xades:CRLIdentifier", &[]);
            w.text_element("xades:Issuer", &[], &crl.issuer_name());
            w.text_element("xades:IssueTime", &[], &xml_datetime(&crl.this_update()?));
            w.end_element("xades:CRLIdentifier");
            w.end_element("xades:CRLRef");
        }
        w.end_element("xades:CRLRefs");
    }
    if !revocation.ocsp_responses.is_empty() {
        w.start_element("xades:OCSPRefs", &[]);
        for der in &revocation.ocsp_responses {
            let ocsp = OcspResponse::from_der(der)?;
            w.start_element("xades:OCSPRef", &[]);
            w.start_element("xades:OCSPIdentifier", &[]);
            w.start_element("xades:ResponderID", &[]);
            match ocsp.responder()? {
                ResponderId::ByName(name) => {
                    let name = x509_cert::name::Name::from_der(name)
                        .map_err(|e| Error::Revocation(format!("OCSP responder name: {e}")))?;
                    w.text_element("xades:ByName", &[], &name.to_string());
                }
                ResponderId::ByKey(hash) => w.text_element("xades:ByKey", &[], &B64.encode(hash)),
            }
            w.end_element("xades:ResponderID");
            w.text_element("xades:ProducedAt", &[], &xml_datetime(&ocsp.produced_at()?));
            w.end_element("xades:OCSPIdentifier");
            write_digest_alg_and_value(w, "xades:DigestAlgAndValue", digest, der);
            w.end_element("xades:OCSPRef");
        }
        w.end_element("xades:OCSPRefs");
    }
    w.end_element("xades:CompleteRevocationRefs");
    Ok(())
}

/// `UnsignedSignatureProperties` of the qualifying properties targeting the
/// signature.
fn unsigned_signature_properties<'a, 'input>(
    signature: roxmltree::Node<'a, 'input>,
    signature_id: &str,
) -> Result<roxmltree::Node<'a, 'input>> {
    let target = format!("#{signature_id}");
    child_elements(signature, ns::DSIG, ns::node::OBJECT)
        .flat_map(|o| child_elements(o, ns::XADES, ns::node::QUALIFYING_PROPERTIES))
        .find(|qp| qp.attribute(ns::attr::TARGET) == Some(target.as_str()))
        .and_then(|qp| {
            descend(
                qp,
                ns::XADES,
                &[ns::node::UNSIGNED_PROPERTIES, ns::node::UNSIGNED_SIGNATURE_PROPERTIES],
            )
        })
        .ok_or_else(|| Error::Precondition("no unsigned signature properties reserved".into()))
}

fn append_unsigned(document: &str, signature_id: &str, fragment: &str) -> Result<String> {
    let doc = dss_xml::parse(document)?;
    let signature = find_signature(&doc, signature_id)?;
    let unsigned = unsigned_signature_properties(signature, signature_id)?;
    let mut splicer = Splicer::new(document);
    splicer.append_child(&unsigned, fragment)?;
    splicer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facet::XmlObject;
    use crate::source::NoSource;
    use crate::spi::TimeStampResponse;
    use dss_keys::testing::{self, pki};
    use std::cell::Cell;

    struct NoTsa;

    impl TimestampService for NoTsa {
        fn timestamp(&self, _data: &[u8], _digest: DigestAlgo) -> Result<TimeStampResponse> {
            Err(Error::Timestamp("offline".into()))
        }
    }

    struct NoRevocation;

    impl RevocationDataService for NoRevocation {
        fn revocation_data(&self, _chain: &[Vec<u8>]) -> Result<RevocationData> {
            Ok(RevocationData::default())
        }
    }

    #[test]
    fn requires_qualifying_properties() {
        let facet = XadesXlFacet::new(&NoTsa, &NoRevocation, DigestAlgo::Sha256).unwrap();
        let chain = vec![vec![1u8]];
        let mut ctx = SignatureContext::new("s", &chain, DigestAlgo::Sha256, &NoSource);
        assert!(matches!(facet.pre_sign(&mut ctx), Err(Error::Precondition(_))));

        ctx.add_object(XmlObject {
            id: None,
            content: format!(
                r##"<xades:QualifyingProperties xmlns:xades="{}" Target="#s"><xades:SignedProperties Id="s-xades"/>{QUALIFYING_PROPERTIES_END}"##,
                ns::XADES
            ),
        });
        facet.pre_sign(&mut ctx).unwrap();
        assert!(ctx.objects()[0]
            .content
            .ends_with(&format!("{UNSIGNED_PLACEHOLDER}{QUALIFYING_PROPERTIES_END}")));
        // a second X-L pass would reserve twice
        assert!(facet.pre_sign(&mut ctx).is_err());
    }

    #[test]
    fn timestamp_failure_is_fatal() {
        let facet = XadesXlFacet::new(&NoTsa, &NoRevocation, DigestAlgo::Sha256).unwrap();
        let doc = format!(
            r#"<ds:Signature xmlns:ds="{}" Id="s"><ds:SignatureValue>AA==</ds:SignatureValue></ds:Signature>"#,
            ns::DSIG
        );
        let chain = vec![vec![1u8]];
        let mut ctx = PostSignContext::new(doc, "s", &chain);
        assert!(matches!(facet.post_sign(&mut ctx), Err(Error::Timestamp(_))));
    }

    /// Hands out `revocation` with every token after the first.
    struct LateRevocationTsa {
        calls: Cell<usize>,
        revocation: RevocationData,
    }

    impl TimestampService for LateRevocationTsa {
        fn timestamp(&self, _data: &[u8], _digest: DigestAlgo) -> Result<TimeStampResponse> {
            let call = self.calls.get();
            self.calls.set(call + 1);
            Ok(TimeStampResponse {
                token: vec![0x30, call as u8],
                revocation: if call == 0 {
                    RevocationData::default()
                } else {
                    self.revocation.clone()
                },
            })
        }
    }

    fn reserved_signature() -> String {
        format!(
            r##"<ds:Signature xmlns:ds="{}" Id="s"><ds:SignatureValue>AA==</ds:SignatureValue><ds:Object><xades:QualifyingProperties xmlns:xades="{}" Target="#s">{UNSIGNED_PLACEHOLDER}</xades:QualifyingProperties></ds:Object></ds:Signature>"##,
            ns::DSIG,
            ns::XADES
        )
    }

    #[test]
    fn sig_and_refs_revocation_is_referenced_and_embedded() {
        let crl = testing::crl(pki(), &[]);
        let tsa = LateRevocationTsa {
            calls: Cell::new(0),
            revocation: RevocationData::new(Vec::new(), vec![crl.clone()]),
        };
        let facet = XadesXlFacet::new(&tsa, &NoRevocation, DigestAlgo::Sha256).unwrap();
        let chain = vec![pki().signer.signer_certificate().to_vec()];
        let mut ctx = PostSignContext::new(reserved_signature(), "s", &chain);
        facet.post_sign(&mut ctx).unwrap();
        // signature stamp, then the references twice
        assert_eq!(tsa.calls.get(), 3);

        let doc = dss_xml::parse(ctx.document()).unwrap();
        let count = |name: &str| {
            doc.descendants()
                .filter(|n| n.has_tag_name((ns::XADES, name)))
                .count()
        };
        assert_eq!(count(ns::node::SIG_AND_REFS_TIME_STAMP), 1);
        assert_eq!(count(ns::node::CRL_REF), 1);
        let value = doc
            .descendants()
            .find(|n| n.has_tag_name((ns::XADES, ns::node::ENCAPSULATED_CRL_VALUE)))
            .and_then(|n| n.text())
            .unwrap();
        assert_eq!(B64.decode(value).unwrap(), crl);
    }

    #[test]
    fn no_new_revocation_data_stamps_references_once() {
        let tsa = LateRevocationTsa {
            calls: Cell::new(0),
            revocation: RevocationData::default(),
        };
        let facet = XadesXlFacet::new(&tsa, &NoRevocation, DigestAlgo::Sha256).unwrap();
        let chain = vec![pki().signer.signer_certificate().to_vec()];
        let mut ctx = PostSignContext::new(reserved_signature(), "s", &chain);
        facet.post_sign(&mut ctx).unwrap();
        assert_eq!(tsa.calls.get(), 2);
        assert!(!ctx.document().contains("CRLRef"));
    }
}
