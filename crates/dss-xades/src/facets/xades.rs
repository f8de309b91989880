#![forbid(unsafe_code)]

//! XAdES-BES qualifying properties: signing time, signing certificate and
//! the claimed role.

use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use dss_c14n::C14nMode;
use dss_core::{algorithm, ns, Error, Result};
use dss_crypto::DigestAlgo;
use dss_xml::document::{child_elements, is_element};
use dss_xml::XmlWriter;

use crate::facet::{
    decode_base64, ReferenceSpec, SignatureContext, SignatureFacet, TransformSpec, XmlObject, B64,
};

/// Digests allowed in XAdES certificate and revocation references.
pub const XADES_DIGESTS: [DigestAlgo; 3] = [DigestAlgo::Sha1, DigestAlgo::Sha256, DigestAlgo::Sha512];

pub struct XadesFacet {
    role: Option<String>,
    cert_digest: DigestAlgo,
}

impl XadesFacet {
    pub fn new(role: Option<String>, cert_digest: DigestAlgo) -> Result<Self> {
        check_xades_digest(cert_digest)?;
        Ok(Self {
            role: role.filter(|r| !r.is_empty()),
            cert_digest,
        })
    }
}

impl SignatureFacet for XadesFacet {
    fn name(&self) -> &'static str {
        "xades"
    }

    fn pre_sign(&self, ctx: &mut SignatureContext<'_>) -> Result<()> {
        let signer = ctx.signer_certificate()?;
        let signature_id = ctx.signature_id().to_owned();
        let properties_id = format!("{signature_id}-xades");

        let mut w = XmlWriter::new();
        w.start_element(
            "xades:QualifyingProperties",
            &[("xmlns:xades", ns::XADES), ("Target", &format!("#{signature_id}"))],
        );
        w.start_element("xades:SignedProperties", &[("Id", &properties_id)]);
        w.start_element("xades:SignedSignatureProperties", &[]);
        w.text_element("xades:SigningTime", &[], &xml_datetime(&ctx.signing_time()));
        w.start_element("xades:SigningCertificate", &[]);
        write_cert_id(&mut w, signer, self.cert_digest)?;
        w.end_element("xades:SigningCertificate");
        if let Some(role) = &self.role {
            w.start_element("xades:SignerRole", &[]);
            w.start_element("xades:ClaimedRoles", &[]);
            w.text_element("xades:ClaimedRole", &[], role);
            w.end_element("xades:ClaimedRoles");
            w.end_element("xades:SignerRole");
        }
        w.end_element("xades:SignedSignatureProperties");
        w.end_element("xades:SignedProperties");
        w.end_element("xades:QualifyingProperties");

        ctx.add_object(XmlObject {
            id: None,
            content: w.into_string(),
        });
        ctx.add_reference(
            ReferenceSpec::same_document(format!("#{properties_id}"), ctx.digest())
                .with_type(algorithm::XADES_SIGNED_PROPERTIES_TYPE)
                .with_transform(TransformSpec::C14n(C14nMode::Exclusive)),
        );
        Ok(())
    }
}

// ── Shared XAdES helpers ─────────────────────────────────────────────

pub fn check_xades_digest(digest: DigestAlgo) -> Result<()> {
    if XADES_DIGESTS.contains(&digest) {
        Ok(())
    } else {
        Err(Error::UnsupportedAlgorithm(format!("XAdES digest {digest}")))
    }
}

/// `xs:dateTime` in UTC with millisecond precision.
pub fn xml_datetime(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_xml_datetime(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::XmlStructure(format!("invalid dateTime {s:?}: {e}")))
}

/// `<xades:Cert>` with the digest and issuer/serial of `cert_der`.
pub(crate) fn write_cert_id(w: &mut XmlWriter, cert_der: &[u8], digest: DigestAlgo) -> Result<()> {
    let cert = dss_keys::cert::parse_certificate(cert_der)?;
    w.start_element("xades:Cert", &[]);
    write_digest_alg_and_value(w, "xades:CertDigest", digest, cert_der);
    w.start_element("xades:IssuerSerial", &[]);
    w.text_element("ds:X509IssuerName", &[], &dss_keys::cert::issuer_name(&cert));
    w.text_element("ds:X509SerialNumber", &[], &dss_keys::cert::serial_decimal(&cert));
    w.end_element("xades:IssuerSerial");
    w.end_element("xades:Cert");
    Ok(())
}

/// `<element><ds:DigestMethod/><ds:DigestValue/></element>` over `data`.
pub(crate) fn write_digest_alg_and_value(
    w: &mut XmlWriter,
    element: &str,
    digest: DigestAlgo,
    data: &[u8],
) {
    w.start_element(element, &[]);
    w.empty_element("ds:DigestMethod", &[("Algorithm", digest.xml_uri())]);
    w.text_element("ds:DigestValue", &[], &B64.encode(digest.digest(data)));
    w.end_element(element);
}

/// Whether a `DigestMethod`/`DigestValue` pair under `node` matches `data`.
pub(crate) fn digest_matches(node: roxmltree::Node<'_, '_>, data: &[u8]) -> Result<bool> {
    let method = dss_xml::document::child_element(node, ns::DSIG, ns::node::DIGEST_METHOD)
        .and_then(|m| m.attribute(ns::attr::ALGORITHM))
        .ok_or_else(|| Error::MissingElement("DigestMethod".into()))?;
    let digest = DigestAlgo::from_xml_uri(method)?;
    check_xades_digest(digest)?;
    let value = dss_xml::document::child_element(node, ns::DSIG, ns::node::DIGEST_VALUE)
        .map(dss_xml::document::element_text)
        .ok_or_else(|| Error::MissingElement("DigestValue".into()))?;
    Ok(decode_base64(&value)? == digest.digest(data))
}

/// The `xades:QualifyingProperties` of the signature `signature` that
/// contains `SignedProperties` with `Id` equal to `properties_id`.
pub fn find_qualifying_properties<'a, 'input>(
    signature: roxmltree::Node<'a, 'input>,
    properties_id: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    child_elements(signature, ns::DSIG, ns::node::OBJECT)
        .flat_map(|o| child_elements(o, ns::XADES, ns::node::QUALIFYING_PROPERTIES))
        .find(|qp| {
            qp.children().any(|c| {
                is_element(&c, ns::XADES, ns::node::SIGNED_PROPERTIES)
                    && c.attribute(ns::attr::ID) == Some(properties_id)
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::NoSource;
    use chrono::TimeZone;
    use dss_keys::testing::pki;

    #[test]
    fn builds_signed_properties() {
        let chain = pki().signer.chain();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut ctx = SignatureContext::new("sig", chain, DigestAlgo::Sha256, &NoSource)
            .with_signing_time(at);
        XadesFacet::new(Some("CEO".into()), DigestAlgo::Sha1)
            .unwrap()
            .pre_sign(&mut ctx)
            .unwrap();

        let r = &ctx.references()[0];
        assert_eq!(r.uri, "#sig-xades");
        assert_eq!(r.type_.as_deref(), Some(algorithm::XADES_SIGNED_PROPERTIES_TYPE));

        let content = &ctx.objects()[0].content;
        assert!(content.contains("<xades:SigningTime>2024-05-01T12:00:00.000Z</xades:SigningTime>"));
        assert!(content.contains("<xades:ClaimedRole>CEO</xades:ClaimedRole>"));
        assert!(content.contains("<ds:X509SerialNumber>4097</ds:X509SerialNumber>"));
        assert!(content.contains(&B64.encode(DigestAlgo::Sha1.digest(&chain[0]))));
    }

    #[test]
    fn rejects_sha224_certificate_digest() {
        assert!(matches!(
            XadesFacet::new(None, DigestAlgo::Sha224),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn datetime_round_trip() {
        let at = Utc.with_ymd_and_hms(2011, 2, 3, 4, 5, 6).unwrap();
        assert_eq!(parse_xml_datetime(&xml_datetime(&at)).unwrap(), at);
        assert_eq!(
            parse_xml_datetime("2011-02-03T05:05:06+01:00").unwrap(),
            at
        );
        assert!(parse_xml_datetime("yesterday").is_err());
    }
}
