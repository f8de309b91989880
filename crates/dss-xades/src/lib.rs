#![forbid(unsafe_code)]

//! XML-DSig and XAdES-X-L signatures for the eID DSS engine.
//!
//! Signatures are assembled by an ordered chain of [`SignatureFacet`]s
//! driven by a [`SignatureBuilder`] in two phases: `pre_sign` produces the
//! digest for an external [`Signer`], `post_sign` inserts the signature
//! value and lets the facets add long-term validation data. Validation is
//! split into XML-DSig core validation ([`verify`]) and the XAdES rules
//! ([`validation`]). Trust decisions are delegated to the capabilities in
//! [`spi`]; [`local`] has in-process implementations of them.

pub mod builder;
pub mod facet;
pub mod facets;
pub mod local;
pub mod source;
pub mod spi;
pub mod validation;
pub mod verify;

pub use builder::{PendingSignature, SignatureBuilder};
pub use facet::{PostSignContext, ReferenceSpec, SignatureContext, SignatureFacet, XmlObject};
pub use source::{DocumentSource, NoSource, ZipSource};
pub use spi::{
    DigestInfo, Identity, RevocationData, RevocationDataService, SignatureInfo, Signer,
    TimeStampResponse, TimestampService, TimestampValidator, TrustValidator,
};
pub use validation::{ValidatedSignature, XadesValidator};
pub use verify::{verify_signature, CoreValidation, UriDereferencer};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facets::{CoSignatureFacet, KeyInfoFacet, XadesFacet, XadesXlFacet};
    use crate::local::{
        LocalSigner, LocalTimestampService, LocalTimestampValidator, StaticRevocationSource,
        TrustStoreValidator,
    };
    use dss_core::config::DssConfig;
    use dss_core::Error;
    use dss_crypto::ocsp::CertStatus;
    use dss_crypto::DigestAlgo;
    use dss_keys::testing::{self, pki};
    use dss_keys::TrustStore;

    #[derive(Clone, Copy, Debug)]
    enum Kind {
        CoSignature,
        KeyInfo,
        Xades,
        XadesXl,
    }

    fn permutations(items: &[Kind]) -> Vec<Vec<Kind>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let first = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, first);
                out.push(tail);
            }
        }
        out
    }

    fn sign_and_verify(order: &[Kind]) -> dss_core::Result<SignatureInfo> {
        let pki = pki();
        let chain = pki.signer.chain();
        let evidence = RevocationData::new(
            vec![testing::ocsp(pki, &chain[0], CertStatus::Good)],
            vec![testing::crl(pki, &[])],
        );
        let tsa = LocalTimestampService::new(pki.tsa.clone(), RevocationData::default());
        let revocation = StaticRevocationSource::new(evidence);

        let mut builder = SignatureBuilder::new(DigestAlgo::Sha256);
        for kind in order {
            let facet: Box<dyn SignatureFacet + '_> = match kind {
                Kind::CoSignature => Box::new(CoSignatureFacet),
                Kind::KeyInfo => Box::new(KeyInfoFacet::default()),
                Kind::Xades => Box::new(XadesFacet::new(None, DigestAlgo::Sha256)?),
                Kind::XadesXl => Box::new(XadesXlFacet::new(&tsa, &revocation, DigestAlgo::Sha256)?),
            };
            builder.add_facet(facet);
        }
        let pending = builder.pre_sign(chain, &NoSource, Some("<invoice><total>12</total></invoice>"))?;
        let value = LocalSigner::new(pki.signer.clone()).sign(&[pending.digest_info.clone()], chain)?;
        let signed = builder.post_sign(pending, &value, chain)?;

        let mut anchors = TrustStore::new();
        anchors.add_anchor(pki.ca_cert.clone())?;
        let trust = TrustStoreValidator::new(anchors.clone(), true);
        let timestamps = LocalTimestampValidator::new(anchors);
        let validator = XadesValidator::new(&trust, &timestamps, DssConfig::default());
        let doc = dss_xml::parse(&signed)?;
        let signature = verify::find_signatures(&doc)
            .into_iter()
            .next()
            .ok_or_else(|| Error::MissingElement("Signature".into()))?;
        Ok(validator.validate(&signed, signature, &verify::SameDocumentOnly)?.info)
    }

    #[test]
    fn only_documented_facet_orders_verify() {
        let all = [Kind::CoSignature, Kind::KeyInfo, Kind::Xades, Kind::XadesXl];
        for order in permutations(&all) {
            let xades = order.iter().position(|k| matches!(k, Kind::Xades));
            let xl = order.iter().position(|k| matches!(k, Kind::XadesXl));
            let result = sign_and_verify(&order);
            if xades < xl {
                let info = result.unwrap_or_else(|e| panic!("{order:?}: {e}"));
                assert_eq!(info.signer, pki().signer.chain()[0]);
            } else {
                assert!(
                    matches!(result, Err(Error::Precondition(_))),
                    "{order:?}: {result:?}"
                );
            }
        }
    }
}
