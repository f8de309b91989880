#![forbid(unsafe_code)]

//! XAdES-X-L validation on top of XML-DSig core validation.
//!
//! After the references and the signature value check out, the qualifying
//! properties are read: the claimed signing time, the signing certificate
//! digest and the claimed role. Embedded time-stamps are matched against
//! the nodes they cover and handed to the [`TimestampValidator`]; the
//! embedded chain and revocation values go to the [`TrustValidator`] at the
//! time-stamp instant.

use chrono::{DateTime, Duration, Utc};
use dss_c14n::TimeStampDigestInput;
use dss_core::config::DssConfig;
use dss_core::{algorithm, ns, Error, Result};
use dss_crypto::tsp::TimeStampToken;
use dss_xml::document::{child_element, child_elements, descend, element_text};

use crate::facet::decode_base64;
use crate::facets::identity::find_identity;
use crate::facets::xades::{digest_matches, find_qualifying_properties, parse_xml_datetime};
use crate::spi::{RevocationData, SignatureInfo, TimestampValidator, TrustValidator};
use crate::verify::{verify_signature, CoreValidation, UriDereferencer};

/// A signature that passed both core and XAdES validation.
#[derive(Debug, Clone)]
pub struct ValidatedSignature {
    pub info: SignatureInfo,
    pub core: CoreValidation,
}

/// Validates XAdES-X-L signatures with host supplied trust decisions.
pub struct XadesValidator<'a> {
    trust: &'a dyn TrustValidator,
    timestamps: &'a dyn TimestampValidator,
    config: DssConfig,
}

impl<'a> XadesValidator<'a> {
    pub fn new(
        trust: &'a dyn TrustValidator,
        timestamps: &'a dyn TimestampValidator,
        config: DssConfig,
    ) -> Self {
        Self {
            trust,
            timestamps,
            config,
        }
    }

    pub fn config(&self) -> &DssConfig {
        &self.config
    }

    pub fn validate(
        &self,
        document: &str,
        signature: roxmltree::Node<'_, '_>,
        dereferencer: &dyn UriDereferencer,
    ) -> Result<ValidatedSignature> {
        self.validate_at(document, signature, dereferencer, Utc::now())
    }

    /// [`validate`](Self::validate) with `now` as the current time.
    pub fn validate_at(
        &self,
        document: &str,
        signature: roxmltree::Node<'_, '_>,
        dereferencer: &dyn UriDereferencer,
        now: DateTime<Utc>,
    ) -> Result<ValidatedSignature> {
        let core = verify_signature(document, signature, dereferencer)?;
        let signer = core.signer().to_vec();

        let properties_uri = core
            .references
            .iter()
            .find(|r| !r.in_manifest && r.type_.as_deref() == Some(algorithm::XADES_SIGNED_PROPERTIES_TYPE))
            .map(|r| r.uri.clone())
            .ok_or_else(|| Error::MissingElement("SignedProperties reference".into()))?;
        let properties_id = properties_uri
            .strip_prefix('#')
            .ok_or_else(|| Error::InvalidUri(properties_uri.clone()))?;
        let qp = find_qualifying_properties(signature, properties_id)
            .ok_or_else(|| Error::MissingElement("QualifyingProperties".into()))?;
        let signed = descend(
            qp,
            ns::XADES,
            &[ns::node::SIGNED_PROPERTIES, ns::node::SIGNED_SIGNATURE_PROPERTIES],
        )
        .ok_or_else(|| Error::MissingElement("SignedSignatureProperties".into()))?;

        let signing_time = child_element(signed, ns::XADES, ns::node::SIGNING_TIME)
            .map(element_text)
            .ok_or_else(|| Error::MissingElement("SigningTime".into()))?;
        let signing_time = parse_xml_datetime(&signing_time)?;
        check_signing_certificate(signed, &signer)?;
        let role = descend(
            signed,
            ns::XADES,
            &[ns::node::SIGNER_ROLE, ns::node::CLAIMED_ROLES, ns::node::CLAIMED_ROLE],
        )
        .map(element_text);

        let unsigned = descend(
            qp,
            ns::XADES,
            &[ns::node::UNSIGNED_PROPERTIES, ns::node::UNSIGNED_SIGNATURE_PROPERTIES],
        );
        let (chain, evidence) = match unsigned {
            Some(unsigned) => (
                embedded_chain(unsigned, &signer, &core)?,
                embedded_revocation(unsigned)?,
            ),
            None => (core.key_info_chain.clone(), RevocationData::default()),
        };

        let mut validation_time = now;
        if let Some(unsigned) = unsigned {
            let timestamps = self.check_timestamps(signature, unsigned, signing_time, &evidence, now)?;
            if let Some(ts_time) = timestamps {
                validation_time = ts_time;
            }
        }

        self.trust.validate(
            &chain,
            validation_time,
            &evidence.ocsp_responses,
            &evidence.crls,
        )?;

        let identity = find_identity(signature)?;
        log::debug!("signature by {} validated at {validation_time}", subject(&signer));
        Ok(ValidatedSignature {
            info: SignatureInfo {
                signer,
                signing_time,
                role,
                identity,
            },
            core,
        })
    }

    /// Validate the embedded time-stamps and return the time of the
    /// signature time-stamp, if there is one.
    fn check_timestamps<'n, 'i>(
        &self,
        signature: roxmltree::Node<'n, 'i>,
        unsigned: roxmltree::Node<'n, 'i>,
        signing_time: DateTime<Utc>,
        evidence: &RevocationData,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        let grace = millis(self.config.max_grace_period_ms());
        let past_grace = now - signing_time > grace;
        let signature_value = child_element(signature, ns::DSIG, ns::node::SIGNATURE_VALUE);

        let mut ts_time = None;
        for ts in child_elements(unsigned, ns::XADES, ns::node::SIGNATURE_TIME_STAMP) {
            let token = self.check_timestamp(ts, &[signature_value], evidence, past_grace)?;
            let at = token.gen_time();
            let offset = (at - signing_time).num_milliseconds().unsigned_abs();
            if offset > self.config.timestamp_max_offset_ms {
                return Err(Error::Timestamp(format!(
                    "time-stamp {at} is {offset} ms away from the signing time {signing_time}"
                )));
            }
            ts_time.get_or_insert(at);
        }

        let covered = [
            signature_value,
            child_element(unsigned, ns::XADES, ns::node::SIGNATURE_TIME_STAMP),
            child_element(unsigned, ns::XADES, ns::node::COMPLETE_CERTIFICATE_REFS),
            child_element(unsigned, ns::XADES, ns::node::COMPLETE_REVOCATION_REFS),
        ];
        for ts in child_elements(unsigned, ns::XADES, ns::node::SIG_AND_REFS_TIME_STAMP) {
            self.check_timestamp(ts, &covered, evidence, past_grace)?;
        }
        Ok(ts_time)
    }

    fn check_timestamp<'n, 'i>(
        &self,
        timestamp: roxmltree::Node<'n, 'i>,
        covered: &[Option<roxmltree::Node<'n, 'i>>],
        evidence: &RevocationData,
        past_grace: bool,
    ) -> Result<TimeStampToken> {
        let c14n = child_element(timestamp, ns::DSIG, ns::node::CANONICALIZATION_METHOD)
            .and_then(|c| c.attribute(ns::attr::ALGORITHM))
            .unwrap_or(algorithm::EXC_C14N);
        let mut input = TimeStampDigestInput::new(c14n)?;
        for node in covered {
            input.add_node(*node)?;
        }
        let data = input.compute_bytes()?;

        let der = child_element(timestamp, ns::XADES, ns::node::ENCAPSULATED_TIME_STAMP)
            .map(element_text)
            .ok_or_else(|| Error::MissingElement("EncapsulatedTimeStamp".into()))?;
        let der = decode_base64(&der)?;
        let token = TimeStampToken::from_der(&der)?;
        token.check_imprint(&data)?;
        if past_grace {
            self.timestamps
                .validate_with_evidence(&der, evidence, token.gen_time())?;
        } else {
            self.timestamps.validate(&der)?;
        }
        Ok(token)
    }
}

fn millis(ms: u64) -> Duration {
    Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
}

fn subject(der: &[u8]) -> String {
    dss_keys::cert::parse_certificate(der)
        .map(|c| dss_keys::cert::subject_name(&c))
        .unwrap_or_else(|_| "<unparseable certificate>".into())
}

/// The first `SigningCertificate/Cert` must identify `signer`.
fn check_signing_certificate(signed: roxmltree::Node<'_, '_>, signer: &[u8]) -> Result<()> {
    let cert = descend(
        signed,
        ns::XADES,
        &[ns::node::SIGNING_CERTIFICATE, ns::node::CERT],
    )
    .ok_or_else(|| Error::MissingElement("SigningCertificate/Cert".into()))?;
    let digest = child_element(cert, ns::XADES, ns::node::CERT_DIGEST)
        .ok_or_else(|| Error::MissingElement("CertDigest".into()))?;
    if !digest_matches(digest, signer)? {
        return Err(Error::Certificate("SigningCertificate digest does not match the signer".into()));
    }
    if let Some(serial) = child_element(cert, ns::XADES, ns::node::ISSUER_SERIAL)
        .and_then(|s| child_element(s, ns::DSIG, ns::node::X509_SERIAL_NUMBER))
    {
        let signer = dss_keys::cert::parse_certificate(signer)?;
        if element_text(serial).trim() != dss_keys::cert::serial_decimal(&signer) {
            return Err(Error::Certificate("SigningCertificate serial does not match the signer".into()));
        }
    }
    Ok(())
}

/// `CertificateValues`, which must start with the signer. Without them the
/// `KeyInfo` chain is used.
fn embedded_chain(
    unsigned: roxmltree::Node<'_, '_>,
    signer: &[u8],
    core: &CoreValidation,
) -> Result<Vec<Vec<u8>>> {
    let Some(values) = child_element(unsigned, ns::XADES, ns::node::CERTIFICATE_VALUES) else {
        return Ok(core.key_info_chain.clone());
    };
    let chain = child_elements(values, ns::XADES, ns::node::ENCAPSULATED_X509_CERTIFICATE)
        .map(|c| decode_base64(&element_text(c)))
        .collect::<Result<Vec<_>>>()?;
    match chain.first() {
        None => Err(Error::MissingElement("EncapsulatedX509Certificate".into())),
        Some(first) if first.as_slice() != signer => Err(Error::Certificate(
            "CertificateValues do not start with the signer".into(),
        )),
        Some(_) => Ok(chain),
    }
}

/// `RevocationValues`, each of which must be referenced from
/// `CompleteRevocationRefs`.
fn embedded_revocation(unsigned: roxmltree::Node<'_, '_>) -> Result<RevocationData> {
    let Some(values) = child_element(unsigned, ns::XADES, ns::node::REVOCATION_VALUES) else {
        return Ok(RevocationData::default());
    };
    let decode_all = |list: &'static str, item: &'static str| -> Result<Vec<Vec<u8>>> {
        child_elements(values, ns::XADES, list)
            .flat_map(|l| child_elements(l, ns::XADES, item))
            .map(|v| decode_base64(&element_text(v)))
            .collect()
    };
    let data = RevocationData::new(
        decode_all(ns::node::OCSP_VALUES, ns::node::ENCAPSULATED_OCSP_VALUE)?,
        decode_all(ns::node::CRL_VALUES, ns::node::ENCAPSULATED_CRL_VALUE)?,
    );
    if data.is_empty() {
        return Ok(data);
    }

    let refs = child_element(unsigned, ns::XADES, ns::node::COMPLETE_REVOCATION_REFS)
        .ok_or_else(|| Error::MissingElement("CompleteRevocationRefs".into()))?;
    let digests = |list: &'static str, item: &'static str| {
        child_elements(refs, ns::XADES, list)
            .flat_map(|l| child_elements(l, ns::XADES, item))
            .filter_map(|r| child_element(r, ns::XADES, ns::node::DIGEST_ALG_AND_VALUE))
            .collect::<Vec<_>>()
    };
    let ocsp_refs = digests(ns::node::OCSP_REFS, ns::node::OCSP_REF);
    let crl_refs = digests(ns::node::CRL_REFS, ns::node::CRL_REF);
    for (values, refs, kind) in [
        (&data.ocsp_responses, &ocsp_refs, "OCSP response"),
        (&data.crls, &crl_refs, "CRL"),
    ] {
        for value in values {
            if !is_referenced(refs, value)? {
                return Err(Error::Revocation(format!(
                    "embedded {kind} is not referenced from CompleteRevocationRefs"
                )));
            }
        }
    }
    Ok(data)
}

fn is_referenced(refs: &[roxmltree::Node<'_, '_>], value: &[u8]) -> Result<bool> {
    for r in refs {
        if digest_matches(*r, value)? {
            return Ok(true);
        }
    }
    Ok(false)
}
