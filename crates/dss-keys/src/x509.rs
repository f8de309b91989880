#![forbid(unsafe_code)]

//! X.509 certificate chain validation at a given instant.
//!
//! Walks the chain leaf first, checking validity periods and issuer
//! signatures until a trust anchor is reached. Each non-anchor certificate
//! is checked against the supplied OCSP responses and CRLs.

use chrono::{DateTime, Utc};
use dss_core::{Error, Result};
use dss_crypto::ocsp::{CertId, CertStatus, OcspResponse, ResponseStatus};
use dss_crypto::DigestAlgo;
use x509_cert::Certificate;

use crate::cert::{self, Crl};

/// Inputs of a chain validation.
pub struct ValidationContext<'a> {
    /// Trusted DER certificates.
    pub anchors: &'a [Vec<u8>],
    /// Validation instant.
    pub at: DateTime<Utc>,
    /// DER OCSP responses.
    pub ocsp_responses: &'a [Vec<u8>],
    /// DER CRLs.
    pub crls: &'a [Vec<u8>],
    /// Fail when no OCSP response or CRL covers a non-anchor certificate.
    pub require_revocation: bool,
}

/// Revocation coverage of a single certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationStatus {
    /// Covered by evidence and not revoked at the instant.
    Good,
    /// No evidence mentions the certificate.
    NotCovered,
}

/// Validate `chain` (DER, leaf first) against the context.
pub fn validate_chain(chain: &[Vec<u8>], ctx: &ValidationContext<'_>) -> Result<()> {
    if chain.is_empty() {
        return Err(Error::Trust("empty certificate chain".into()));
    }
    let certs = chain
        .iter()
        .map(|d| cert::parse_certificate(d))
        .collect::<Result<Vec<_>>>()?;
    // Unparseable anchors are skipped
    let anchors: Vec<(Certificate, &Vec<u8>)> = ctx
        .anchors
        .iter()
        .filter_map(|d| cert::parse_certificate(d).ok().map(|c| (c, d)))
        .collect();
    if anchors.is_empty() {
        return Err(Error::Trust("no trusted certificates available".into()));
    }

    for (i, current) in certs.iter().enumerate() {
        cert::check_validity(current, ctx.at)?;

        if anchors.iter().any(|(_, der)| **der == chain[i]) {
            log::debug!("chain reaches trust anchor {}", cert::subject_name(current));
            return Ok(());
        }

        if let Some((anchor, _)) = anchors
            .iter()
            .find(|(a, _)| cert::verify_issued_by(current, a).is_ok())
        {
            cert::check_validity(anchor, ctx.at)?;
            check_revocation(current, anchor, ctx)?;
            log::debug!(
                "{} issued by trust anchor {}",
                cert::subject_name(current),
                cert::subject_name(anchor)
            );
            return Ok(());
        }

        let issuer = certs.get(i + 1).ok_or_else(|| {
            Error::Trust(format!(
                "chain does not end in a trusted certificate (last: {})",
                cert::subject_name(current)
            ))
        })?;
        cert::verify_issued_by(current, issuer)
            .map_err(|e| Error::Trust(format!("broken chain: {e}")))?;
        check_revocation(current, issuer, ctx)?;
    }

    Err(Error::Trust("chain does not end in a trusted certificate".into()))
}

fn check_revocation(cert: &Certificate, issuer: &Certificate, ctx: &ValidationContext<'_>) -> Result<()> {
    match revocation_status(cert, issuer, ctx)? {
        RevocationStatus::Good => Ok(()),
        RevocationStatus::NotCovered if ctx.require_revocation => Err(Error::Revocation(format!(
            "no revocation data covers {}",
            cert::subject_name(cert)
        ))),
        RevocationStatus::NotCovered => {
            log::debug!("no revocation data for {}", cert::subject_name(cert));
            Ok(())
        }
    }
}

/// The OCSP `CertID` of `cert` under `issuer`.
pub fn ocsp_cert_id(cert: &Certificate, issuer: &Certificate, hash: DigestAlgo) -> Result<CertId> {
    Ok(CertId::new(
        hash,
        &cert::subject_der(issuer)?,
        cert::public_key_bits(issuer),
        &cert::serial_bytes(cert),
    ))
}

/// Check `cert` against the OCSP responses and CRLs of the context.
///
/// A certificate revoked at or before the instant is an error.
pub fn revocation_status(
    cert: &Certificate,
    issuer: &Certificate,
    ctx: &ValidationContext<'_>,
) -> Result<RevocationStatus> {
    let mut status = RevocationStatus::NotCovered;

    for der in ctx.ocsp_responses {
        let response = OcspResponse::from_der(der)?;
        if response.status() != ResponseStatus::Successful {
            continue;
        }
        for single in response.responses() {
            let id = ocsp_cert_id(cert, issuer, single.cert_id.hash_algorithm)?;
            if single.cert_id != id {
                continue;
            }
            verify_responder(&response, issuer)?;
            match single.status {
                CertStatus::Good => status = RevocationStatus::Good,
                CertStatus::Revoked(at) if at <= ctx.at => {
                    return Err(Error::Revocation(format!(
                        "certificate {} revoked at {at} (OCSP)",
                        cert::subject_name(cert)
                    )));
                }
                CertStatus::Revoked(_) => status = RevocationStatus::Good,
                CertStatus::Unknown => {}
            }
        }
    }

    for der in ctx.crls {
        let crl = Crl::from_der(der)?;
        if !crl.is_issued_by(issuer) {
            continue;
        }
        crl.verify_signature(issuer)?;
        match crl.revocation_of(cert)? {
            Some(at) if at <= ctx.at => {
                return Err(Error::Revocation(format!(
                    "certificate {} revoked at {at} (CRL)",
                    cert::subject_name(cert)
                )));
            }
            _ => status = RevocationStatus::Good,
        }
    }

    Ok(status)
}

/// Accept responses signed by the issuer itself or by a responder
/// certificate the issuer signed.
fn verify_responder(response: &OcspResponse, issuer: &Certificate) -> Result<()> {
    if response.verify_signature(&cert::public_key(issuer)?).is_ok() {
        return Ok(());
    }
    for der in response.certificates() {
        let Ok(responder) = cert::parse_certificate(der) else {
            continue;
        };
        if cert::verify_issued_by(&responder, issuer).is_ok()
            && response.verify_signature(&cert::public_key(&responder)?).is_ok()
        {
            return Ok(());
        }
    }
    Err(Error::Revocation(format!(
        "OCSP response not signed by {} or a delegated responder",
        cert::subject_name(issuer)
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, CertTemplate};
    use chrono::Duration;

    fn ctx<'a>(
        anchors: &'a [Vec<u8>],
        ocsps: &'a [Vec<u8>],
        crls: &'a [Vec<u8>],
    ) -> ValidationContext<'a> {
        ValidationContext {
            anchors,
            at: Utc::now(),
            ocsp_responses: ocsps,
            crls,
            require_revocation: true,
        }
    }

    #[test]
    fn chain_with_good_ocsp() {
        let pki = testing::pki();
        let anchors = [pki.ca_cert.clone()];
        let ocsp = [testing::ocsp(pki, pki.signer.signer_certificate(), CertStatus::Good)];
        validate_chain(pki.signer.chain(), &ctx(&anchors, &ocsp, &[])).unwrap();
        // the leaf alone is enough when the anchor issued it
        validate_chain(&pki.signer.chain()[..1], &ctx(&anchors, &ocsp, &[])).unwrap();
    }

    #[test]
    fn missing_revocation_data() {
        let pki = testing::pki();
        let anchors = [pki.ca_cert.clone()];
        let err = validate_chain(pki.signer.chain(), &ctx(&anchors, &[], &[])).unwrap_err();
        assert!(matches!(err, Error::Revocation(_)));
        let mut relaxed = ctx(&anchors, &[], &[]);
        relaxed.require_revocation = false;
        validate_chain(pki.signer.chain(), &relaxed).unwrap();
    }

    #[test]
    fn revoked_by_crl_before_instant() {
        let pki = testing::pki();
        let anchors = [pki.ca_cert.clone()];
        let leaf = cert::parse_certificate(pki.signer.signer_certificate()).unwrap();
        let revoked_at = Utc::now() - Duration::hours(2);
        let crls = [testing::crl(pki, &[(cert::serial_bytes(&leaf), revoked_at)])];
        let err = validate_chain(pki.signer.chain(), &ctx(&anchors, &[], &crls)).unwrap_err();
        assert!(matches!(err, Error::Revocation(_)));

        // validated at an instant before the revocation
        let mut earlier = ctx(&anchors, &[], &crls);
        earlier.at = revoked_at - Duration::hours(1);
        validate_chain(pki.signer.chain(), &earlier).unwrap();
    }

    #[test]
    fn revoked_by_ocsp() {
        let pki = testing::pki();
        let anchors = [pki.ca_cert.clone()];
        let revoked_at = Utc::now() - Duration::minutes(30);
        let ocsp = [testing::ocsp(
            pki,
            pki.signer.signer_certificate(),
            CertStatus::Revoked(revoked_at),
        )];
        assert!(validate_chain(pki.signer.chain(), &ctx(&anchors, &ocsp, &[])).is_err());
    }

    #[test]
    fn untrusted_root() {
        let pki = testing::pki();
        let other_key = dss_crypto::SigningKey::EcP256(p256::ecdsa::SigningKey::random(
            &mut rand::thread_rng(),
        ));
        let other_root = testing::issue_certificate(&CertTemplate {
            subject_cn: "Other Root",
            serial: &[0x05],
            public_key: &other_key,
            not_before: Utc::now() - Duration::days(1),
            not_after: Utc::now() + Duration::days(1),
            ca: true,
            issuer: None,
        });
        let anchors = [other_root];
        let mut c = ctx(&anchors, &[], &[]);
        c.require_revocation = false;
        let err = validate_chain(pki.signer.chain(), &c).unwrap_err();
        assert!(matches!(err, Error::Trust(_)));
    }

    #[test]
    fn outside_validity_period() {
        let pki = testing::pki();
        let anchors = [pki.ca_cert.clone()];
        let mut later = ctx(&anchors, &[], &[]);
        later.at = Utc::now() + Duration::days(400);
        let err = validate_chain(pki.signer.chain(), &later).unwrap_err();
        assert!(matches!(err, Error::Certificate(_)));
    }

    #[test]
    fn empty_chain() {
        let pki = testing::pki();
        let anchors = [pki.ca_cert.clone()];
        assert!(matches!(
            validate_chain(&[], &ctx(&anchors, &[], &[])),
            Err(Error::Trust(_))
        ));
    }
}
