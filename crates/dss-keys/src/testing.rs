#![forbid(unsafe_code)]

//! Test PKI: a certificate authority, a signer and a time-stamp authority,
//! plus CRL and OCSP fixtures issued by the authority.
//!
//! Everything is generated once per test binary.

use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use der::asn1::{BitString, OctetString, UtcTime};
use der::{Decode, Encode};
use dss_crypto::ocsp::{self, CertId, CertStatus, SingleResponse};
use dss_crypto::sign::{self, SignatureFormat};
use dss_crypto::{DigestAlgo, SigningKey};
use x509_cert::crl::{CertificateList, RevokedCert, TbsCertList};
use x509_cert::ext::pkix::BasicConstraints;
use x509_cert::ext::Extension;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::time::{Time, Validity};
use x509_cert::{Certificate, TbsCertificate, Version};

use crate::cert;
use crate::key::{self, Credential};

const ID_CE_BASIC_CONSTRAINTS: der::asn1::ObjectIdentifier =
    der::asn1::ObjectIdentifier::new_unwrap("2.5.29.19");

pub struct TestPki {
    pub ca_key: SigningKey,
    pub ca_cert: Vec<u8>,
    /// RSA signer, chain `[signer, ca]`.
    pub signer: Credential,
    /// P-256 time-stamp authority, chain `[tsa, ca]`.
    pub tsa: Credential,
}

/// The shared fixture PKI.
pub fn pki() -> &'static TestPki {
    static PKI: OnceLock<TestPki> = OnceLock::new();
    PKI.get_or_init(build_pki)
}

fn build_pki() -> TestPki {
    let mut rng = rand::thread_rng();
    let now = Utc::now();

    let ca_key = SigningKey::EcP256(p256::ecdsa::SigningKey::random(&mut rng));
    let ca_cert = issue_certificate(&CertTemplate {
        subject_cn: "Test Root CA",
        serial: &[0x01],
        public_key: &ca_key,
        not_before: now - Duration::days(10),
        not_after: now + Duration::days(3650),
        ca: true,
        issuer: None,
    });

    let signer_key = match rsa::RsaPrivateKey::new(&mut rng, 1024) {
        Ok(k) => SigningKey::Rsa(k),
        Err(e) => panic!("RSA key generation failed: {e}"),
    };
    let signer_cert = issue_certificate(&CertTemplate {
        subject_cn: "Test Signer",
        serial: &[0x10, 0x01],
        public_key: &signer_key,
        not_before: now - Duration::days(1),
        not_after: now + Duration::days(365),
        ca: false,
        issuer: Some((&ca_key, &ca_cert)),
    });

    let tsa_key = SigningKey::EcP256(p256::ecdsa::SigningKey::random(&mut rng));
    let tsa_cert = issue_certificate(&CertTemplate {
        subject_cn: "Test Time Stamp Authority",
        serial: &[0x20, 0x01],
        public_key: &tsa_key,
        not_before: now - Duration::days(1),
        not_after: now + Duration::days(365),
        ca: false,
        issuer: Some((&ca_key, &ca_cert)),
    });

    let credential = |key: SigningKey, leaf: Vec<u8>| match Credential::new(key, vec![leaf, ca_cert.clone()]) {
        Ok(c) => c,
        Err(e) => panic!("fixture credential: {e}"),
    };
    TestPki {
        signer: credential(signer_key, signer_cert),
        tsa: credential(tsa_key, tsa_cert),
        ca_key,
        ca_cert,
    }
}

/// Parameters of a fixture certificate.
pub struct CertTemplate<'a> {
    pub subject_cn: &'a str,
    pub serial: &'a [u8],
    /// Key whose public half is certified.
    pub public_key: &'a SigningKey,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub ca: bool,
    /// Issuer key and DER certificate; `None` for self-signed.
    pub issuer: Option<(&'a SigningKey, &'a [u8])>,
}

fn fixture<T, E: std::fmt::Display>(what: &str, r: std::result::Result<T, E>) -> T {
    r.unwrap_or_else(|e| panic!("fixture {what}: {e}"))
}

fn cn_name(cn: &str) -> Name {
    fixture("name", Name::from_str(&format!("CN={cn}")))
}

/// DER `Name` with a single common name.
pub fn name(cn: &str) -> Vec<u8> {
    fixture("name", cn_name(cn).to_der())
}

/// UTCTime (years 1950 to 2049).
fn utc_time(t: &DateTime<Utc>) -> Time {
    let secs = StdDuration::from_secs(t.timestamp().max(0) as u64);
    Time::UtcTime(fixture("time", UtcTime::from_unix_duration(secs)))
}

fn serial(magnitude: &[u8]) -> SerialNumber {
    fixture("serial", SerialNumber::new(magnitude))
}

fn algorithm_identifier(key: &SigningKey) -> AlgorithmIdentifierOwned {
    sign::x509_signature_algorithm(key, DigestAlgo::Sha256)
}

/// Signature of `key` over the DER encoding of `tbs`.
fn signature_over<T: Encode>(tbs: &T, key: &SigningKey) -> BitString {
    let hash = DigestAlgo::Sha256.digest(&fixture("encoding", tbs.to_der()));
    let signature = fixture(
        "signature",
        sign::sign_prehash(key, DigestAlgo::Sha256, &hash, SignatureFormat::Der),
    );
    fixture("signature", BitString::from_bytes(&signature))
}

fn basic_constraints_ca() -> Extension {
    let value = BasicConstraints {
        ca: true,
        path_len_constraint: None,
    };
    Extension {
        extn_id: ID_CE_BASIC_CONSTRAINTS,
        critical: true,
        extn_value: fixture("extension", OctetString::new(fixture("extension", value.to_der()))),
    }
}

/// Issue a DER certificate from `t`.
pub fn issue_certificate(t: &CertTemplate<'_>) -> Vec<u8> {
    let subject = cn_name(t.subject_cn);
    let (issuer_key, issuer) = match t.issuer {
        Some((key, issuer_cert)) => {
            let issuer_cert = fixture("issuer", cert::parse_certificate(issuer_cert));
            (key, issuer_cert.tbs_certificate.subject)
        }
        None => (t.public_key, subject.clone()),
    };
    let spki = fixture("key", key::public_key_der(t.public_key));

    let tbs = TbsCertificate {
        version: Version::V3,
        serial_number: serial(t.serial),
        signature: algorithm_identifier(issuer_key),
        issuer,
        validity: Validity {
            not_before: utc_time(&t.not_before),
            not_after: utc_time(&t.not_after),
        },
        subject,
        subject_public_key_info: fixture("key", SubjectPublicKeyInfoOwned::from_der(&spki)),
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: t.ca.then(|| vec![basic_constraints_ca()]),
    };
    let signature = signature_over(&tbs, issuer_key);
    let certificate = Certificate {
        tbs_certificate: tbs,
        signature_algorithm: algorithm_identifier(issuer_key),
        signature,
    };
    fixture("certificate", certificate.to_der())
}

/// CRL issued by the fixture CA listing `revoked` serial magnitudes.
pub fn crl(pki: &TestPki, revoked: &[(Vec<u8>, DateTime<Utc>)]) -> Vec<u8> {
    let now = Utc::now();
    let entries = revoked
        .iter()
        .map(|(number, at)| RevokedCert {
            serial_number: serial(number),
            revocation_date: utc_time(at),
            crl_entry_extensions: None,
        })
        .collect::<Vec<_>>();
    let tbs = TbsCertList {
        version: Version::V2,
        signature: algorithm_identifier(&pki.ca_key),
        issuer: cn_name("Test Root CA"),
        this_update: utc_time(&(now - Duration::minutes(5))),
        next_update: Some(utc_time(&(now + Duration::days(7)))),
        revoked_certificates: (!entries.is_empty()).then_some(entries),
        crl_extensions: None,
    };
    let signature = signature_over(&tbs, &pki.ca_key);
    let list = CertificateList {
        tbs_cert_list: tbs,
        signature_algorithm: algorithm_identifier(&pki.ca_key),
        signature,
    };
    fixture("CRL", list.to_der())
}

/// OCSP response from the fixture CA about the certificate `cert_der`.
pub fn ocsp(pki: &TestPki, cert_der: &[u8], status: CertStatus) -> Vec<u8> {
    let build = || -> dss_core::Result<Vec<u8>> {
        let leaf = cert::parse_certificate(cert_der)?;
        let ca = cert::parse_certificate(&pki.ca_cert)?;
        let id = CertId::new(
            DigestAlgo::Sha1,
            &cert::subject_der(&ca)?,
            cert::public_key_bits(&ca),
            &cert::serial_bytes(&leaf),
        );
        let now = Utc::now();
        let responder_name = cert::subject_der(&ca)?;
        ocsp::build_response(
            &ocsp::Responder {
                key: &pki.ca_key,
                name: &responder_name,
                certificates: &[],
                digest: DigestAlgo::Sha256,
            },
            now,
            &[SingleResponse {
                cert_id: id,
                status,
                this_update: now - Duration::minutes(1),
            }],
        )
    };
    build().unwrap_or_else(|e| panic!("fixture OCSP response: {e}"))
}
