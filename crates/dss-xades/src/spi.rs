#![forbid(unsafe_code)]

//! Capabilities supplied by the host application and the data exchanged
//! with them.
//!
//! The engine never holds a private key and never performs revocation or
//! time-stamp trust decisions itself: it hands certificate chains, DER
//! tokens and evidence to these traits and propagates their errors as-is.

use chrono::{DateTime, Utc};
use dss_core::{Error, Result};
use dss_crypto::DigestAlgo;

/// OCSP responses and CRLs, DER encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevocationData {
    pub ocsp_responses: Vec<Vec<u8>>,
    pub crls: Vec<Vec<u8>>,
}

impl RevocationData {
    pub fn new(ocsp_responses: Vec<Vec<u8>>, crls: Vec<Vec<u8>>) -> Self {
        Self {
            ocsp_responses,
            crls,
        }
    }

    /// Add the entries of `other` that are not present yet.
    pub fn merge(&mut self, other: &RevocationData) {
        for ocsp in &other.ocsp_responses {
            if !self.ocsp_responses.contains(ocsp) {
                self.ocsp_responses.push(ocsp.clone());
            }
        }
        for crl in &other.crls {
            if !self.crls.contains(crl) {
                self.crls.push(crl.clone());
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ocsp_responses.is_empty() && self.crls.is_empty()
    }
}

/// A digest handed to the external signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestInfo {
    pub digest_algorithm: DigestAlgo,
    pub digest_value: Vec<u8>,
}

/// A time-stamp token plus the revocation data of the authority that
/// issued it.
#[derive(Debug, Clone, Default)]
pub struct TimeStampResponse {
    pub token: Vec<u8>,
    pub revocation: RevocationData,
}

/// Identity attributes embedded by the identity facet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub first_name: String,
    pub name: String,
    pub middle_name: Option<String>,
    pub gender: Option<String>,
    pub photo: Option<Vec<u8>>,
}

/// The result of validating one signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInfo {
    /// DER certificate of the signer.
    pub signer: Vec<u8>,
    pub signing_time: DateTime<Utc>,
    pub role: Option<String>,
    pub identity: Option<Identity>,
}

// ── Capabilities ─────────────────────────────────────────────────────

/// Decides whether a certificate chain was trusted at an instant.
pub trait TrustValidator {
    fn validate(
        &self,
        chain: &[Vec<u8>],
        at: DateTime<Utc>,
        ocsp_responses: &[Vec<u8>],
        crls: &[Vec<u8>],
    ) -> Result<()>;
}

/// Decides whether an RFC 3161 token is trustworthy.
pub trait TimestampValidator {
    /// Validate at the current time, fetching evidence as needed.
    fn validate(&self, token: &[u8]) -> Result<()>;

    /// Validate at `at` using only the supplied evidence.
    fn validate_with_evidence(
        &self,
        token: &[u8],
        evidence: &RevocationData,
        at: DateTime<Utc>,
    ) -> Result<()>;
}

/// Obtains RFC 3161 tokens.
pub trait TimestampService {
    fn timestamp(&self, data: &[u8], digest: DigestAlgo) -> Result<TimeStampResponse>;
}

/// Obtains revocation data for a certificate chain.
pub trait RevocationDataService {
    fn revocation_data(&self, chain: &[Vec<u8>]) -> Result<RevocationData>;
}

/// The external signing operation (smart card, HSM, ...).
pub trait Signer {
    fn sign(&self, digest_infos: &[DigestInfo], chain: &[Vec<u8>]) -> Result<Vec<u8>>;
}

/// The single digest of a signing round.
pub fn single_digest(digest_infos: &[DigestInfo]) -> Result<&DigestInfo> {
    match digest_infos {
        [one] => Ok(one),
        _ => Err(Error::InvalidArgument(format!(
            "expected exactly one digest, got {}",
            digest_infos.len()
        ))),
    }
}
