#![forbid(unsafe_code)]

//! Cryptographic primitives for the signature engine.
//!
//! Digests, prehash RSA/ECDSA signatures, RFC 3161 time-stamp tokens and
//! OCSP responses. Time-stamp tokens use the `cms` and `x509-tsp` types;
//! OCSP structures are derived with `der`.

pub mod digest;
pub mod ocsp;
pub mod sign;
pub mod tsp;

pub use digest::{DigestAlgo, DigestAlgorithm};
pub use sign::{SignatureFormat, SigningKey};

use std::time::Duration;

use chrono::{DateTime, Utc};
use der::asn1::GeneralizedTime;

/// `GeneralizedTime` at the whole second of `at`.
pub(crate) fn generalized_time(at: DateTime<Utc>) -> der::Result<GeneralizedTime> {
    let secs = u64::try_from(at.timestamp()).unwrap_or(0);
    GeneralizedTime::from_unix_duration(Duration::from_secs(secs))
}

pub(crate) fn from_generalized_time(t: &GeneralizedTime) -> Option<DateTime<Utc>> {
    let d = t.to_unix_duration();
    DateTime::<Utc>::from_timestamp(i64::try_from(d.as_secs()).ok()?, d.subsec_nanos())
}

/// Big-endian magnitude of an INTEGER, leading zero octets removed.
pub(crate) fn magnitude(bytes: &[u8]) -> Vec<u8> {
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    bytes[skip.min(bytes.len().saturating_sub(1))..].to_vec()
}
