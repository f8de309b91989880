#![forbid(unsafe_code)]

//! Keys and certificates for the signature engine.
//!
//! Loads keys and certificates from PEM or DER, pairs a private key with
//! its chain, keeps a trust store and validates chains at a given instant
//! against OCSP and CRL evidence.

pub mod cert;
pub mod key;
pub mod loader;
pub mod manager;
pub mod x509;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use key::Credential;
pub use manager::TrustStore;
pub use x509::{validate_chain, ValidationContext};
