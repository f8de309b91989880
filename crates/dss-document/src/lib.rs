#![forbid(unsafe_code)]

//! Format-specific signature services and signature verification.
//!
//! A [`SignatureService`] runs one two-phase signing session for an XML
//! document, a ZIP archive, an OpenDocument package, an ASiC container or
//! an Office Open XML package. The [`VerificationService`] lists the valid
//! signatures of a signed document of any of those formats.

pub mod formats;
pub mod request;
pub mod service;
pub mod storage;
pub mod verification;
pub mod visualize;

#[cfg(test)]
mod testutil;

pub use request::{ContentType, SigningRequest};
pub use service::{Capabilities, SessionState, SignatureService};
pub use storage::TemporaryDataStorage;
pub use verification::VerificationService;
pub use visualize::visualize;
