#![forbid(unsafe_code)]

//! The eID DSS signature engine.

pub use dss_c14n as c14n;
pub use dss_core as core;
pub use dss_crypto as crypto;
pub use dss_document as document;
pub use dss_keys as keys;
pub use dss_transforms as transforms;
pub use dss_xades as xades;
pub use dss_xml as xml;
