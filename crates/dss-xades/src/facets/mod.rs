#![forbid(unsafe_code)]

//! The facets shipped with the engine.
//!
//! Generic facets build the parts of every signature; container facets
//! reference the entries of a ZIP based document.

pub mod container;
pub mod cosignature;
pub mod identity;
pub mod keyinfo;
pub mod ooxml;
pub mod xades;
pub mod xades_xl;

pub use container::{AsicFacet, OdfFacet, ZipFacet};
pub use cosignature::CoSignatureFacet;
pub use identity::IdentityFacet;
pub use keyinfo::KeyInfoFacet;
pub use ooxml::OoxmlFacet;
pub use xades::XadesFacet;
pub use xades_xl::XadesXlFacet;
