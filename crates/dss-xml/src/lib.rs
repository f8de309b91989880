#![forbid(unsafe_code)]

//! XML document helpers for the eID DSS engine.
//!
//! Provides a thin layer over `roxmltree`: element lookup, `NodeSet`
//! selection for canonicalization, qualified-name recovery, a small XML
//! writer for building signature structures and text splicing for editing
//! serialized documents in place.

pub mod document;
pub mod nodeset;
pub mod qname;
pub mod splice;
pub mod writer;
pub mod xpath;

pub use document::XmlDocument;
pub use nodeset::NodeSet;
pub use writer::XmlWriter;

/// Return roxmltree parsing options that allow DTD.
///
/// roxmltree does not expand external entities, so allowing a DTD only
/// admits internal entity definitions.
pub fn parsing_options() -> roxmltree::ParsingOptions {
    roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    }
}

/// Parse `text` with [`parsing_options`], mapping failures to `XmlParse`.
pub fn parse(text: &str) -> dss_core::Result<roxmltree::Document<'_>> {
    roxmltree::Document::parse_with_options(text, parsing_options())
        .map_err(|e| dss_core::Error::XmlParse(e.to_string()))
}
