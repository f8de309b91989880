#![forbid(unsafe_code)]

//! What the host asks to have signed.

use std::fmt;
use std::str::FromStr;

use dss_core::{Error, Result};
use dss_crypto::DigestAlgo;
use dss_xades::Identity;

/// The document formats the engine can sign and verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    Xml,
    Zip,
    Odf,
    Asic,
    Ooxml,
}

impl ContentType {
    pub const ALL: [ContentType; 5] = [
        ContentType::Xml,
        ContentType::Zip,
        ContentType::Odf,
        ContentType::Asic,
        ContentType::Ooxml,
    ];

    /// The canonical MIME type.
    pub fn mime_type(&self) -> &'static str {
        match self {
            ContentType::Xml => "text/xml",
            ContentType::Zip => "application/zip",
            ContentType::Odf => "application/vnd.oasis.opendocument.text",
            ContentType::Asic => "application/vnd.etsi.asic-e+zip",
            ContentType::Ooxml => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }

    /// Map a MIME type onto a format.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        let mime = mime.split(';').next().unwrap_or(mime).trim().to_ascii_lowercase();
        match mime.as_str() {
            "text/xml" | "application/xml" => Some(ContentType::Xml),
            "application/zip" => Some(ContentType::Zip),
            "application/vnd.etsi.asic-s+zip" | "application/vnd.etsi.asic-e+zip" => {
                Some(ContentType::Asic)
            }
            m if m.starts_with("application/vnd.oasis.opendocument.") => Some(ContentType::Odf),
            m if m.starts_with("application/vnd.openxmlformats-officedocument.") => {
                Some(ContentType::Ooxml)
            }
            _ => None,
        }
    }

    /// Whether the format is a ZIP package signed through detached references.
    pub fn is_container(&self) -> bool {
        !matches!(self, ContentType::Xml)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ContentType::Xml => "xml",
            ContentType::Zip => "zip",
            ContentType::Odf => "odf",
            ContentType::Asic => "asic",
            ContentType::Ooxml => "ooxml",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ContentType {
    type Err = Error;

    /// Accepts a short name (`xml`, `zip`, `odf`, `asic`, `ooxml`) or a MIME type.
    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .or_else(|| Self::from_mime_type(s))
            .ok_or_else(|| Error::DocumentFormat(format!("unsupported content type {s:?}")))
    }
}

/// One signing session's input. Immutable once built.
#[derive(Debug, Clone)]
pub struct SigningRequest {
    document: Vec<u8>,
    content_type: ContentType,
    role: Option<String>,
    identity: Option<Identity>,
    digest: Option<DigestAlgo>,
}

impl SigningRequest {
    pub fn new(document: Vec<u8>, content_type: ContentType) -> Self {
        Self {
            document,
            content_type,
            role: None,
            identity: None,
            digest: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Identity attributes, photo included, to embed in the signature.
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Digest for the signature; the configured default applies otherwise.
    pub fn with_digest(mut self, digest: DigestAlgo) -> Self {
        self.digest = Some(digest);
        self
    }

    pub fn document(&self) -> &[u8] {
        &self.document
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn digest(&self) -> Option<DigestAlgo> {
        self.digest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_mime_types() {
        assert_eq!("xml".parse::<ContentType>().unwrap(), ContentType::Xml);
        assert_eq!("ASiC".parse::<ContentType>().unwrap(), ContentType::Asic);
        assert_eq!(
            "application/vnd.oasis.opendocument.spreadsheet".parse::<ContentType>().unwrap(),
            ContentType::Odf
        );
        assert_eq!(
            ContentType::from_mime_type("application/xml; charset=UTF-8"),
            Some(ContentType::Xml)
        );
        assert!(matches!(
            "image/png".parse::<ContentType>(),
            Err(Error::DocumentFormat(_))
        ));
        for c in ContentType::ALL {
            assert_eq!(ContentType::from_mime_type(c.mime_type()), Some(c));
        }
    }

    #[test]
    fn request_defaults() {
        let r = SigningRequest::new(b"<a/>".to_vec(), ContentType::Xml).with_role("clerk");
        assert_eq!(r.digest(), None);
        assert_eq!(r.clone().with_digest(DigestAlgo::Sha512).digest(), Some(DigestAlgo::Sha512));
        assert_eq!(r.role(), Some("clerk"));
        assert!(r.identity().is_none());
        assert!(!r.content_type().is_container());
    }
}
