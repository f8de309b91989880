#![forbid(unsafe_code)]

//! Error taxonomy shared by every crate of the signature engine.

/// Errors produced by the eID DSS signature engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("document format error: {0}")]
    DocumentFormat(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("invalid signature #{index}: {reason}")]
    InvalidSignature { index: usize, reason: String },

    #[error("precondition violated: {0}")]
    Precondition(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("invalid XML structure: {0}")]
    XmlStructure(String),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("key error: {0}")]
    Key(String),

    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    #[error("digest mismatch for reference: {0}")]
    DigestMismatch(String),

    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    #[error("transform error: {0}")]
    Transform(String),

    #[error("base64 decode error: {0}")]
    Base64(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip error: {0}")]
    Zip(String),

    #[error("missing required element: {0}")]
    MissingElement(String),

    #[error("missing required attribute: {0}")]
    MissingAttribute(String),

    #[error("invalid URI reference: {0}")]
    InvalidUri(String),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("trust validation failed: {0}")]
    Trust(String),

    #[error("timestamp error: {0}")]
    Timestamp(String),

    #[error("revocation data error: {0}")]
    Revocation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap any error as the failure of signature number `index`.
    ///
    /// An `InvalidSignature` keeps its reason but takes the new index.
    pub fn for_signature(self, index: usize) -> Self {
        match self {
            Error::InvalidSignature { reason, .. } => Error::InvalidSignature { index, reason },
            other => Error::InvalidSignature {
                index,
                reason: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_signature_keeps_reason() {
        let e = Error::DigestMismatch("#a".into()).for_signature(2);
        match e {
            Error::InvalidSignature { index, reason } => {
                assert_eq!(index, 2);
                assert!(reason.contains("#a"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn io_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e: Error = io.into();
        assert!(e.to_string().starts_with("I/O error"));
    }
}
