#![forbid(unsafe_code)]

//! Digest (hash) algorithm implementations.
//!
//! [`DigestAlgorithm`] is the streaming interface used for reference
//! digests; [`DigestAlgo`] names an algorithm across its XML-DSig URI, its
//! ASN.1 object identifier and its configuration name.

use der::oid::{AssociatedOid, ObjectIdentifier};
use digest::Digest;
use dss_core::{algorithm, Error};
use x509_cert::spki::AlgorithmIdentifierOwned;

/// Trait for digest algorithms.
pub trait DigestAlgorithm: Send {
    /// Feed data into the hash.
    fn update(&mut self, data: &[u8]);
    /// Finalize and return the hash value.
    fn finalize(self: Box<Self>) -> Vec<u8>;
    /// Algorithm URI.
    fn uri(&self) -> &'static str;
}

/// Create a digest algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn DigestAlgorithm>, Error> {
    match uri {
        algorithm::SHA1 => Ok(Box::new(Sha1Digest::new())),
        algorithm::SHA224 => Ok(Box::new(Sha224Digest::new())),
        algorithm::SHA256 => Ok(Box::new(Sha256Digest::new())),
        algorithm::SHA384 => Ok(Box::new(Sha384Digest::new())),
        algorithm::SHA512 => Ok(Box::new(Sha512Digest::new())),
        _ => Err(Error::UnsupportedAlgorithm(format!("digest algorithm: {uri}"))),
    }
}

/// Compute a digest in one shot.
pub fn digest(uri: &str, data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut hasher = from_uri(uri)?;
    hasher.update(data);
    Ok(hasher.finalize())
}

// ── Concrete implementations ─────────────────────────────────────────

macro_rules! impl_digest {
    ($name:ident, $hasher:ty, $uri:expr) => {
        struct $name {
            inner: $hasher,
        }

        impl $name {
            fn new() -> Self {
                Self {
                    inner: <$hasher>::new(),
                }
            }
        }

        impl DigestAlgorithm for $name {
            fn update(&mut self, data: &[u8]) {
                Digest::update(&mut self.inner, data);
            }

            fn finalize(self: Box<Self>) -> Vec<u8> {
                Digest::finalize(self.inner).to_vec()
            }

            fn uri(&self) -> &'static str {
                $uri
            }
        }
    };
}

impl_digest!(Sha1Digest, sha1::Sha1, algorithm::SHA1);
impl_digest!(Sha224Digest, sha2::Sha224, algorithm::SHA224);
impl_digest!(Sha256Digest, sha2::Sha256, algorithm::SHA256);
impl_digest!(Sha384Digest, sha2::Sha384, algorithm::SHA384);
impl_digest!(Sha512Digest, sha2::Sha512, algorithm::SHA512);

// ── Named algorithms ─────────────────────────────────────────────────

/// A digest algorithm known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestAlgo {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgo {
    pub const ALL: [DigestAlgo; 5] = [
        DigestAlgo::Sha1,
        DigestAlgo::Sha224,
        DigestAlgo::Sha256,
        DigestAlgo::Sha384,
        DigestAlgo::Sha512,
    ];

    pub fn xml_uri(&self) -> &'static str {
        match self {
            Self::Sha1 => algorithm::SHA1,
            Self::Sha224 => algorithm::SHA224,
            Self::Sha256 => algorithm::SHA256,
            Self::Sha384 => algorithm::SHA384,
            Self::Sha512 => algorithm::SHA512,
        }
    }

    pub fn from_xml_uri(uri: &str) -> Result<Self, Error> {
        Self::ALL
            .into_iter()
            .find(|a| a.xml_uri() == uri)
            .ok_or_else(|| Error::UnsupportedAlgorithm(format!("digest algorithm: {uri}")))
    }

    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            Self::Sha1 => sha1::Sha1::OID,
            Self::Sha224 => sha2::Sha224::OID,
            Self::Sha256 => sha2::Sha256::OID,
            Self::Sha384 => sha2::Sha384::OID,
            Self::Sha512 => sha2::Sha512::OID,
        }
    }

    pub fn from_oid(oid: &ObjectIdentifier) -> Result<Self, Error> {
        Self::ALL
            .into_iter()
            .find(|a| a.oid() == *oid)
            .ok_or_else(|| Error::UnsupportedAlgorithm(format!("digest OID {oid}")))
    }

    /// `AlgorithmIdentifier` with absent parameters, as used in CMS and OCSP.
    pub fn algorithm_identifier(&self) -> AlgorithmIdentifierOwned {
        AlgorithmIdentifierOwned {
            oid: self.oid(),
            parameters: None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha224 => "sha224",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    /// Parse a configuration name such as `sha256`, `SHA-256` or `SHA256`.
    pub fn from_name(name: &str) -> Result<Self, Error> {
        let norm: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|a| a.name() == norm)
            .ok_or_else(|| Error::UnsupportedAlgorithm(format!("digest algorithm name: {name}")))
    }

    pub fn output_len(&self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha224 => 28,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        let mut hasher: Box<dyn DigestAlgorithm> = match self {
            Self::Sha1 => Box::new(Sha1Digest::new()),
            Self::Sha224 => Box::new(Sha224Digest::new()),
            Self::Sha256 => Box::new(Sha256Digest::new()),
            Self::Sha384 => Box::new(Sha384Digest::new()),
            Self::Sha512 => Box::new(Sha512Digest::new()),
        };
        hasher.update(data);
        hasher.finalize()
    }
}

impl std::fmt::Display for DigestAlgo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256() {
        let result = digest(algorithm::SHA256, b"hello").unwrap();
        assert_eq!(
            hex::encode(result),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_sha1() {
        assert_eq!(
            hex::encode(DigestAlgo::Sha1.digest(b"hello")),
            "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"
        );
    }

    #[test]
    fn lookups_agree() {
        for a in DigestAlgo::ALL {
            assert_eq!(DigestAlgo::from_xml_uri(a.xml_uri()).unwrap(), a);
            assert_eq!(DigestAlgo::from_oid(&a.oid()).unwrap(), a);
            assert_eq!(DigestAlgo::from_name(a.name()).unwrap(), a);
            assert_eq!(a.digest(b"x").len(), a.output_len());
        }
        assert_eq!(DigestAlgo::from_name("SHA-512").unwrap(), DigestAlgo::Sha512);
        assert!(DigestAlgo::from_name("md5").is_err());
        assert!(DigestAlgo::from_xml_uri("urn:md5").is_err());
    }
}
