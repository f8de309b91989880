#![forbid(unsafe_code)]

//! Signature algorithm implementations (RSA PKCS#1 v1.5, ECDSA).
//!
//! Signing always happens over a precomputed digest: the engine hands
//! digests to an external signer and never needs the message itself.

use der::asn1::{Any, AnyRef, ObjectIdentifier};
use dss_core::{algorithm, Error};
use rsa::Pkcs1v15Sign;
use signature::hazmat::{PrehashSigner, PrehashVerifier};
use x509_cert::spki::AlgorithmIdentifierOwned;

use crate::digest::DigestAlgo;

/// Key material for signature operations.
#[derive(Debug, Clone)]
pub enum SigningKey {
    Rsa(rsa::RsaPrivateKey),
    RsaPublic(rsa::RsaPublicKey),
    EcP256(p256::ecdsa::SigningKey),
    EcP256Public(p256::ecdsa::VerifyingKey),
    EcP384(p384::ecdsa::SigningKey),
    EcP384Public(p384::ecdsa::VerifyingKey),
}

/// Encoding of an ECDSA signature value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureFormat {
    /// Fixed-size `r || s`, as in XML-DSig.
    XmlDsig,
    /// ASN.1 `SEQUENCE { r, s }`, as in CMS, OCSP and X.509.
    Der,
}

impl SigningKey {
    pub fn is_private(&self) -> bool {
        matches!(self, Self::Rsa(_) | Self::EcP256(_) | Self::EcP384(_))
    }

    pub fn is_rsa(&self) -> bool {
        matches!(self, Self::Rsa(_) | Self::RsaPublic(_))
    }

    /// The public half of this key.
    pub fn public(&self) -> SigningKey {
        match self {
            Self::Rsa(k) => Self::RsaPublic(k.to_public_key()),
            Self::EcP256(k) => Self::EcP256Public(*k.verifying_key()),
            Self::EcP384(k) => Self::EcP384Public(*k.verifying_key()),
            other => other.clone(),
        }
    }
}

/// Trait for signature algorithms.
pub trait SignatureAlgorithm: Send {
    fn uri(&self) -> &'static str;
    fn digest(&self) -> DigestAlgo;
    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error>;
    fn verify(&self, key: &SigningKey, data: &[u8], signature: &[u8]) -> Result<bool, Error>;
}

/// Create a signature algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn SignatureAlgorithm>, Error> {
    let (digest, rsa) = match uri {
        algorithm::RSA_SHA1 => (DigestAlgo::Sha1, true),
        algorithm::RSA_SHA224 => (DigestAlgo::Sha224, true),
        algorithm::RSA_SHA256 => (DigestAlgo::Sha256, true),
        algorithm::RSA_SHA384 => (DigestAlgo::Sha384, true),
        algorithm::RSA_SHA512 => (DigestAlgo::Sha512, true),
        algorithm::ECDSA_SHA1 => (DigestAlgo::Sha1, false),
        algorithm::ECDSA_SHA256 => (DigestAlgo::Sha256, false),
        algorithm::ECDSA_SHA384 => (DigestAlgo::Sha384, false),
        algorithm::ECDSA_SHA512 => (DigestAlgo::Sha512, false),
        _ => return Err(Error::UnsupportedAlgorithm(format!("signature algorithm: {uri}"))),
    };
    let uri = signature_uri_for(rsa, digest)?;
    if rsa {
        Ok(Box::new(RsaPkcs1v15 { uri, digest }))
    } else {
        Ok(Box::new(Ecdsa { uri, digest }))
    }
}

/// The XML-DSig SignatureMethod URI for a key and digest.
pub fn signature_uri(key: &SigningKey, digest: DigestAlgo) -> Result<&'static str, Error> {
    signature_uri_for(key.is_rsa(), digest)
}

fn signature_uri_for(rsa: bool, digest: DigestAlgo) -> Result<&'static str, Error> {
    Ok(match (rsa, digest) {
        (true, DigestAlgo::Sha1) => algorithm::RSA_SHA1,
        (true, DigestAlgo::Sha224) => algorithm::RSA_SHA224,
        (true, DigestAlgo::Sha256) => algorithm::RSA_SHA256,
        (true, DigestAlgo::Sha384) => algorithm::RSA_SHA384,
        (true, DigestAlgo::Sha512) => algorithm::RSA_SHA512,
        (false, DigestAlgo::Sha1) => algorithm::ECDSA_SHA1,
        (false, DigestAlgo::Sha256) => algorithm::ECDSA_SHA256,
        (false, DigestAlgo::Sha384) => algorithm::ECDSA_SHA384,
        (false, DigestAlgo::Sha512) => algorithm::ECDSA_SHA512,
        (false, d) => return Err(Error::UnsupportedAlgorithm(format!("ECDSA with {d}"))),
    })
}

fn pkcs1v15_scheme(digest: DigestAlgo) -> Pkcs1v15Sign {
    match digest {
        DigestAlgo::Sha1 => Pkcs1v15Sign::new::<sha1::Sha1>(),
        DigestAlgo::Sha224 => Pkcs1v15Sign::new::<sha2::Sha224>(),
        DigestAlgo::Sha256 => Pkcs1v15Sign::new::<sha2::Sha256>(),
        DigestAlgo::Sha384 => Pkcs1v15Sign::new::<sha2::Sha384>(),
        DigestAlgo::Sha512 => Pkcs1v15Sign::new::<sha2::Sha512>(),
    }
}

/// Sign a precomputed digest. ECDSA signatures use the XML-DSig `r || s`
/// encoding unless `format` says otherwise.
pub fn sign_prehash(
    key: &SigningKey,
    digest: DigestAlgo,
    hash: &[u8],
    format: SignatureFormat,
) -> Result<Vec<u8>, Error> {
    if hash.len() != digest.output_len() {
        return Err(Error::Crypto(format!(
            "{digest} digest must be {} bytes, got {}",
            digest.output_len(),
            hash.len()
        )));
    }
    match key {
        SigningKey::Rsa(sk) => sk
            .sign(pkcs1v15_scheme(digest), hash)
            .map_err(|e| Error::Crypto(format!("RSA signing failed: {e}"))),
        SigningKey::EcP256(sk) => {
            let sig: p256::ecdsa::Signature = sk
                .sign_prehash(hash)
                .map_err(|e| Error::Crypto(format!("P-256 signing failed: {e}")))?;
            Ok(match format {
                SignatureFormat::XmlDsig => p256_to_xmldsig(&sig),
                SignatureFormat::Der => sig.to_der().as_bytes().to_vec(),
            })
        }
        SigningKey::EcP384(sk) => {
            let sig: p384::ecdsa::Signature = sk
                .sign_prehash(hash)
                .map_err(|e| Error::Crypto(format!("P-384 signing failed: {e}")))?;
            Ok(match format {
                SignatureFormat::XmlDsig => p384_to_xmldsig(&sig),
                SignatureFormat::Der => sig.to_der().as_bytes().to_vec(),
            })
        }
        _ => Err(Error::Key("private key required for signing".into())),
    }
}

/// Verify a signature over a precomputed digest.
pub fn verify_prehash(
    key: &SigningKey,
    digest: DigestAlgo,
    hash: &[u8],
    sig_bytes: &[u8],
    format: SignatureFormat,
) -> Result<bool, Error> {
    match key.public() {
        SigningKey::RsaPublic(pk) => Ok(pk.verify(pkcs1v15_scheme(digest), hash, sig_bytes).is_ok()),
        SigningKey::EcP256Public(vk) => {
            let sig = match format {
                SignatureFormat::XmlDsig => xmldsig_to_p256(sig_bytes)?,
                SignatureFormat::Der => p256::ecdsa::Signature::from_der(sig_bytes)
                    .map_err(|e| Error::Crypto(format!("invalid P-256 signature: {e}")))?,
            };
            Ok(vk.verify_prehash(hash, &sig).is_ok())
        }
        SigningKey::EcP384Public(vk) => {
            let sig = match format {
                SignatureFormat::XmlDsig => xmldsig_to_p384(sig_bytes)?,
                SignatureFormat::Der => p384::ecdsa::Signature::from_der(sig_bytes)
                    .map_err(|e| Error::Crypto(format!("invalid P-384 signature: {e}")))?,
            };
            Ok(vk.verify_prehash(hash, &sig).is_ok())
        }
        _ => Err(Error::Key("unsupported verification key".into())),
    }
}

const SHA1_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.5");
const SHA224_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.14");
const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const SHA384_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
const SHA512_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");
const ECDSA_WITH_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.1");
const ECDSA_WITH_SHA224: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.1");
const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
const ECDSA_WITH_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3");
const ECDSA_WITH_SHA512: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.4");

/// X.509 signature algorithm OID for signing with `key` over `digest`.
pub fn x509_signature_oid(key: &SigningKey, digest: DigestAlgo) -> ObjectIdentifier {
    signature_oid(key.is_rsa(), digest)
}

fn signature_oid(rsa: bool, digest: DigestAlgo) -> ObjectIdentifier {
    match (rsa, digest) {
        (true, DigestAlgo::Sha1) => SHA1_WITH_RSA,
        (true, DigestAlgo::Sha224) => SHA224_WITH_RSA,
        (true, DigestAlgo::Sha256) => SHA256_WITH_RSA,
        (true, DigestAlgo::Sha384) => SHA384_WITH_RSA,
        (true, DigestAlgo::Sha512) => SHA512_WITH_RSA,
        (false, DigestAlgo::Sha1) => ECDSA_WITH_SHA1,
        (false, DigestAlgo::Sha224) => ECDSA_WITH_SHA224,
        (false, DigestAlgo::Sha256) => ECDSA_WITH_SHA256,
        (false, DigestAlgo::Sha384) => ECDSA_WITH_SHA384,
        (false, DigestAlgo::Sha512) => ECDSA_WITH_SHA512,
    }
}

/// `AlgorithmIdentifier` of a signature made with `key` over `digest`.
///
/// RSA identifiers carry NULL parameters, ECDSA identifiers none.
pub fn x509_signature_algorithm(key: &SigningKey, digest: DigestAlgo) -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid: x509_signature_oid(key, digest),
        parameters: key.is_rsa().then(|| Any::from(AnyRef::NULL)),
    }
}

/// Digest implied by an X.509 signature algorithm.
pub fn digest_of_signature_oid(oid: &ObjectIdentifier) -> Result<DigestAlgo, Error> {
    DigestAlgo::ALL
        .into_iter()
        .find(|d| [signature_oid(true, *d), signature_oid(false, *d)].contains(oid))
        .ok_or_else(|| Error::UnsupportedAlgorithm(format!("signature algorithm {oid}")))
}

// ── RSA PKCS#1 v1.5 ─────────────────────────────────────────────────

struct RsaPkcs1v15 {
    uri: &'static str,
    digest: DigestAlgo,
}

impl SignatureAlgorithm for RsaPkcs1v15 {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn digest(&self) -> DigestAlgo {
        self.digest
    }

    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        match key {
            SigningKey::Rsa(_) => {
                sign_prehash(key, self.digest, &self.digest.digest(data), SignatureFormat::XmlDsig)
            }
            _ => Err(Error::Key("RSA private key required".into())),
        }
    }

    fn verify(&self, key: &SigningKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        if !key.is_rsa() {
            return Err(Error::Key("RSA key required".into()));
        }
        verify_prehash(key, self.digest, &self.digest.digest(data), sig_bytes, SignatureFormat::XmlDsig)
    }
}

// ── ECDSA ────────────────────────────────────────────────────────────

struct Ecdsa {
    uri: &'static str,
    digest: DigestAlgo,
}

impl SignatureAlgorithm for Ecdsa {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn digest(&self) -> DigestAlgo {
        self.digest
    }

    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        match key {
            SigningKey::EcP256(_) | SigningKey::EcP384(_) => {
                sign_prehash(key, self.digest, &self.digest.digest(data), SignatureFormat::XmlDsig)
            }
            _ => Err(Error::Key("EC signing key required".into())),
        }
    }

    fn verify(&self, key: &SigningKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        if key.is_rsa() {
            return Err(Error::Key("EC key required".into()));
        }
        verify_prehash(key, self.digest, &self.digest.digest(data), sig_bytes, SignatureFormat::XmlDsig)
    }
}

/// Convert XML-DSig ECDSA r||s to a typed Signature for P-256.
pub fn xmldsig_to_p256(rs: &[u8]) -> Result<p256::ecdsa::Signature, Error> {
    if rs.len() != 64 {
        return Err(Error::Crypto(format!("P-256 signature must be 64 bytes, got {}", rs.len())));
    }
    let r = p256::FieldBytes::from_slice(&rs[..32]);
    let s = p256::FieldBytes::from_slice(&rs[32..]);
    p256::ecdsa::Signature::from_scalars(*r, *s)
        .map_err(|e| Error::Crypto(format!("invalid P-256 signature: {e}")))
}

/// Convert P-256 signature to XML-DSig r||s format.
pub fn p256_to_xmldsig(sig: &p256::ecdsa::Signature) -> Vec<u8> {
    sig.to_bytes().to_vec()
}

/// Convert XML-DSig ECDSA r||s to a typed Signature for P-384.
pub fn xmldsig_to_p384(rs: &[u8]) -> Result<p384::ecdsa::Signature, Error> {
    if rs.len() != 96 {
        return Err(Error::Crypto(format!("P-384 signature must be 96 bytes, got {}", rs.len())));
    }
    let r = p384::FieldBytes::from_slice(&rs[..48]);
    let s = p384::FieldBytes::from_slice(&rs[48..]);
    p384::ecdsa::Signature::from_scalars(*r, *s)
        .map_err(|e| Error::Crypto(format!("invalid P-384 signature: {e}")))
}

/// Convert P-384 signature to XML-DSig r||s format.
pub fn p384_to_xmldsig(sig: &p384::ecdsa::Signature) -> Vec<u8> {
    sig.to_bytes().to_vec()
}
