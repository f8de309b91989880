#![forbid(unsafe_code)]

//! A private key together with its certificate chain.

use dss_core::{Error, Result};
use dss_crypto::sign::{self, SignatureFormat};
use dss_crypto::{DigestAlgo, SigningKey};

use crate::cert;

/// Signing material: a private key and its chain, leaf first.
#[derive(Debug, Clone)]
pub struct Credential {
    key: SigningKey,
    chain: Vec<Vec<u8>>,
}

impl Credential {
    /// Pair `key` with `chain`. The leaf certificate must carry the public
    /// half of `key`.
    pub fn new(key: SigningKey, chain: Vec<Vec<u8>>) -> Result<Self> {
        if !key.is_private() {
            return Err(Error::Key("credential requires a private key".into()));
        }
        let leaf = chain
            .first()
            .ok_or_else(|| Error::Precondition("empty certificate chain".into()))?;
        let leaf = cert::parse_certificate(leaf)?;
        let probe = DigestAlgo::Sha256.digest(b"credential key check");
        let sig = sign::sign_prehash(&key, DigestAlgo::Sha256, &probe, SignatureFormat::Der)?;
        let cert_key = cert::public_key(&leaf)?;
        if !sign::verify_prehash(&cert_key, DigestAlgo::Sha256, &probe, &sig, SignatureFormat::Der)? {
            return Err(Error::Key(format!(
                "private key does not match certificate {}",
                cert::subject_name(&leaf)
            )));
        }
        Ok(Self { key, chain })
    }

    pub fn key(&self) -> &SigningKey {
        &self.key
    }

    pub fn chain(&self) -> &[Vec<u8>] {
        &self.chain
    }

    /// DER of the leaf certificate.
    pub fn signer_certificate(&self) -> &[u8] {
        // `new` rejects empty chains
        self.chain.first().map(Vec::as_slice).unwrap_or(&[])
    }
}

/// SubjectPublicKeyInfo DER of the public half of `key`.
pub fn public_key_der(key: &SigningKey) -> Result<Vec<u8>> {
    use spki::EncodePublicKey;
    let doc = match key.public() {
        SigningKey::RsaPublic(pk) => pk.to_public_key_der(),
        SigningKey::EcP256Public(vk) => vk.to_public_key_der(),
        SigningKey::EcP384Public(vk) => vk.to_public_key_der(),
        _ => return Err(Error::Key("unsupported key type".into())),
    }
    .map_err(|e| Error::Key(format!("failed to encode public key: {e}")))?;
    Ok(doc.as_bytes().to_vec())
}
