#![forbid(unsafe_code)]

//! Key and certificate loading from PEM and DER.

use std::path::Path;

use dss_core::{Error, Result};
use dss_crypto::SigningKey;

use crate::cert;
use crate::key::Credential;

/// Load a private key from PEM or DER (PKCS#8, or PKCS#1 for RSA).
///
/// Text around the PEM block is ignored; the first key block is used.
pub fn load_private_key(data: &[u8]) -> Result<SigningKey> {
    if let Some(text) = pem_text(data) {
        let blocks = pem_blocks(text)?;
        let (label, der) = blocks
            .iter()
            .find(|(label, _)| label.ends_with("PRIVATE KEY"))
            .ok_or_else(|| Error::Key("no private key PEM block found".into()))?;
        return match label.as_str() {
            "PRIVATE KEY" => load_private_key_pkcs8_der(der),
            "RSA PRIVATE KEY" => load_rsa_pkcs1_der(der),
            other => Err(Error::Key(format!("unsupported private key PEM label: {other}"))),
        };
    }
    load_private_key_pkcs8_der(data).or_else(|_| load_rsa_pkcs1_der(data))
}

/// Load a private key from PKCS#8 DER bytes.
///
/// Tries RSA, then EC P-256 and P-384 in order.
fn load_private_key_pkcs8_der(der: &[u8]) -> Result<SigningKey> {
    use pkcs8::DecodePrivateKey;

    if let Ok(pk) = rsa::RsaPrivateKey::from_pkcs8_der(der) {
        return Ok(SigningKey::Rsa(pk));
    }
    if let Ok(sk) = p256::ecdsa::SigningKey::from_pkcs8_der(der) {
        return Ok(SigningKey::EcP256(sk));
    }
    if let Ok(sk) = p384::ecdsa::SigningKey::from_pkcs8_der(der) {
        return Ok(SigningKey::EcP384(sk));
    }
    Err(Error::Key("unsupported PKCS#8 private key".into()))
}

fn load_rsa_pkcs1_der(der: &[u8]) -> Result<SigningKey> {
    use pkcs1::DecodeRsaPrivateKey;
    rsa::RsaPrivateKey::from_pkcs1_der(der)
        .map(SigningKey::Rsa)
        .map_err(|e| Error::Key(format!("failed to parse RSA private key: {e}")))
}

/// Load a public key from SubjectPublicKeyInfo DER.
pub fn load_public_key_der(spki_der: &[u8]) -> Result<SigningKey> {
    use spki::DecodePublicKey;

    if let Ok(pk) = rsa::RsaPublicKey::from_public_key_der(spki_der) {
        return Ok(SigningKey::RsaPublic(pk));
    }
    if let Ok(vk) = p256::ecdsa::VerifyingKey::from_public_key_der(spki_der) {
        return Ok(SigningKey::EcP256Public(vk));
    }
    if let Ok(vk) = p384::ecdsa::VerifyingKey::from_public_key_der(spki_der) {
        return Ok(SigningKey::EcP384Public(vk));
    }
    Err(Error::Key("unsupported public key algorithm".into()))
}

/// Load DER objects from PEM blocks labelled `label`, or a single DER value.
pub fn load_pem_or_der(data: &[u8], label: &str) -> Result<Vec<Vec<u8>>> {
    let Some(text) = pem_text(data) else {
        return Ok(vec![data.to_vec()]);
    };
    let out: Vec<Vec<u8>> = pem_blocks(text)?
        .into_iter()
        .filter(|(l, _)| l == label)
        .map(|(_, der)| der)
        .collect();
    if out.is_empty() {
        return Err(Error::Key(format!("no {label} PEM block found")));
    }
    Ok(out)
}

/// Load one or more certificates (PEM bundle or a single DER certificate).
pub fn load_certificates(data: &[u8]) -> Result<Vec<Vec<u8>>> {
    let certs = load_pem_or_der(data, "CERTIFICATE")?;
    for der in &certs {
        cert::parse_certificate(der)?;
    }
    Ok(certs)
}

pub fn load_key_file(path: &Path) -> Result<SigningKey> {
    load_private_key(&std::fs::read(path)?)
}

pub fn load_certificate_file(path: &Path) -> Result<Vec<Vec<u8>>> {
    load_certificates(&std::fs::read(path)?)
}

/// Load a key file and the certificate files forming its chain, leaf first.
pub fn load_credential(key_path: &Path, cert_paths: &[&Path]) -> Result<Credential> {
    let key = load_key_file(key_path)?;
    let mut chain = Vec::new();
    for path in cert_paths {
        chain.extend(load_certificate_file(path)?);
    }
    Credential::new(key, chain)
}

const PEM_BEGIN: &str = "-----BEGIN ";
const PEM_DASHES: &str = "-----";

/// `data` as text when it carries at least one PEM block.
fn pem_text(data: &[u8]) -> Option<&str> {
    std::str::from_utf8(data)
        .ok()
        .filter(|text| text.contains(PEM_BEGIN))
}

/// Every PEM block of `text` with its label, in order. Text between blocks
/// is skipped.
fn pem_blocks(text: &str) -> Result<Vec<(String, Vec<u8>)>> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(PEM_BEGIN) {
        let tail = &rest[start..];
        let label_end = tail[PEM_BEGIN.len()..]
            .find(PEM_DASHES)
            .ok_or_else(|| Error::Key("malformed PEM header".into()))?;
        let label = &tail[PEM_BEGIN.len()..PEM_BEGIN.len() + label_end];
        let end = format!("-----END {label}-----");
        let stop = tail
            .find(&end)
            .ok_or_else(|| Error::Key(format!("unterminated {label} PEM block")))?
            + end.len();
        let (decoded_label, der) = pem_rfc7468::decode_vec(tail[..stop].as_bytes())
            .map_err(|e| Error::Key(format!("failed to decode PEM: {e}")))?;
        blocks.push((decoded_label.to_string(), der));
        rest = &tail[stop..];
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn pem(label: &str, der: &[u8]) -> String {
        pem_rfc7468::encode_string(label, pem_rfc7468::LineEnding::LF, der).unwrap()
    }

    #[test]
    fn certificate_bundle() {
        let pki = testing::pki();
        let bundle = format!(
            "leading text\n{}{}",
            pem("CERTIFICATE", pki.signer.signer_certificate()),
            pem("CERTIFICATE", &pki.ca_cert)
        );
        let certs = load_certificates(bundle.as_bytes()).unwrap();
        assert_eq!(certs, pki.signer.chain().to_vec());
        let single = load_certificates(&pki.ca_cert).unwrap();
        assert_eq!(single, vec![pki.ca_cert.clone()]);
    }

    #[test]
    fn pem_blocks_between_other_text() {
        let pki = testing::pki();
        let bundle = format!(
            "Subject: CN=Test Signer\r\n{}\nIssuer: CN=Test Root CA\n{}trailing\n",
            pem("CERTIFICATE", pki.signer.signer_certificate()),
            pem("CERTIFICATE", &pki.ca_cert)
        );
        assert_eq!(load_certificates(bundle.as_bytes()).unwrap(), pki.signer.chain().to_vec());

        // a key file that also carries its certificate
        let SigningKey::EcP256(sk) = pki.tsa.key() else {
            panic!("fixture authority is P-256");
        };
        use pkcs8::EncodePrivateKey;
        let key = sk.to_pkcs8_der().unwrap();
        let combined = format!(
            "# authority\n{}{}",
            pem("CERTIFICATE", pki.tsa.signer_certificate()),
            pem("PRIVATE KEY", key.as_bytes())
        );
        assert!(!load_private_key(combined.as_bytes()).unwrap().is_rsa());
        assert!(load_pem_or_der(combined.as_bytes(), "X509 CRL").is_err());
    }

    #[test]
    fn pkcs8_keys_round_trip_through_files() {
        use pkcs8::EncodePrivateKey;
        let pki = testing::pki();
        let SigningKey::Rsa(rsa_key) = pki.signer.key() else {
            panic!("fixture signer is RSA");
        };
        let der = rsa_key.to_pkcs8_der().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("signer.key");
        let cert_path = dir.path().join("signer.pem");
        std::fs::write(&key_path, pem("PRIVATE KEY", der.as_bytes())).unwrap();
        std::fs::write(
            &cert_path,
            format!(
                "{}{}",
                pem("CERTIFICATE", pki.signer.signer_certificate()),
                pem("CERTIFICATE", &pki.ca_cert)
            ),
        )
        .unwrap();
        let cred = load_credential(&key_path, &[cert_path.as_path()]).unwrap();
        assert!(cred.key().is_rsa());
        assert_eq!(cred.chain().len(), 2);

        let raw = load_private_key(der.as_bytes()).unwrap();
        assert!(raw.is_private());
    }

    #[test]
    fn unknown_label_rejected() {
        let text = pem("ENCRYPTED PRIVATE KEY", &[0x30, 0x00]);
        assert!(matches!(load_private_key(text.as_bytes()), Err(Error::Key(_))));
        assert!(load_certificates(b"-----BEGIN CERTIFICATE-----\nAAAA").is_err());
    }
}
