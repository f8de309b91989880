#![forbid(unsafe_code)]

//! Certificate accessors used by the signature layer.

use chrono::{DateTime, Utc};
use der::{Decode, Encode};
use dss_core::{Error, Result};
use dss_crypto::sign::{self, SignatureFormat};
use dss_crypto::{DigestAlgo, SigningKey};
use x509_cert::crl::CertificateList;
use x509_cert::Certificate;

/// Parse a DER certificate.
pub fn parse_certificate(der: &[u8]) -> Result<Certificate> {
    Certificate::from_der(der)
        .map_err(|e| Error::Certificate(format!("failed to parse certificate: {e}")))
}

/// RFC 4514 string of the subject name.
pub fn subject_name(cert: &Certificate) -> String {
    cert.tbs_certificate.subject.to_string()
}

/// RFC 4514 string of the issuer name.
pub fn issuer_name(cert: &Certificate) -> String {
    cert.tbs_certificate.issuer.to_string()
}

pub fn subject_der(cert: &Certificate) -> Result<Vec<u8>> {
    cert.tbs_certificate
        .subject
        .to_der()
        .map_err(|e| Error::Certificate(format!("failed to encode subject: {e}")))
}

pub fn issuer_der(cert: &Certificate) -> Result<Vec<u8>> {
    cert.tbs_certificate
        .issuer
        .to_der()
        .map_err(|e| Error::Certificate(format!("failed to encode issuer: {e}")))
}

/// Serial number magnitude, leading zero octets removed.
pub fn serial_bytes(cert: &Certificate) -> Vec<u8> {
    strip_leading_zeros(cert.tbs_certificate.serial_number.as_bytes())
}

/// Serial number as a decimal string, as written in `ds:X509SerialNumber`.
pub fn serial_decimal(cert: &Certificate) -> String {
    format_serial_decimal(cert.tbs_certificate.serial_number.as_bytes())
}

fn strip_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    bytes[skip.min(bytes.len().saturating_sub(1))..].to_vec()
}

/// Decimal rendering of an unsigned big-endian integer.
pub fn format_serial_decimal(bytes: &[u8]) -> String {
    // little-endian decimal digits
    let mut digits = vec![0u8];
    for &byte in bytes {
        let mut carry = byte as u32;
        for d in digits.iter_mut() {
            let v = *d as u32 * 256 + carry;
            *d = (v % 10) as u8;
            carry = v / 10;
        }
        while carry > 0 {
            digits.push((carry % 10) as u8);
            carry /= 10;
        }
    }
    while digits.len() > 1 && digits.last() == Some(&0) {
        digits.pop();
    }
    digits.iter().rev().map(|d| char::from(b'0' + d)).collect()
}

/// Digest of the DER certificate.
pub fn certificate_digest(der: &[u8], algo: DigestAlgo) -> Vec<u8> {
    algo.digest(der)
}

/// Raw subject public key bits, as hashed into OCSP `CertID`s.
pub fn public_key_bits(cert: &Certificate) -> &[u8] {
    cert.tbs_certificate
        .subject_public_key_info
        .subject_public_key
        .raw_bytes()
}

/// The subject public key as a verification key.
pub fn public_key(cert: &Certificate) -> Result<SigningKey> {
    let spki_der = cert
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| Error::Certificate(format!("failed to encode SPKI: {e}")))?;
    crate::loader::load_public_key_der(&spki_der)
}

pub fn not_before(cert: &Certificate) -> Result<DateTime<Utc>> {
    time_to_chrono(&cert.tbs_certificate.validity.not_before)
}

pub fn not_after(cert: &Certificate) -> Result<DateTime<Utc>> {
    time_to_chrono(&cert.tbs_certificate.validity.not_after)
}

pub(crate) fn time_to_chrono(t: &x509_cert::time::Time) -> Result<DateTime<Utc>> {
    let secs = t.to_unix_duration().as_secs();
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::<Utc>::from_timestamp(s, 0))
        .ok_or_else(|| Error::Certificate(format!("time out of range: {t:?}")))
}

/// Whether `cert` is within its validity period at `at`.
pub fn check_validity(cert: &Certificate, at: DateTime<Utc>) -> Result<()> {
    let nb = not_before(cert)?;
    let na = not_after(cert)?;
    if at < nb {
        return Err(Error::Certificate(format!(
            "certificate {} is not yet valid at {at} (notBefore: {nb})",
            subject_name(cert)
        )));
    }
    if at > na {
        return Err(Error::Certificate(format!(
            "certificate {} has expired at {at} (notAfter: {na})",
            subject_name(cert)
        )));
    }
    Ok(())
}

/// Verify a signature over `tbs` made with the algorithm `alg` by `issuer`.
fn verify_signed(
    tbs: &[u8],
    alg: &der::asn1::ObjectIdentifier,
    signature: &[u8],
    issuer: &Certificate,
) -> Result<bool> {
    let digest = sign::digest_of_signature_oid(alg)?;
    let key = public_key(issuer)?;
    sign::verify_prehash(&key, digest, &digest.digest(tbs), signature, SignatureFormat::Der)
}

/// Check that `cert` was signed by the key of `issuer`.
pub fn verify_issued_by(cert: &Certificate, issuer: &Certificate) -> Result<()> {
    if cert.tbs_certificate.issuer != issuer.tbs_certificate.subject {
        return Err(Error::Certificate(format!(
            "{} is not the issuer of {}",
            subject_name(issuer),
            subject_name(cert)
        )));
    }
    let tbs = cert
        .tbs_certificate
        .to_der()
        .map_err(|e| Error::Certificate(format!("failed to encode TBS: {e}")))?;
    let sig = cert
        .signature
        .as_bytes()
        .ok_or_else(|| Error::Certificate("no signature bytes".into()))?;
    if !verify_signed(&tbs, &cert.signature_algorithm.oid, sig, issuer)? {
        return Err(Error::Certificate(format!(
            "signature of {} does not verify under {}",
            subject_name(cert),
            subject_name(issuer)
        )));
    }
    Ok(())
}

// ── CRLs ─────────────────────────────────────────────────────────────

/// A parsed CRL with its raw encoding.
#[derive(Debug, Clone)]
pub struct Crl {
    der: Vec<u8>,
    list: CertificateList,
}

impl Crl {
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let list = CertificateList::from_der(der)
            .map_err(|e| Error::Revocation(format!("failed to parse CRL: {e}")))?;
        Ok(Self {
            der: der.to_vec(),
            list,
        })
    }

    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    pub fn issuer_name(&self) -> String {
        self.list.tbs_cert_list.issuer.to_string()
    }

    pub fn this_update(&self) -> Result<DateTime<Utc>> {
        time_to_chrono(&self.list.tbs_cert_list.this_update)
    }

    /// Whether this CRL was issued by the subject of `issuer`.
    pub fn is_issued_by(&self, issuer: &Certificate) -> bool {
        self.list.tbs_cert_list.issuer == issuer.tbs_certificate.subject
    }

    pub fn verify_signature(&self, issuer: &Certificate) -> Result<()> {
        let tbs = self
            .list
            .tbs_cert_list
            .to_der()
            .map_err(|e| Error::Revocation(format!("failed to encode CRL: {e}")))?;
        let sig = self
            .list
            .signature
            .as_bytes()
            .ok_or_else(|| Error::Revocation("CRL has no signature bytes".into()))?;
        if !verify_signed(&tbs, &self.list.signature_algorithm.oid, sig, issuer)? {
            return Err(Error::Revocation(format!(
                "CRL signature does not verify under {}",
                subject_name(issuer)
            )));
        }
        Ok(())
    }

    /// Revocation time of `cert` when it is listed.
    pub fn revocation_of(&self, cert: &Certificate) -> Result<Option<DateTime<Utc>>> {
        let Some(revoked) = &self.list.tbs_cert_list.revoked_certificates else {
            return Ok(None);
        };
        for entry in revoked {
            if entry.serial_number == cert.tbs_certificate.serial_number {
                return time_to_chrono(&entry.revocation_date).map(Some);
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn serial_to_decimal() {
        assert_eq!(format_serial_decimal(&[]), "0");
        assert_eq!(format_serial_decimal(&[0x00]), "0");
        assert_eq!(format_serial_decimal(&[0x01, 0x00]), "256");
        assert_eq!(
            format_serial_decimal(&[0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]),
            "18446744073709551616"
        );
    }

    #[test]
    fn fixture_certificate_accessors() {
        let pki = testing::pki();
        let leaf = parse_certificate(pki.signer.signer_certificate()).unwrap();
        let ca = parse_certificate(&pki.ca_cert).unwrap();
        assert!(subject_name(&leaf).contains("Test Signer"));
        assert_eq!(issuer_name(&leaf), subject_name(&ca));
        assert_eq!(serial_bytes(&leaf), vec![0x10, 0x01]);
        assert_eq!(serial_decimal(&leaf), "4097");
        verify_issued_by(&leaf, &ca).unwrap();
        assert!(verify_issued_by(&ca, &leaf).is_err());
        check_validity(&leaf, Utc::now()).unwrap();
        assert!(check_validity(&leaf, not_after(&leaf).unwrap() + chrono::Duration::days(1)).is_err());
        assert!(public_key(&leaf).unwrap().is_rsa());
    }

    #[test]
    fn crl_lookup() {
        let pki = testing::pki();
        let revoked_at = Utc::now() - chrono::Duration::hours(1);
        let leaf = parse_certificate(pki.signer.signer_certificate()).unwrap();
        let ca = parse_certificate(&pki.ca_cert).unwrap();
        let crl = Crl::from_der(&testing::crl(pki, &[(serial_bytes(&leaf), revoked_at)])).unwrap();
        assert!(crl.is_issued_by(&ca));
        crl.verify_signature(&ca).unwrap();
        let at = crl.revocation_of(&leaf).unwrap().unwrap();
        assert_eq!(at.timestamp(), revoked_at.timestamp());
        let empty = Crl::from_der(&testing::crl(pki, &[])).unwrap();
        assert_eq!(empty.revocation_of(&leaf).unwrap(), None);
    }
}
