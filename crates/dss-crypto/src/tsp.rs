#![forbid(unsafe_code)]

//! RFC 3161 time-stamp tokens.
//!
//! A token is a CMS `ContentInfo` wrapping `SignedData` whose encapsulated
//! content is a DER `TSTInfo`. This module parses tokens, checks the
//! message imprint and the signer's signature, and builds tokens for a
//! locally operated time-stamp authority.

use chrono::{DateTime, Utc};
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedAttributes, SignedData, SignerIdentifier,
    SignerInfo, SignerInfos,
};
use der::asn1::{Any, ObjectIdentifier, OctetString, SetOfVec, Uint};
use der::{Decode, Encode, Tag};
use dss_core::{Error, Result};
use x509_cert::attr::Attribute;
use x509_cert::Certificate;
use x509_tsp::{MessageImprint, TspVersion};

pub use x509_tsp::TstInfo;

use crate::digest::DigestAlgo;
use crate::sign::{self, SignatureFormat, SigningKey};

pub const ID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
pub const ID_CT_TST_INFO: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.1.4");
pub const ID_CONTENT_TYPE: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.3");
pub const ID_MESSAGE_DIGEST: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");
/// Policy used by tokens of the local authority.
pub const LOCAL_TSA_POLICY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.99999.1.1");

fn asn1_err(e: der::Error) -> Error {
    Error::Timestamp(format!("malformed time-stamp token: {e}"))
}

/// `TSTInfo` stamping `data` at `gen_time`.
pub fn tst_info(
    policy: ObjectIdentifier,
    imprint_algorithm: DigestAlgo,
    data: &[u8],
    serial: &[u8],
    gen_time: DateTime<Utc>,
) -> Result<TstInfo> {
    Ok(TstInfo {
        version: TspVersion::V1,
        policy,
        message_imprint: MessageImprint {
            hash_algorithm: imprint_algorithm.algorithm_identifier(),
            hashed_message: OctetString::new(imprint_algorithm.digest(data)).map_err(asn1_err)?,
        },
        serial_number: positive_integer(serial).map_err(asn1_err)?,
        gen_time: crate::generalized_time(gen_time).map_err(asn1_err)?,
        accuracy: None,
        ordering: false,
        nonce: None,
        tsa: None,
        extensions: None,
    })
}

/// A positive INTEGER from its big-endian magnitude, decoded as the
/// integer type the target field declares.
fn positive_integer<T: for<'a> Decode<'a>>(magnitude: &[u8]) -> der::Result<T> {
    T::from_der(&Uint::new(magnitude)?.to_der()?)
}

/// A parsed RFC 3161 time-stamp token.
#[derive(Debug, Clone)]
pub struct TimeStampToken {
    der: Vec<u8>,
    signed_data: SignedData,
    /// DER `TSTInfo`, the content octets of `eContent`.
    e_content: Vec<u8>,
    tst_info: TstInfo,
    gen_time: DateTime<Utc>,
}

impl TimeStampToken {
    pub fn from_der(data: &[u8]) -> Result<Self> {
        let content_info = ContentInfo::from_der(data).map_err(asn1_err)?;
        if content_info.content_type != ID_SIGNED_DATA {
            return Err(Error::Timestamp("token is not CMS SignedData".into()));
        }
        let signed_data = content_info
            .content
            .decode_as::<SignedData>()
            .map_err(asn1_err)?;

        let encap = &signed_data.encap_content_info;
        if encap.econtent_type != ID_CT_TST_INFO {
            return Err(Error::Timestamp("encapsulated content is not TSTInfo".into()));
        }
        let e_content = encap
            .econtent
            .as_ref()
            .ok_or_else(|| Error::Timestamp("token carries no TSTInfo".into()))?
            .decode_as::<OctetString>()
            .map_err(asn1_err)?
            .as_bytes()
            .to_vec();
        let tst_info = TstInfo::from_der(&e_content).map_err(asn1_err)?;
        let gen_time = crate::from_generalized_time(&tst_info.gen_time)
            .ok_or_else(|| Error::Timestamp("genTime out of range".into()))?;

        let signers = signed_data.signer_infos.0.len();
        if signers != 1 {
            return Err(Error::Timestamp(format!("expected one SignerInfo, found {signers}")));
        }
        Ok(Self {
            der: data.to_vec(),
            signed_data,
            e_content,
            tst_info,
            gen_time,
        })
    }

    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    pub fn tst_info(&self) -> &TstInfo {
        &self.tst_info
    }

    pub fn gen_time(&self) -> DateTime<Utc> {
        self.gen_time
    }

    /// Serial number magnitude.
    pub fn serial(&self) -> Vec<u8> {
        crate::magnitude(self.tst_info.serial_number.as_bytes())
    }

    /// Certificates carried in the token.
    pub fn certificates(&self) -> impl Iterator<Item = &Certificate> {
        self.signed_data
            .certificates
            .iter()
            .flat_map(|set| set.0.iter())
            .filter_map(|choice| match choice {
                CertificateChoices::Certificate(c) => Some(c),
                _ => None,
            })
    }

    /// The signer's certificate followed by the other certificates of the
    /// token, DER encoded.
    pub fn certificate_chain(&self) -> Result<Vec<Vec<u8>>> {
        let id = self.signer_id()?;
        let mut leaf = None;
        let mut rest = Vec::new();
        for cert in self.certificates() {
            let der = cert.to_der().map_err(asn1_err)?;
            let tbs = &cert.tbs_certificate;
            if leaf.is_none() && tbs.issuer == id.issuer && tbs.serial_number == id.serial_number {
                leaf = Some(der);
            } else {
                rest.push(der);
            }
        }
        let leaf = leaf
            .ok_or_else(|| Error::Timestamp("token does not carry its signer certificate".into()))?;
        let mut chain = vec![leaf];
        chain.extend(rest);
        Ok(chain)
    }

    fn signer_info(&self) -> Result<&SignerInfo> {
        self.signed_data
            .signer_infos
            .0
            .iter()
            .next()
            .ok_or_else(|| Error::Timestamp("token has no SignerInfo".into()))
    }

    fn signer_id(&self) -> Result<&IssuerAndSerialNumber> {
        match &self.signer_info()?.sid {
            SignerIdentifier::IssuerAndSerialNumber(id) => Ok(id),
            SignerIdentifier::SubjectKeyIdentifier(_) => Err(Error::Timestamp(
                "only issuerAndSerialNumber signer identifiers are supported".into(),
            )),
        }
    }

    /// Check that the token's message imprint covers `data`.
    pub fn check_imprint(&self, data: &[u8]) -> Result<()> {
        let imprint = &self.tst_info.message_imprint;
        let algo = DigestAlgo::from_oid(&imprint.hash_algorithm.oid)?;
        if algo.digest(data) != imprint.hashed_message.as_bytes() {
            return Err(Error::Timestamp("message imprint does not match".into()));
        }
        Ok(())
    }

    /// Verify the token signature with the signer's public key.
    pub fn verify_signature(&self, key: &SigningKey) -> Result<()> {
        let signer = self.signer_info()?;
        let digest = DigestAlgo::from_oid(&signer.digest_alg.oid)?;
        let signed = match &signer.signed_attrs {
            Some(attrs) => {
                let md = attrs
                    .iter()
                    .find(|a| a.oid == ID_MESSAGE_DIGEST)
                    .and_then(|a| a.values.iter().next())
                    .ok_or_else(|| Error::Timestamp("signed attributes lack messageDigest".into()))?
                    .decode_as::<OctetString>()
                    .map_err(asn1_err)?;
                if md.as_bytes() != digest.digest(&self.e_content).as_slice() {
                    return Err(Error::Timestamp("messageDigest does not match TSTInfo".into()));
                }
                attrs.to_der().map_err(asn1_err)?
            }
            None => self.e_content.clone(),
        };
        let ok = sign::verify_prehash(
            key,
            digest,
            &digest.digest(&signed),
            signer.signature.as_bytes(),
            SignatureFormat::Der,
        )?;
        if !ok {
            return Err(Error::Timestamp("time-stamp token signature is invalid".into()));
        }
        Ok(())
    }
}

// ── Building ─────────────────────────────────────────────────────────

/// Signing material of a time-stamp authority.
pub struct TsaSigner<'a> {
    pub key: &'a SigningKey,
    /// DER certificate of the authority, embedded in the token.
    pub certificate: &'a [u8],
    pub digest: DigestAlgo,
}

/// Build a signed token over `tst_info`.
///
/// The signer info carries `contentType` and `messageDigest` signed
/// attributes and identifies the authority by issuer and serial number.
pub fn build_token(tst_info: &TstInfo, signer: &TsaSigner<'_>) -> Result<Vec<u8>> {
    let certificate = Certificate::from_der(signer.certificate).map_err(asn1_err)?;
    let e_content = tst_info.to_der().map_err(asn1_err)?;
    let digest = signer.digest;

    let signed_attrs: SignedAttributes = SetOfVec::try_from(vec![
        attribute(ID_CONTENT_TYPE, &ID_CT_TST_INFO).map_err(asn1_err)?,
        attribute(
            ID_MESSAGE_DIGEST,
            &OctetString::new(digest.digest(&e_content)).map_err(asn1_err)?,
        )
        .map_err(asn1_err)?,
    ])
    .map_err(asn1_err)?;
    let signature = sign::sign_prehash(
        signer.key,
        digest,
        &digest.digest(&signed_attrs.to_der().map_err(asn1_err)?),
        SignatureFormat::Der,
    )?;

    let signer_info = SignerInfo {
        version: CmsVersion::V1,
        sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
            issuer: certificate.tbs_certificate.issuer.clone(),
            serial_number: certificate.tbs_certificate.serial_number.clone(),
        }),
        digest_alg: digest.algorithm_identifier(),
        signed_attrs: Some(signed_attrs),
        signature_algorithm: sign::x509_signature_algorithm(signer.key, digest),
        signature: OctetString::new(signature).map_err(asn1_err)?,
        unsigned_attrs: None,
    };
    let signed_data = SignedData {
        version: CmsVersion::V3,
        digest_algorithms: SetOfVec::try_from(vec![digest.algorithm_identifier()])
            .map_err(asn1_err)?,
        encap_content_info: EncapsulatedContentInfo {
            econtent_type: ID_CT_TST_INFO,
            econtent: Some(Any::new(Tag::OctetString, e_content).map_err(asn1_err)?),
        },
        certificates: Some(CertificateSet(
            SetOfVec::try_from(vec![CertificateChoices::Certificate(certificate)])
                .map_err(asn1_err)?,
        )),
        crls: None,
        signer_infos: SignerInfos(SetOfVec::try_from(vec![signer_info]).map_err(asn1_err)?),
    };

    ContentInfo {
        content_type: ID_SIGNED_DATA,
        content: any(&signed_data).map_err(asn1_err)?,
    }
    .to_der()
    .map_err(asn1_err)
}

fn any<T: Encode>(value: &T) -> der::Result<Any> {
    Any::from_der(&value.to_der()?)
}

fn attribute<T: Encode>(oid: ObjectIdentifier, value: &T) -> der::Result<Attribute> {
    Ok(Attribute {
        oid,
        values: SetOfVec::try_from(vec![any(value)?])?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use der::asn1::{BitString, UtcTime};
    use std::str::FromStr;
    use std::time::Duration;
    use x509_cert::name::Name;
    use x509_cert::serial_number::SerialNumber;
    use x509_cert::spki::{EncodePublicKey, SubjectPublicKeyInfoOwned};
    use x509_cert::time::{Time, Validity};
    use x509_cert::{TbsCertificate, Version};

    fn tsa_key() -> SigningKey {
        SigningKey::EcP256(p256::ecdsa::SigningKey::random(&mut rand::thread_rng()))
    }

    /// Self-signed certificate for `key`, a P-256 signing key.
    pub(crate) fn self_signed(key: &SigningKey, cn: &str, serial: &[u8]) -> Vec<u8> {
        let SigningKey::EcP256(sk) = key else {
            panic!("P-256 key expected");
        };
        let spki = sk.verifying_key().to_public_key_der().unwrap();
        let name = Name::from_str(&format!("CN={cn}")).unwrap();
        let at = |secs| Time::UtcTime(UtcTime::from_unix_duration(Duration::from_secs(secs)).unwrap());
        let alg = sign::x509_signature_algorithm(key, DigestAlgo::Sha256);
        let tbs = TbsCertificate {
            version: Version::V3,
            serial_number: SerialNumber::new(serial).unwrap(),
            signature: alg.clone(),
            issuer: name.clone(),
            validity: Validity {
                not_before: at(1_700_000_000),
                not_after: at(1_900_000_000),
            },
            subject: name,
            subject_public_key_info: SubjectPublicKeyInfoOwned::from_der(spki.as_bytes()).unwrap(),
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: None,
        };
        let hash = DigestAlgo::Sha256.digest(&tbs.to_der().unwrap());
        let sig = sign::sign_prehash(key, DigestAlgo::Sha256, &hash, SignatureFormat::Der).unwrap();
        Certificate {
            tbs_certificate: tbs,
            signature_algorithm: alg,
            signature: BitString::from_bytes(&sig).unwrap(),
        }
        .to_der()
        .unwrap()
    }

    fn token_over(data: &[u8], key: &SigningKey) -> Vec<u8> {
        let info = tst_info(
            LOCAL_TSA_POLICY,
            DigestAlgo::Sha256,
            data,
            &[0x01, 0x02],
            Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap(),
        )
        .unwrap();
        let cert = self_signed(key, "Test TSA", &[0x2a]);
        let signer = TsaSigner {
            key,
            certificate: &cert,
            digest: DigestAlgo::Sha256,
        };
        build_token(&info, &signer).unwrap()
    }

    #[test]
    fn local_token_parses_and_verifies() {
        let key = tsa_key();
        let der = token_over(b"signature value", &key);
        let token = TimeStampToken::from_der(&der).unwrap();
        assert_eq!(token.gen_time(), Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap());
        assert_eq!(token.serial(), vec![0x01, 0x02]);
        assert_eq!(token.tst_info().policy, LOCAL_TSA_POLICY);
        assert_eq!(token.certificates().count(), 1);
        let chain = token.certificate_chain().unwrap();
        let leaf = Certificate::from_der(&chain[0]).unwrap();
        assert_eq!(leaf.tbs_certificate.serial_number.as_bytes(), &[0x2a]);
        token.check_imprint(b"signature value").unwrap();
        token.verify_signature(&key.public()).unwrap();
        assert_eq!(token.as_der(), der.as_slice());
    }

    #[test]
    fn imprint_mismatch_detected() {
        let key = tsa_key();
        let token = TimeStampToken::from_der(&token_over(b"a", &key)).unwrap();
        assert!(matches!(token.check_imprint(b"b"), Err(Error::Timestamp(_))));
    }

    #[test]
    fn wrong_key_rejected() {
        let token = TimeStampToken::from_der(&token_over(b"a", &tsa_key())).unwrap();
        assert!(token.verify_signature(&tsa_key().public()).is_err());
    }

    #[test]
    fn large_serials_keep_their_magnitude() {
        let serial = [0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1];
        let info = tst_info(LOCAL_TSA_POLICY, DigestAlgo::Sha1, b"x", &serial, Utc::now()).unwrap();
        let reparsed = TstInfo::from_der(&info.to_der().unwrap()).unwrap();
        assert_eq!(crate::magnitude(reparsed.serial_number.as_bytes()), serial.to_vec());
    }

    #[test]
    fn garbage_is_not_a_token() {
        assert!(TimeStampToken::from_der(b"\x30\x03\x02\x01\x01").is_err());
        assert!(TimeStampToken::from_der(&[]).is_err());
    }
}
