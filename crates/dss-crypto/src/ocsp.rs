#![forbid(unsafe_code)]

//! OCSP responses (RFC 6960).
//!
//! Only the `id-pkix-ocsp-basic` response type is understood. Responses
//! are kept together with their raw encoding so they can be embedded
//! verbatim in `RevocationValues`.

use chrono::{DateTime, Utc};
use der::asn1::{BitString, GeneralizedTime, Null, ObjectIdentifier, OctetString};
use der::{Choice, Decode, Encode, Enumerated, Sequence};
use dss_core::{Error, Result};
use x509_cert::ext::pkix::CrlReason;
use x509_cert::ext::Extensions;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::AlgorithmIdentifierOwned;
use x509_cert::Certificate;

use crate::digest::DigestAlgo;
use crate::sign::{self, SignatureFormat, SigningKey};

pub const ID_PKIX_OCSP_BASIC: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.48.1.1");

fn asn1_err(e: der::Error) -> Error {
    Error::Revocation(format!("malformed OCSP response: {e}"))
}

fn time(t: &GeneralizedTime) -> Result<DateTime<Utc>> {
    crate::from_generalized_time(t).ok_or_else(|| Error::Revocation("OCSP time out of range".into()))
}

// ── ASN.1 ────────────────────────────────────────────────────────────

/// `OCSPResponseStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Enumerated)]
#[repr(u32)]
pub enum ResponseStatus {
    Successful = 0,
    MalformedRequest = 1,
    InternalError = 2,
    TryLater = 3,
    SigRequired = 5,
    Unauthorized = 6,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct OcspResponseAsn1 {
    response_status: ResponseStatus,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    response_bytes: Option<ResponseBytes>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct ResponseBytes {
    response_type: ObjectIdentifier,
    response: OctetString,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct BasicOcspResponse {
    tbs_response_data: ResponseData,
    signature_algorithm: AlgorithmIdentifierOwned,
    signature: BitString,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    certs: Option<Vec<Certificate>>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct ResponseData {
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", default = "Default::default")]
    version: u8,
    responder_id: ResponderIdAsn1,
    produced_at: GeneralizedTime,
    responses: Vec<SingleResponseAsn1>,
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", optional = "true")]
    response_extensions: Option<Extensions>,
}

#[derive(Clone, Debug, Eq, PartialEq, Choice)]
enum ResponderIdAsn1 {
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", constructed = "true")]
    ByName(Name),
    #[asn1(context_specific = "2", tag_mode = "EXPLICIT", constructed = "true")]
    ByKey(OctetString),
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct SingleResponseAsn1 {
    cert_id: CertIdAsn1,
    cert_status: CertStatusAsn1,
    this_update: GeneralizedTime,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    next_update: Option<GeneralizedTime>,
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", optional = "true")]
    single_extensions: Option<Extensions>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct CertIdAsn1 {
    hash_algorithm: AlgorithmIdentifierOwned,
    issuer_name_hash: OctetString,
    issuer_key_hash: OctetString,
    serial_number: SerialNumber,
}

#[derive(Clone, Debug, Eq, PartialEq, Choice)]
enum CertStatusAsn1 {
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT")]
    Good(Null),
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT", constructed = "true")]
    Revoked(RevokedInfo),
    #[asn1(context_specific = "2", tag_mode = "IMPLICIT")]
    Unknown(Null),
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct RevokedInfo {
    revocation_time: GeneralizedTime,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    revocation_reason: Option<CrlReason>,
}

// ── Parsed responses ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponderId {
    /// DER `Name` of the responder.
    ByName(Vec<u8>),
    /// SHA-1 of the responder's public key bits.
    ByKey(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertStatus {
    Good,
    Revoked(DateTime<Utc>),
    Unknown,
}

/// The `CertID` of a single response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertId {
    pub hash_algorithm: DigestAlgo,
    pub issuer_name_hash: Vec<u8>,
    pub issuer_key_hash: Vec<u8>,
    /// Serial number magnitude.
    pub serial: Vec<u8>,
}

impl CertId {
    /// Build a `CertID` from the issuer's DER subject name and public key bits.
    pub fn new(
        hash_algorithm: DigestAlgo,
        issuer_name: &[u8],
        issuer_key_bits: &[u8],
        serial: &[u8],
    ) -> Self {
        Self {
            hash_algorithm,
            issuer_name_hash: hash_algorithm.digest(issuer_name),
            issuer_key_hash: hash_algorithm.digest(issuer_key_bits),
            serial: crate::magnitude(serial),
        }
    }

    fn from_asn1(id: &CertIdAsn1) -> Result<Self> {
        Ok(Self {
            hash_algorithm: DigestAlgo::from_oid(&id.hash_algorithm.oid)?,
            issuer_name_hash: id.issuer_name_hash.as_bytes().to_vec(),
            issuer_key_hash: id.issuer_key_hash.as_bytes().to_vec(),
            serial: crate::magnitude(id.serial_number.as_bytes()),
        })
    }

    fn to_asn1(&self) -> der::Result<CertIdAsn1> {
        Ok(CertIdAsn1 {
            hash_algorithm: self.hash_algorithm.algorithm_identifier(),
            issuer_name_hash: OctetString::new(self.issuer_name_hash.clone())?,
            issuer_key_hash: OctetString::new(self.issuer_key_hash.clone())?,
            serial_number: SerialNumber::new(&self.serial)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleResponse {
    pub cert_id: CertId,
    pub status: CertStatus,
    pub this_update: DateTime<Utc>,
}

impl SingleResponse {
    fn from_asn1(single: &SingleResponseAsn1) -> Result<Self> {
        let status = match &single.cert_status {
            CertStatusAsn1::Good(_) => CertStatus::Good,
            CertStatusAsn1::Revoked(info) => CertStatus::Revoked(time(&info.revocation_time)?),
            CertStatusAsn1::Unknown(_) => CertStatus::Unknown,
        };
        Ok(Self {
            cert_id: CertId::from_asn1(&single.cert_id)?,
            status,
            this_update: time(&single.this_update)?,
        })
    }

    fn to_asn1(&self) -> der::Result<SingleResponseAsn1> {
        let cert_status = match self.status {
            CertStatus::Good => CertStatusAsn1::Good(Null),
            CertStatus::Revoked(at) => CertStatusAsn1::Revoked(RevokedInfo {
                revocation_time: crate::generalized_time(at)?,
                revocation_reason: None,
            }),
            CertStatus::Unknown => CertStatusAsn1::Unknown(Null),
        };
        Ok(SingleResponseAsn1 {
            cert_id: self.cert_id.to_asn1()?,
            cert_status,
            this_update: crate::generalized_time(self.this_update)?,
            next_update: None,
            single_extensions: None,
        })
    }
}

/// A parsed OCSP response.
#[derive(Debug, Clone)]
pub struct OcspResponse {
    raw: Vec<u8>,
    status: ResponseStatus,
    basic: Option<Basic>,
}

#[derive(Debug, Clone)]
struct Basic {
    /// DER `ResponseData`, the signed part.
    tbs: Vec<u8>,
    responder: ResponderId,
    produced_at: DateTime<Utc>,
    responses: Vec<SingleResponse>,
    signature_algorithm: ObjectIdentifier,
    signature: Vec<u8>,
    certificates: Vec<Vec<u8>>,
}

impl OcspResponse {
    pub fn from_der(data: &[u8]) -> Result<Self> {
        let response = OcspResponseAsn1::from_der(data).map_err(asn1_err)?;
        let basic = match &response.response_bytes {
            Some(bytes) if bytes.response_type == ID_PKIX_OCSP_BASIC => {
                Some(Basic::parse(bytes.response.as_bytes())?)
            }
            Some(_) => return Err(Error::Revocation("unsupported OCSP response type".into())),
            None => None,
        };
        Ok(Self {
            raw: data.to_vec(),
            status: response.response_status,
            basic,
        })
    }

    pub fn as_der(&self) -> &[u8] {
        &self.raw
    }

    pub fn status(&self) -> ResponseStatus {
        self.status
    }

    fn basic(&self) -> Result<&Basic> {
        self.basic
            .as_ref()
            .ok_or_else(|| Error::Revocation(format!("OCSP response status {:?}", self.status)))
    }

    pub fn responder(&self) -> Result<&ResponderId> {
        Ok(&self.basic()?.responder)
    }

    pub fn produced_at(&self) -> Result<DateTime<Utc>> {
        Ok(self.basic()?.produced_at)
    }

    pub fn responses(&self) -> &[SingleResponse] {
        self.basic.as_ref().map(|b| b.responses.as_slice()).unwrap_or(&[])
    }

    /// DER certificates carried in the response.
    pub fn certificates(&self) -> &[Vec<u8>] {
        self.basic.as_ref().map(|b| b.certificates.as_slice()).unwrap_or(&[])
    }

    /// The single response whose `CertID` matches `id`.
    pub fn find(&self, id: &CertId) -> Option<&SingleResponse> {
        self.responses().iter().find(|r| r.cert_id == *id)
    }

    /// Verify the response signature with the responder's public key.
    pub fn verify_signature(&self, key: &SigningKey) -> Result<()> {
        let basic = self.basic()?;
        let digest = sign::digest_of_signature_oid(&basic.signature_algorithm)?;
        let ok = sign::verify_prehash(
            key,
            digest,
            &digest.digest(&basic.tbs),
            &basic.signature,
            SignatureFormat::Der,
        )?;
        if !ok {
            return Err(Error::Revocation("OCSP response signature is invalid".into()));
        }
        Ok(())
    }
}

impl Basic {
    fn parse(der: &[u8]) -> Result<Self> {
        let basic = BasicOcspResponse::from_der(der).map_err(asn1_err)?;
        let data = &basic.tbs_response_data;
        let responder = match &data.responder_id {
            ResponderIdAsn1::ByName(name) => ResponderId::ByName(name.to_der().map_err(asn1_err)?),
            ResponderIdAsn1::ByKey(hash) => ResponderId::ByKey(hash.as_bytes().to_vec()),
        };
        let signature = basic
            .signature
            .as_bytes()
            .ok_or_else(|| Error::Revocation("signature is not an octet-aligned BIT STRING".into()))?
            .to_vec();
        let certificates = basic
            .certs
            .iter()
            .flatten()
            .map(|c| c.to_der().map_err(asn1_err))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            tbs: data.to_der().map_err(asn1_err)?,
            responder,
            produced_at: time(&data.produced_at)?,
            responses: data
                .responses
                .iter()
                .map(SingleResponse::from_asn1)
                .collect::<Result<Vec<_>>>()?,
            signature_algorithm: basic.signature_algorithm.oid,
            signature,
            certificates,
        })
    }
}

// ── Building ─────────────────────────────────────────────────────────

/// Signing material of an OCSP responder.
pub struct Responder<'a> {
    pub key: &'a SigningKey,
    /// DER `Name` of the responder certificate's subject.
    pub name: &'a [u8],
    /// DER certificates to embed.
    pub certificates: &'a [Vec<u8>],
    pub digest: DigestAlgo,
}

/// Build a successful basic OCSP response.
pub fn build_response(
    responder: &Responder<'_>,
    produced_at: DateTime<Utc>,
    responses: &[SingleResponse],
) -> Result<Vec<u8>> {
    let data = ResponseData {
        version: 0,
        responder_id: ResponderIdAsn1::ByName(Name::from_der(responder.name).map_err(asn1_err)?),
        produced_at: crate::generalized_time(produced_at).map_err(asn1_err)?,
        responses: responses
            .iter()
            .map(SingleResponse::to_asn1)
            .collect::<der::Result<Vec<_>>>()
            .map_err(asn1_err)?,
        response_extensions: None,
    };
    let digest = responder.digest;
    let tbs = data.to_der().map_err(asn1_err)?;
    let signature = sign::sign_prehash(
        responder.key,
        digest,
        &digest.digest(&tbs),
        SignatureFormat::Der,
    )?;
    let certs = responder
        .certificates
        .iter()
        .map(|c| Certificate::from_der(c))
        .collect::<der::Result<Vec<_>>>()
        .map_err(asn1_err)?;

    let basic = BasicOcspResponse {
        tbs_response_data: data,
        signature_algorithm: sign::x509_signature_algorithm(responder.key, digest),
        signature: BitString::from_bytes(&signature).map_err(asn1_err)?,
        certs: (!certs.is_empty()).then_some(certs),
    };
    OcspResponseAsn1 {
        response_status: ResponseStatus::Successful,
        response_bytes: Some(ResponseBytes {
            response_type: ID_PKIX_OCSP_BASIC,
            response: OctetString::new(basic.to_der().map_err(asn1_err)?).map_err(asn1_err)?,
        }),
    }
    .to_der()
    .map_err(asn1_err)
}
