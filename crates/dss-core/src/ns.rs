#![forbid(unsafe_code)]

//! XML namespace constants and element names used across the engine.

/// XML Digital Signature namespace
pub const DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";

/// XAdES 1.3.2 namespace
pub const XADES: &str = "http://uri.etsi.org/01903/v1.3.2#";

/// eID identity object namespace
pub const IDENTITY: &str = "be:fedict:eid:identity:1.0";

/// Exclusive C14N namespace
pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

/// XML namespace
pub const XML: &str = "http://www.w3.org/XML/1998/namespace";

/// ODF digital signature namespace
pub const ODF_DSIG: &str = "urn:oasis:names:tc:opendocument:xmlns:digitalsignature:1.0";

/// ASiC container namespace
pub const ASIC: &str = "http://uri.etsi.org/02918/v1.2.1#";

/// Dublin Core elements namespace (used for ODF signature dates)
pub const DC: &str = "http://purl.org/dc/elements/1.1/";

/// OPC relationships namespace
pub const RELATIONSHIPS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

/// OPC content types namespace
pub const CONTENT_TYPES: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

/// OPC digital signature namespace
pub const OPC_DSIG: &str = "http://schemas.openxmlformats.org/package/2006/digital-signature";

/// Office digital signature namespace
pub const OFFICE_DSIG: &str = "http://schemas.microsoft.com/office/2006/digsig";

// ── Element names ────────────────────────────────────────────────────

pub mod node {
    // DSig elements
    pub const SIGNATURE: &str = "Signature";
    pub const SIGNED_INFO: &str = "SignedInfo";
    pub const CANONICALIZATION_METHOD: &str = "CanonicalizationMethod";
    pub const SIGNATURE_METHOD: &str = "SignatureMethod";
    pub const SIGNATURE_VALUE: &str = "SignatureValue";
    pub const DIGEST_METHOD: &str = "DigestMethod";
    pub const DIGEST_VALUE: &str = "DigestValue";
    pub const OBJECT: &str = "Object";
    pub const MANIFEST: &str = "Manifest";
    pub const SIGNATURE_PROPERTIES: &str = "SignatureProperties";
    pub const SIGNATURE_PROPERTY: &str = "SignatureProperty";
    pub const REFERENCE: &str = "Reference";
    pub const TRANSFORMS: &str = "Transforms";
    pub const TRANSFORM: &str = "Transform";
    pub const KEY_INFO: &str = "KeyInfo";
    pub const X509_DATA: &str = "X509Data";
    pub const X509_CERTIFICATE: &str = "X509Certificate";
    pub const X509_ISSUER_NAME: &str = "X509IssuerName";
    pub const X509_SERIAL_NUMBER: &str = "X509SerialNumber";
    pub const XPATH: &str = "XPath";
    pub const INCLUSIVE_NAMESPACES: &str = "InclusiveNamespaces";

    // XAdES elements
    pub const QUALIFYING_PROPERTIES: &str = "QualifyingProperties";
    pub const SIGNED_PROPERTIES: &str = "SignedProperties";
    pub const SIGNED_SIGNATURE_PROPERTIES: &str = "SignedSignatureProperties";
    pub const SIGNING_TIME: &str = "SigningTime";
    pub const SIGNING_CERTIFICATE: &str = "SigningCertificate";
    pub const CERT: &str = "Cert";
    pub const CERT_DIGEST: &str = "CertDigest";
    pub const ISSUER_SERIAL: &str = "IssuerSerial";
    pub const SIGNER_ROLE: &str = "SignerRole";
    pub const CLAIMED_ROLES: &str = "ClaimedRoles";
    pub const CLAIMED_ROLE: &str = "ClaimedRole";
    pub const UNSIGNED_PROPERTIES: &str = "UnsignedProperties";
    pub const UNSIGNED_SIGNATURE_PROPERTIES: &str = "UnsignedSignatureProperties";
    pub const SIGNATURE_TIME_STAMP: &str = "SignatureTimeStamp";
    pub const SIG_AND_REFS_TIME_STAMP: &str = "SigAndRefsTimeStamp";
    pub const ENCAPSULATED_TIME_STAMP: &str = "EncapsulatedTimeStamp";
    pub const COMPLETE_CERTIFICATE_REFS: &str = "CompleteCertificateRefs";
    pub const CERT_REFS: &str = "CertRefs";
    pub const COMPLETE_REVOCATION_REFS: &str = "CompleteRevocationRefs";
    pub const CRL_REFS: &str = "CRLRefs";
    pub const CRL_REF: &str = "CRLRef";
    pub const CRL_IDENTIFIER: &str = "CRLIdentifier";
    pub const ISSUER: &str = "Issuer";
    pub const ISSUE_TIME: &str = "IssueTime";
    pub const OCSP_REFS: &str = "OCSPRefs";
    pub const OCSP_REF: &str = "OCSPRef";
    pub const OCSP_IDENTIFIER: &str = "OCSPIdentifier";
    pub const RESPONDER_ID: &str = "ResponderID";
    pub const BY_NAME: &str = "ByName";
    pub const BY_KEY: &str = "ByKey";
    pub const PRODUCED_AT: &str = "ProducedAt";
    pub const DIGEST_ALG_AND_VALUE: &str = "DigestAlgAndValue";
    pub const CERTIFICATE_VALUES: &str = "CertificateValues";
    pub const ENCAPSULATED_X509_CERTIFICATE: &str = "EncapsulatedX509Certificate";
    pub const REVOCATION_VALUES: &str = "RevocationValues";
    pub const CRL_VALUES: &str = "CRLValues";
    pub const ENCAPSULATED_CRL_VALUE: &str = "EncapsulatedCRLValue";
    pub const OCSP_VALUES: &str = "OCSPValues";
    pub const ENCAPSULATED_OCSP_VALUE: &str = "EncapsulatedOCSPValue";

    // Identity elements
    pub const IDENTITY: &str = "Identity";
    pub const FIRST_NAME: &str = "FirstName";
    pub const NAME: &str = "Name";
    pub const MIDDLE_NAME: &str = "MiddleName";
    pub const GENDER: &str = "Gender";
    pub const PHOTO: &str = "Photo";
}

// ── Attribute names ──────────────────────────────────────────────────

pub mod attr {
    pub const ID: &str = "Id";
    pub const URI: &str = "URI";
    pub const TYPE: &str = "Type";
    pub const ALGORITHM: &str = "Algorithm";
    pub const TARGET: &str = "Target";
    pub const PREFIX_LIST: &str = "PrefixList";
}
