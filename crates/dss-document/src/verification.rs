#![forbid(unsafe_code)]

//! The signature verification service.
//!
//! Every signature of a document is validated on its own: a signature that
//! fails is logged and left out of the result, so a document whose
//! signatures are all invalid yields an empty list just like an unsigned
//! one.

use dss_core::config::DssConfig;
use dss_core::{Error, Result};
use dss_xades::verify::{find_signatures, UriDereferencer};
use dss_xades::{SignatureInfo, TimestampValidator, TrustValidator, ValidatedSignature, XadesValidator};

use crate::formats;
use crate::request::ContentType;

/// Validate every `ds:Signature` of the XML `text`, returning the valid
/// ones. Invalid signatures are logged and skipped.
pub(crate) fn validate_all(
    validator: &XadesValidator<'_>,
    text: &str,
    dereferencer: &dyn UriDereferencer,
) -> Result<Vec<ValidatedSignature>> {
    let doc = dss_xml::parse(text).map_err(|e| Error::DocumentFormat(e.to_string()))?;
    let mut valid = Vec::new();
    for (index, signature) in find_signatures(&doc).into_iter().enumerate() {
        match validator.validate(text, signature, dereferencer) {
            Ok(v) => valid.push(v),
            Err(e) => log::warn!("skipping signature: {}", e.for_signature(index)),
        }
    }
    Ok(valid)
}

/// Stateless verification of signed documents.
pub struct VerificationService<'a> {
    trust: &'a dyn TrustValidator,
    timestamps: &'a dyn TimestampValidator,
    config: DssConfig,
}

impl<'a> VerificationService<'a> {
    pub fn new(
        trust: &'a dyn TrustValidator,
        timestamps: &'a dyn TimestampValidator,
        config: DssConfig,
    ) -> Self {
        Self {
            trust,
            timestamps,
            config,
        }
    }

    /// The valid signatures of `document`.
    ///
    /// Fails with `DocumentFormat` when `document` is not of `content_type`.
    /// `original`, when given, is the unsigned document the signatures
    /// must have been placed on.
    pub fn verify_signatures(
        &self,
        document: &[u8],
        content_type: ContentType,
        original: Option<&[u8]>,
    ) -> Result<Vec<SignatureInfo>> {
        let validator = XadesValidator::new(self.trust, self.timestamps, self.config.clone());
        let infos = match content_type {
            ContentType::Xml => formats::xml::verify(&validator, document, original),
            ContentType::Zip => formats::package::verify(&validator, document, original, false),
            ContentType::Odf => {
                reject_original(content_type, original)?;
                formats::package::verify(&validator, document, None, true)
            }
            ContentType::Asic => {
                reject_original(content_type, original)?;
                formats::asic::verify(&validator, document)
            }
            ContentType::Ooxml => {
                reject_original(content_type, original)?;
                formats::ooxml::verify(&validator, document)
            }
        }?;
        log::info!("{content_type} document: {} valid signature(s)", infos.len());
        Ok(infos)
    }
}

fn reject_original(content_type: ContentType, original: Option<&[u8]>) -> Result<()> {
    match original {
        Some(_) => Err(Error::InvalidArgument(format!(
            "{content_type} verification cannot compare against an original document"
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::Fixture;

    #[test]
    fn unsigned_xml_has_no_signatures() {
        let f = Fixture::new();
        let infos = f
            .verifier()
            .verify_signatures(b"<doc/>", ContentType::Xml, None)
            .unwrap();
        assert!(infos.is_empty());
    }

    #[test]
    fn wrong_content_type_is_format_error() {
        let f = Fixture::new();
        let err = f
            .verifier()
            .verify_signatures(b"<doc/>", ContentType::Zip, None)
            .unwrap_err();
        assert!(matches!(err, Error::DocumentFormat(_)));
    }

    #[test]
    fn original_rejected_for_packages() {
        let f = Fixture::new();
        for ct in [ContentType::Odf, ContentType::Asic, ContentType::Ooxml] {
            let err = f
                .verifier()
                .verify_signatures(b"whatever", ct, Some(b"x"))
                .unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)), "{ct}: {err:?}");
        }
    }
}
