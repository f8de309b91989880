#![forbid(unsafe_code)]

//! Plain XML: enveloped co-signatures appended to the document element.

use std::io::Write;

use dss_c14n::C14nMode;
use dss_core::{ns, Error, Result};
use dss_xades::facets::CoSignatureFacet;
use dss_xades::verify::SameDocumentOnly;
use dss_xades::{SignatureFacet, SignatureInfo, XadesValidator};
use dss_xml::splice::Splicer;

use crate::verification::validate_all;

pub(crate) fn facets<'a>() -> Vec<Box<dyn SignatureFacet + 'a>> {
    vec![Box::new(CoSignatureFacet)]
}

/// The request document as text, checked to be well-formed XML.
pub(crate) fn host_document(document: &[u8]) -> Result<String> {
    let doc = dss_xml::XmlDocument::parse_bytes(document)
        .map_err(|e| Error::DocumentFormat(format!("not an XML document: {e}")))?;
    Ok(doc.into_text())
}

pub(crate) fn write_signed(signed: &str, out: &mut dyn Write) -> Result<()> {
    out.write_all(signed.as_bytes())?;
    out.flush()?;
    Ok(())
}

pub(crate) fn verify(
    validator: &XadesValidator<'_>,
    document: &[u8],
    original: Option<&[u8]>,
) -> Result<Vec<SignatureInfo>> {
    let text = host_document(document)?;
    if let Some(original) = original {
        check_original(&text, original)?;
    }
    Ok(validate_all(validator, &text, &SameDocumentOnly)?
        .into_iter()
        .map(|v| v.info)
        .collect())
}

/// `text` without any `ds:Signature` elements.
pub fn strip_signatures(text: &str) -> Result<String> {
    let doc = dss_xml::parse(text)?;
    let mut splicer = Splicer::new(text);
    let outermost = doc.descendants().filter(|n| {
        dss_xml::document::is_element(n, ns::DSIG, ns::node::SIGNATURE)
            && !n
                .ancestors()
                .skip(1)
                .any(|a| dss_xml::document::is_element(&a, ns::DSIG, ns::node::SIGNATURE))
    });
    for signature in outermost {
        splicer.remove(&signature);
    }
    splicer.finish()
}

/// The signed document minus its signatures must canonicalize to the same
/// bytes as the original.
fn check_original(signed: &str, original: &[u8]) -> Result<()> {
    let original = host_document(original)?;
    let stripped = strip_signatures(signed)?;
    let a = dss_c14n::canonicalize(&stripped, C14nMode::Inclusive, None, &[])?;
    let b = dss_c14n::canonicalize(&original, C14nMode::Inclusive, None, &[])?;
    if a != b {
        return Err(Error::InvalidArgument(
            "signed document does not match the original document".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{ContentType, SigningRequest};
    use crate::testutil::Fixture;

    const DOC: &[u8] = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<invoice id=\"7\"><amount>100</amount></invoice>";

    #[test]
    fn strips_nested_signatures_once() {
        let text = format!(
            r#"<doc><a/><ds:Signature xmlns:ds="{0}"><ds:Object><ds:Signature/></ds:Object></ds:Signature><b/></doc>"#,
            ns::DSIG
        );
        assert_eq!(strip_signatures(&text).unwrap(), "<doc><a/><b/></doc>");
    }

    #[test]
    fn original_comparison_is_canonical() {
        let signed = format!(
            r#"<doc b="2"  a="1"><x/><ds:Signature xmlns:ds="{}"/></doc>"#,
            ns::DSIG
        );
        check_original(&signed, br#"<?xml version="1.0"?><doc a="1" b="2"><x></x></doc>"#).unwrap();
        assert!(matches!(
            check_original(&signed, b"<doc a=\"1\"/>"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn rejects_non_xml() {
        assert!(matches!(host_document(b"PK\x03\x04"), Err(Error::DocumentFormat(_))));
    }

    #[test]
    fn signs_and_verifies_against_original() {
        let f = Fixture::new();
        let signed = f.sign(SigningRequest::new(DOC.to_vec(), ContentType::Xml)).unwrap();
        let text = String::from_utf8(signed.clone()).unwrap();
        assert!(text.contains("</ds:Signature></invoice>"));

        let verifier = f.verifier();
        assert_eq!(verifier.verify_signatures(&signed, ContentType::Xml, Some(DOC)).unwrap().len(), 1);
        let err = verifier
            .verify_signatures(&signed, ContentType::Xml, Some(b"<invoice id=\"8\"/>"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn cosignatures_validate_independently() {
        let f = Fixture::new();
        let once = f.sign(SigningRequest::new(DOC.to_vec(), ContentType::Xml)).unwrap();
        let twice = f
            .sign(SigningRequest::new(once, ContentType::Xml).with_role("witness"))
            .unwrap();
        let infos = f.verifier().verify_signatures(&twice, ContentType::Xml, Some(DOC)).unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].role, None);
        assert_eq!(infos[1].role.as_deref(), Some("witness"));
    }

    #[test]
    fn tampered_content_yields_no_signatures() {
        let f = Fixture::new();
        let signed = f.sign(SigningRequest::new(DOC.to_vec(), ContentType::Xml)).unwrap();
        let tampered = String::from_utf8(signed)
            .unwrap()
            .replace("<amount>100</amount>", "<amount>900</amount>");
        let infos = f
            .verifier()
            .verify_signatures(tampered.as_bytes(), ContentType::Xml, None)
            .unwrap();
        assert!(infos.is_empty());
    }

    #[test]
    fn broken_cosignature_leaves_the_other_valid() {
        let f = Fixture::new();
        let once = f.sign(SigningRequest::new(DOC.to_vec(), ContentType::Xml)).unwrap();
        let twice = f
            .sign(SigningRequest::new(once, ContentType::Xml).with_role("witness"))
            .unwrap();
        let broken = crate::formats::tests::corrupt_first_signature_value(&twice);
        let infos = f.verifier().verify_signatures(&broken, ContentType::Xml, None).unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].role.as_deref(), Some("witness"));
    }
}
