#![forbid(unsafe_code)]

//! eID identity attributes as a signed `ds:Object`.

use base64::Engine;
use dss_c14n::C14nMode;
use dss_core::{algorithm, ns, Error, Result};
use dss_xml::document::{child_element, child_elements, element_text, is_element};
use dss_xml::XmlWriter;

use crate::facet::{
    decode_base64, ReferenceSpec, SignatureContext, SignatureFacet, TransformSpec, XmlObject, B64,
};
use crate::spi::Identity;

pub const PHOTO_MIME_TYPE: &str = "image/jpeg";

pub struct IdentityFacet {
    identity: Identity,
}

impl IdentityFacet {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }
}

impl SignatureFacet for IdentityFacet {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn pre_sign(&self, ctx: &mut SignatureContext<'_>) -> Result<()> {
        let id = format!("{}-identity", ctx.signature_id());
        let i = &self.identity;
        let mut w = XmlWriter::new();
        w.start_element(
            "identity:Identity",
            &[("xmlns:identity", ns::IDENTITY), ("Id", &id)],
        );
        w.text_element("identity:Name", &[], &i.name);
        w.text_element("identity:FirstName", &[], &i.first_name);
        if let Some(middle) = &i.middle_name {
            w.text_element("identity:MiddleName", &[], middle);
        }
        if let Some(gender) = &i.gender {
            w.text_element("identity:Gender", &[], gender);
        }
        if let Some(photo) = &i.photo {
            w.text_element(
                "identity:Photo",
                &[("MimeType", PHOTO_MIME_TYPE)],
                &B64.encode(photo),
            );
        }
        w.end_element("identity:Identity");

        ctx.add_object(XmlObject {
            id: None,
            content: w.into_string(),
        });
        ctx.add_reference(
            ReferenceSpec::same_document(format!("#{id}"), ctx.digest())
                .with_type(algorithm::IDENTITY_TYPE)
                .with_transform(TransformSpec::C14n(C14nMode::Exclusive)),
        );
        Ok(())
    }
}

/// Read the identity referenced from the `SignedInfo` of `signature`.
pub fn find_identity(signature: roxmltree::Node<'_, '_>) -> Result<Option<Identity>> {
    let Some(signed_info) = child_element(signature, ns::DSIG, ns::node::SIGNED_INFO) else {
        return Ok(None);
    };
    let Some(reference) = child_elements(signed_info, ns::DSIG, ns::node::REFERENCE)
        .find(|r| r.attribute(ns::attr::TYPE) == Some(algorithm::IDENTITY_TYPE))
    else {
        return Ok(None);
    };
    let id = reference
        .attribute(ns::attr::URI)
        .and_then(|u| u.strip_prefix('#'))
        .ok_or_else(|| Error::InvalidUri("identity reference".into()))?;
    let node = child_elements(signature, ns::DSIG, ns::node::OBJECT)
        .flat_map(|o| o.children())
        .find(|n| is_element(n, ns::IDENTITY, ns::node::IDENTITY) && n.attribute(ns::attr::ID) == Some(id))
        .ok_or_else(|| Error::MissingElement(format!("Identity {id}")))?;

    let text = |name: &str| child_element(node, ns::IDENTITY, name).map(element_text);
    let photo = text(ns::node::PHOTO).map(|b64| decode_base64(&b64)).transpose()?;
    Ok(Some(Identity {
        first_name: text(ns::node::FIRST_NAME).unwrap_or_default(),
        name: text(ns::node::NAME).unwrap_or_default(),
        middle_name: text(ns::node::MIDDLE_NAME),
        gender: text(ns::node::GENDER),
        photo,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::NoSource;
    use dss_crypto::DigestAlgo;

    #[test]
    fn object_round_trip() {
        let identity = Identity {
            first_name: "Alice".into(),
            name: "Doe & Co".into(),
            middle_name: None,
            gender: Some("FEMALE".into()),
            photo: Some(vec![0xff, 0xd8, 0xff]),
        };
        let chain = vec![vec![1u8]];
        let mut ctx = SignatureContext::new("sig", &chain, DigestAlgo::Sha256, &NoSource);
        IdentityFacet::new(identity.clone()).pre_sign(&mut ctx).unwrap();
        let r = &ctx.references()[0];
        assert_eq!(r.uri, "#sig-identity");

        let xml = format!(
            r#"<ds:Signature xmlns:ds="{}"><ds:SignedInfo><ds:Reference URI="{}" Type="{}"/></ds:SignedInfo><ds:Object>{}</ds:Object></ds:Signature>"#,
            ns::DSIG,
            r.uri,
            algorithm::IDENTITY_TYPE,
            ctx.objects()[0].content
        );
        let doc = roxmltree::Document::parse(&xml).unwrap();
        let found = find_identity(doc.root_element()).unwrap().unwrap();
        assert_eq!(found, identity);
    }

    #[test]
    fn absent_identity_is_none() {
        let xml = format!(r#"<ds:Signature xmlns:ds="{}"><ds:SignedInfo/></ds:Signature>"#, ns::DSIG);
        let doc = roxmltree::Document::parse(&xml).unwrap();
        assert_eq!(find_identity(doc.root_element()).unwrap(), None);
    }
}
