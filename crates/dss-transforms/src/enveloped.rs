#![forbid(unsafe_code)]

//! Signature exclusion transforms.
//!
//! - `EnvelopedSignatureTransform` removes the one `<Signature>` element that
//!   holds the reference.
//! - `SignatureExclusionTransform` implements the XPath filter
//!   `not(ancestor-or-self::ds:Signature)` used by co-signatures: every
//!   XML-DSig signature in the document is removed, so signatures added
//!   later do not break earlier ones.

use crate::pipeline::{Transform, TransformData};
use dss_core::{algorithm, ns, Error};
use dss_xml::NodeSet;
use roxmltree::NodeId;

/// Removes one `<Signature>` element and its descendants from the node set.
pub struct EnvelopedSignatureTransform {
    signature: NodeId,
}

impl EnvelopedSignatureTransform {
    pub fn new(signature: NodeId) -> Self {
        Self { signature }
    }
}

impl Transform for EnvelopedSignatureTransform {
    fn uri(&self) -> &str {
        algorithm::ENVELOPED_SIGNATURE
    }

    fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        match input {
            TransformData::Xml { xml_text, node_set } => {
                let doc = dss_xml::parse(&xml_text)?;
                let mut set = node_set.unwrap_or_else(|| NodeSet::all(&doc));
                let sig = doc.get_node(self.signature).ok_or_else(|| {
                    Error::Transform("enveloping signature not found".into())
                })?;
                set.remove_subtree(sig);
                drop(doc);
                Ok(TransformData::Xml {
                    xml_text,
                    node_set: Some(set),
                })
            }
            TransformData::Binary(_) => Err(Error::Transform(
                "enveloped-signature transform requires XML input".into(),
            )),
        }
    }
}

/// The XPath expression matched by [`SignatureExclusionTransform`], for the
/// given prefix bound to the XML-DSig namespace.
pub fn signature_exclusion_xpath(prefix: &str) -> String {
    format!("not(ancestor-or-self::{prefix}:Signature)")
}

/// Removes every XML-DSig `<Signature>` subtree from the node set.
pub struct SignatureExclusionTransform;

impl SignatureExclusionTransform {
    /// Build from an `<XPath>` element, accepting only the expression
    /// `not(ancestor-or-self::P:Signature)` with `P` bound to the XML-DSig
    /// namespace.
    pub fn from_xpath_element(xpath: roxmltree::Node<'_, '_>) -> Result<Self, Error> {
        let expr: String = dss_xml::document::element_text(xpath)
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let prefix = expr
            .strip_prefix("not(ancestor-or-self::")
            .and_then(|r| r.strip_suffix(":Signature)"))
            .ok_or_else(|| Error::UnsupportedAlgorithm(format!("XPath expression {expr}")))?;
        if xpath.lookup_namespace_uri(Some(prefix)) != Some(ns::DSIG) {
            return Err(Error::Transform(format!(
                "XPath prefix {prefix} is not bound to the XML-DSig namespace"
            )));
        }
        Ok(Self)
    }
}

impl Transform for SignatureExclusionTransform {
    fn uri(&self) -> &str {
        algorithm::XPATH
    }

    fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        let (xml_text, node_set) = input.into_xml_text()?;
        let doc = dss_xml::parse(&xml_text)?;
        let mut set = node_set.unwrap_or_else(|| NodeSet::all(&doc));
        for sig in doc
            .descendants()
            .filter(|n| dss_xml::document::is_element(n, ns::DSIG, ns::node::SIGNATURE))
        {
            set.remove_subtree(sig);
        }
        drop(doc);
        Ok(TransformData::Xml {
            xml_text,
            node_set: Some(set),
        })
    }
}
