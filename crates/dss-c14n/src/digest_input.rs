#![forbid(unsafe_code)]

//! Timestamp input construction.
//!
//! XAdES timestamps cover the concatenated canonical forms of several
//! elements of the signature (for instance SignatureValue, then the
//! SignatureTimeStamp, then the complete references). The elements are
//! canonicalized one by one, in insertion order, with a fresh canonicalizer
//! each so no namespace context carries over from one node to the next.

use roxmltree::Node;

use crate::C14nMode;
use dss_core::{Error, Result};

/// Ordered list of subtrees whose canonical forms are concatenated.
#[derive(Debug)]
pub struct TimeStampDigestInput<'a, 'input> {
    mode: C14nMode,
    nodes: Vec<Node<'a, 'input>>,
}

impl<'a, 'input> TimeStampDigestInput<'a, 'input> {
    /// Create an empty input for the canonicalization method `c14n_uri`.
    pub fn new(c14n_uri: &str) -> Result<Self> {
        let mode = C14nMode::from_uri(c14n_uri)
            .ok_or_else(|| Error::UnsupportedAlgorithm(c14n_uri.to_owned()))?;
        Ok(Self {
            mode,
            nodes: Vec::new(),
        })
    }

    pub fn mode(&self) -> C14nMode {
        self.mode
    }

    /// Append a node.
    pub fn add_node(&mut self, node: Option<Node<'a, 'input>>) -> Result<()> {
        let node = node.ok_or_else(|| Error::InvalidArgument("timestamp input node is absent".into()))?;
        self.nodes.push(node);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Canonicalize every node and concatenate the results.
    pub fn compute_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for node in &self.nodes {
            let bytes = crate::canonicalize_node(*node, self.mode, &[])
                .map_err(|e| Error::Canonicalization(format!("timestamp input: {e}")))?;
            out.extend_from_slice(&bytes);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dss_core::algorithm;

    const XML: &str = r#"<ds:Signature xmlns:ds="urn:ds"><ds:SignatureValue>AAA=</ds:SignatureValue><x:Ts xmlns:x="urn:x">T</x:Ts></ds:Signature>"#;

    fn find<'a, 'i>(doc: &'a roxmltree::Document<'i>, name: &str) -> Option<Node<'a, 'i>> {
        doc.descendants().find(|n| n.tag_name().name() == name)
    }

    #[test]
    fn concatenates_in_insertion_order() {
        let doc = dss_xml::parse(XML).unwrap();
        let mut input = TimeStampDigestInput::new(algorithm::EXC_C14N).unwrap();
        input.add_node(find(&doc, "Ts")).unwrap();
        input.add_node(find(&doc, "SignatureValue")).unwrap();
        let out = String::from_utf8(input.compute_bytes().unwrap()).unwrap();
        assert_eq!(
            out,
            r#"<x:Ts xmlns:x="urn:x">T</x:Ts><ds:SignatureValue xmlns:ds="urn:ds">AAA=</ds:SignatureValue>"#
        );
    }

    #[test]
    fn repeated_computation_is_stable() {
        let doc = dss_xml::parse(XML).unwrap();
        let mut input = TimeStampDigestInput::new(algorithm::C14N).unwrap();
        input.add_node(find(&doc, "SignatureValue")).unwrap();
        input.add_node(find(&doc, "Ts")).unwrap();
        assert_eq!(input.compute_bytes().unwrap(), input.compute_bytes().unwrap());
    }

    #[test]
    fn absent_node_is_rejected() {
        let doc = dss_xml::parse(XML).unwrap();
        let mut input = TimeStampDigestInput::new(algorithm::C14N).unwrap();
        let err = input.add_node(find(&doc, "Missing")).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(input.is_empty());
    }

    #[test]
    fn unknown_method_is_rejected() {
        assert!(matches!(
            TimeStampDigestInput::new("urn:c14n:unknown"),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }
}
