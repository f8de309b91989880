#![forbid(unsafe_code)]

//! Same-document URI resolution for XML-DSig references.
//!
//! Handles:
//! - Empty URI (""): the entire document minus comments
//! - Same-document references ("#id"): the identified subtree minus comments
//!
//! Other URIs name external data and are resolved by the caller.

use dss_core::Error;
use dss_xml::{xpath, NodeSet, XmlDocument};

use crate::pipeline::TransformData;

/// Whether `uri` is resolved inside the signature's own document.
pub fn is_same_document(uri: &str) -> bool {
    uri.is_empty() || uri.starts_with('#')
}

/// Resolve a same-document URI against `xml_text`.
pub fn resolve_same_document(uri: &str, xml_text: &str) -> Result<TransformData, Error> {
    let doc = dss_xml::parse(xml_text)?;
    let set = if uri.is_empty() {
        NodeSet::all_without_comments(&doc)
    } else if let Some(id) = xpath::parse_same_document_ref(uri) {
        let id_map = XmlDocument::build_id_map(&doc);
        let node = xpath::resolve_id(&doc, &id_map, id)?;
        NodeSet::tree_without_comments(node)
    } else {
        return Err(Error::InvalidUri(format!("not a same-document reference: {uri}")));
    };
    Ok(TransformData::Xml {
        xml_text: xml_text.to_owned(),
        node_set: Some(set),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_id_subtree() {
        let xml = r#"<r><a Id="x"><b/></a><c/></r>"#;
        let data = resolve_same_document("#x", xml).unwrap();
        assert_eq!(data.to_binary().unwrap(), br#"<a Id="x"><b></b></a>"#);
    }

    #[test]
    fn empty_uri_is_whole_document() {
        let data = resolve_same_document("", "<r><!--c--><a/></r>").unwrap();
        assert_eq!(data.to_binary().unwrap(), b"<r><a></a></r>");
    }

    #[test]
    fn unknown_id_fails() {
        assert!(resolve_same_document("#nope", "<r/>").is_err());
        assert!(!is_same_document("word/document.xml"));
    }
}
