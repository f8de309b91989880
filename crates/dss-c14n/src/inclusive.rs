#![forbid(unsafe_code)]

//! Inclusive Canonical XML 1.0 (C14N 1.0).
//!
//! Algorithm URI: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315`
//! With comments: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments`
//!
//! The canonical form:
//! - Outputs namespace declarations sorted by prefix (default first)
//! - Outputs attributes sorted by (namespace-URI, local-name)
//! - Escapes text and attribute values
//! - Optionally preserves or strips comments
//! - Supports document-subset canonicalization via NodeSet

use crate::render::{self, Attr, NsDecl};
use dss_core::{ns, Error};
use dss_xml::NodeSet;
use std::collections::BTreeMap;

/// Canonicalize a document using Inclusive C14N 1.0.
pub fn canonicalize(
    doc: &roxmltree::Document<'_>,
    with_comments: bool,
    node_set: Option<&NodeSet>,
) -> Result<Vec<u8>, Error> {
    let mut output = Vec::new();
    let ctx = C14nContext {
        with_comments,
        node_set,
    };
    ctx.process_node(doc.root(), &mut output, &BTreeMap::new());
    Ok(output)
}

struct C14nContext<'a> {
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
}

impl<'a> C14nContext<'a> {
    fn is_visible(&self, node: &roxmltree::Node<'_, '_>) -> bool {
        self.node_set.map_or(true, |ns| ns.contains(node))
    }

    fn process_node(
        &self,
        node: roxmltree::Node<'_, '_>,
        output: &mut Vec<u8>,
        rendered_ns: &BTreeMap<String, String>,
    ) {
        match node.node_type() {
            roxmltree::NodeType::Root => {
                for child in node.children() {
                    self.process_node(child, output, rendered_ns);
                }
            }
            roxmltree::NodeType::Element => self.process_element(node, output, rendered_ns),
            roxmltree::NodeType::Text => {
                if self.is_visible(&node) {
                    let text = node.text().unwrap_or("");
                    output.extend_from_slice(render::escape_text(text).as_bytes());
                }
            }
            roxmltree::NodeType::Comment => {
                if self.with_comments && self.is_visible(&node) {
                    render::render_misc(&node, output);
                }
            }
            roxmltree::NodeType::PI => {
                if self.is_visible(&node) {
                    render::render_misc(&node, output);
                }
            }
        }
    }

    fn process_element(
        &self,
        node: roxmltree::Node<'_, '_>,
        output: &mut Vec<u8>,
        rendered_ns: &BTreeMap<String, String>,
    ) {
        if !self.is_visible(&node) {
            // Descendants compare against the nearest visible ancestor.
            for child in node.children() {
                self.process_node(child, output, rendered_ns);
            }
            return;
        }

        let current_ns = collect_inscope_namespaces(&node);

        let mut ns_decls: Vec<NsDecl> = current_ns
            .iter()
            .filter(|(prefix, uri)| rendered_ns.get(*prefix) != Some(*uri))
            .map(|(prefix, uri)| NsDecl {
                prefix: prefix.clone(),
                uri: uri.clone(),
            })
            .collect();

        // A default namespace rendered above but not in scope here.
        let rendered_default = rendered_ns.get("").map_or("", String::as_str);
        if !rendered_default.is_empty() && !current_ns.contains_key("") {
            ns_decls.push(NsDecl {
                prefix: String::new(),
                uri: String::new(),
            });
        }
        ns_decls.sort();

        let mut attrs = Attr::collect(&node);

        // xml:* attributes are inherited when the parent is not rendered.
        if self.node_set.is_some() {
            let parent_not_visible = node
                .parent()
                .map_or(true, |p| !p.is_element() || !self.is_visible(&p));
            if parent_not_visible {
                let extra = collect_inherited_xml_attrs(&node, &attrs);
                attrs.extend(extra);
            }
        }
        attrs.sort();

        let elem_name = dss_xml::qname::element_qname(&node);

        output.push(b'<');
        output.extend_from_slice(elem_name.as_bytes());
        for ns_decl in &ns_decls {
            output.extend_from_slice(ns_decl.render().as_bytes());
        }
        for attr in &attrs {
            output.extend_from_slice(attr.render().as_bytes());
        }
        output.push(b'>');

        let mut child_ns = current_ns;
        if !rendered_default.is_empty() && !child_ns.contains_key("") {
            child_ns.insert(String::new(), String::new());
        }
        for child in node.children() {
            self.process_node(child, output, &child_ns);
        }

        output.extend_from_slice(b"</");
        output.extend_from_slice(elem_name.as_bytes());
        output.push(b'>');
    }
}

/// Collect xml:* attributes from all ancestors (nearest wins), minus those
/// already on the element itself.
fn collect_inherited_xml_attrs(node: &roxmltree::Node<'_, '_>, existing_attrs: &[Attr]) -> Vec<Attr> {
    let mut inherited_xml: BTreeMap<String, String> = BTreeMap::new();
    for ancestor in node.ancestors().skip(1).filter(|a| a.is_element()) {
        for attr in ancestor.attributes() {
            if attr.namespace() == Some(ns::XML) {
                inherited_xml
                    .entry(attr.name().to_owned())
                    .or_insert_with(|| attr.value().to_owned());
            }
        }
    }

    inherited_xml
        .into_iter()
        .filter(|(name, _)| {
            !existing_attrs
                .iter()
                .any(|a| a.ns_uri == ns::XML && a.local_name == *name)
        })
        .map(|(name, value)| Attr {
            ns_uri: ns::XML.to_owned(),
            qualified_name: format!("xml:{name}"),
            local_name: name,
            value,
        })
        .collect()
}

/// All in-scope namespaces of an element, prefix → URI, without `xml`.
pub(crate) fn collect_inscope_namespaces(node: &roxmltree::Node<'_, '_>) -> BTreeMap<String, String> {
    node.namespaces()
        .filter(|ns| ns.name() != Some("xml") && !ns.uri().is_empty())
        .map(|ns| (ns.name().unwrap_or("").to_owned(), ns.uri().to_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c14n(xml: &str) -> String {
        let doc = roxmltree::Document::parse(xml).unwrap();
        String::from_utf8(canonicalize(&doc, false, None).unwrap()).unwrap()
    }

    #[test]
    fn test_simple_c14n() {
        assert_eq!(
            c14n(r#"<root><a b="1" a="2"/></root>"#),
            r#"<root><a a="2" b="1"></a></root>"#
        );
    }

    #[test]
    fn test_namespace_rendering() {
        let out = c14n(r#"<root xmlns:b="http://b" xmlns:a="http://a"><a:child/></root>"#);
        assert_eq!(
            out,
            r#"<root xmlns:a="http://a" xmlns:b="http://b"><a:child></a:child></root>"#
        );
    }

    #[test]
    fn test_text_escaping() {
        assert_eq!(c14n("<root>a &amp; b &lt; c</root>"), "<root>a &amp; b &lt; c</root>");
    }

    #[test]
    fn subset_apex_gets_inherited_namespaces_and_xml_attrs() {
        let xml = r#"<r xmlns="urn:r" xmlns:p="urn:p" xml:lang="en"><p:a><b/></p:a></r>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let a = doc.descendants().find(|n| n.has_tag_name(("urn:p", "a"))).unwrap();
        let set = NodeSet::tree_without_comments(a);
        let out = String::from_utf8(canonicalize(&doc, false, Some(&set)).unwrap()).unwrap();
        assert_eq!(
            out,
            r#"<p:a xmlns="urn:r" xmlns:p="urn:p" xml:lang="en"><b></b></p:a>"#
        );
    }

    #[test]
    fn comments_outside_root() {
        let xml = "<!--a--><r/><!--b-->";
        let doc = roxmltree::Document::parse(xml).unwrap();
        let out = String::from_utf8(canonicalize(&doc, true, None).unwrap()).unwrap();
        assert_eq!(out, "<!--a-->\n<r></r>\n<!--b-->");
        assert_eq!(c14n(xml), "<r></r>");
    }
}
