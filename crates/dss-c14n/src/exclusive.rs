#![forbid(unsafe_code)]

//! Exclusive Canonical XML 1.0 (exc-C14N).
//!
//! Algorithm URI: `http://www.w3.org/2001/10/xml-exc-c14n#`
//! With comments: `http://www.w3.org/2001/10/xml-exc-c14n#WithComments`
//!
//! Only "visibly utilized" namespace declarations are output.  A namespace
//! is visibly utilized if its prefix is used by the element's tag name or by
//! one of its attributes, or if the prefix is listed in the
//! InclusiveNamespaces PrefixList (`#default` names the default namespace).

use crate::inclusive::collect_inscope_namespaces;
use crate::render::{self, Attr, NsDecl};
use dss_core::Error;
use dss_xml::{qname, NodeSet};
use std::collections::{BTreeMap, BTreeSet};

/// Canonicalize using Exclusive C14N 1.0.
pub fn canonicalize(
    doc: &roxmltree::Document<'_>,
    with_comments: bool,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    let inclusive_prefixes = inclusive_prefixes
        .iter()
        .map(|p| if p == "#default" { String::new() } else { p.clone() })
        .collect();
    let mut output = Vec::new();
    let ctx = ExcC14nContext {
        with_comments,
        node_set,
        inclusive_prefixes,
    };
    ctx.process_node(doc.root(), &mut output, &BTreeMap::new());
    Ok(output)
}

struct ExcC14nContext<'a> {
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
    inclusive_prefixes: BTreeSet<String>,
}

impl<'a> ExcC14nContext<'a> {
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
            for child in node.children() {
                self.process_node(child, output, rendered_ns);
            }
            return;
        }

        let in_scope = collect_inscope_namespaces(&node);
        let elem_name = qname::element_qname(&node);
        let attrs = {
            let mut a = Attr::collect(&node);
            a.sort();
            a
        };

        let mut utilized: BTreeSet<String> = BTreeSet::new();
        utilized.insert(qname::prefix_of(&elem_name).unwrap_or("").to_owned());
        for attr in &attrs {
            if let Some(p) = qname::prefix_of(&attr.qualified_name) {
                if p != "xml" {
                    utilized.insert(p.to_owned());
                }
            }
        }
        for p in &self.inclusive_prefixes {
            if in_scope.contains_key(p) {
                utilized.insert(p.clone());
            }
        }

        let mut child_ns = rendered_ns.clone();
        let mut ns_decls: Vec<NsDecl> = Vec::new();
        for prefix in &utilized {
            let uri = in_scope.get(prefix).map_or("", String::as_str);
            let rendered = rendered_ns.get(prefix).map_or("", String::as_str);
            if uri == rendered {
                continue;
            }
            // An unbound prefix other than the default cannot be declared.
            if uri.is_empty() && !prefix.is_empty() {
                continue;
            }
            ns_decls.push(NsDecl {
                prefix: prefix.clone(),
                uri: uri.to_owned(),
            });
            child_ns.insert(prefix.clone(), uri.to_owned());
        }
        ns_decls.sort();

        output.push(b'<');
        output.extend_from_slice(elem_name.as_bytes());
        for ns_decl in &ns_decls {
            output.extend_from_slice(ns_decl.render().as_bytes());
        }
        for attr in &attrs {
            output.extend_from_slice(attr.render().as_bytes());
        }
        output.push(b'>');

        for child in node.children() {
            self.process_node(child, output, &child_ns);
        }

        output.extend_from_slice(b"</");
        output.extend_from_slice(elem_name.as_bytes());
        output.push(b'>');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exc(xml: &str, prefixes: &[String]) -> String {
        let doc = roxmltree::Document::parse(xml).unwrap();
        String::from_utf8(canonicalize(&doc, false, None, prefixes).unwrap()).unwrap()
    }

    #[test]
    fn drops_unused_namespaces() {
        let out = exc(r#"<a:r xmlns:a="urn:a" xmlns:b="urn:b"><c/></a:r>"#, &[]);
        assert_eq!(out, r#"<a:r xmlns:a="urn:a"><c></c></a:r>"#);
    }

    #[test]
    fn inclusive_prefix_list_keeps_namespace() {
        let out = exc(
            r#"<a:r xmlns:a="urn:a" xmlns:b="urn:b"/>"#,
            &["b".to_owned()],
        );
        assert_eq!(out, r#"<a:r xmlns:a="urn:a" xmlns:b="urn:b"></a:r>"#);
    }

    #[test]
    fn subtree_declares_namespaces_at_apex() {
        let xml = r#"<root xmlns:ds="urn:ds" xmlns:x="urn:x"><x:Props Id="p"><ds:Digest x:a="1"/></x:Props></root>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let props = doc.descendants().find(|n| n.attribute("Id") == Some("p")).unwrap();
        let set = NodeSet::tree_without_comments(props);
        let out = String::from_utf8(canonicalize(&doc, false, Some(&set), &[]).unwrap()).unwrap();
        assert_eq!(
            out,
            r#"<x:Props xmlns:x="urn:x" Id="p"><ds:Digest xmlns:ds="urn:ds" x:a="1"></ds:Digest></x:Props>"#
        );
    }

    #[test]
    fn default_namespace_undeclared() {
        let out = exc(r#"<r xmlns="urn:r"><c xmlns=""/></r>"#, &[]);
        assert_eq!(out, r#"<r xmlns="urn:r"><c xmlns=""></c></r>"#);
    }

    #[test]
    fn context_independent() {
        let a = exc(r#"<p:x xmlns:p="urn:p" xmlns:q="urn:q"><p:y/></p:x>"#, &[]);
        let b = exc(r#"<p:x xmlns:p="urn:p"><p:y/></p:x>"#, &[]);
        assert_eq!(a, b);
    }
}
