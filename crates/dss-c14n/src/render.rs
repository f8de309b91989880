#![forbid(unsafe_code)]

//! Shared rendering utilities for C14N output.
//!
//! Escaping rules:
//! - Text nodes: `&` → `&amp;`, `<` → `&lt;`, `>` → `&gt;`, `\r` → `&#xD;`
//! - Attribute values: additionally `"` → `&quot;`, `\t` → `&#x9;`, `\n` → `&#xA;`
//! - PI data: `\r` → `&#xD;`

use roxmltree::{Node, NodeType};

/// A namespace declaration to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsDecl {
    /// The prefix ("" for default namespace).
    pub prefix: String,
    /// The namespace URI.
    pub uri: String,
}

impl NsDecl {
    pub fn render(&self) -> String {
        if self.prefix.is_empty() {
            format!(" xmlns=\"{}\"", escape_attr(&self.uri))
        } else {
            format!(" xmlns:{}=\"{}\"", self.prefix, escape_attr(&self.uri))
        }
    }
}

impl Ord for NsDecl {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Default namespace first, then by prefix.
        match (self.prefix.is_empty(), other.prefix.is_empty()) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => self.prefix.cmp(&other.prefix),
        }
    }
}

impl PartialOrd for NsDecl {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// An attribute to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    /// The namespace URI of the attribute ("" for no namespace).
    pub ns_uri: String,
    pub local_name: String,
    /// The qualified name (prefix:local or just local).
    pub qualified_name: String,
    pub value: String,
}

impl Attr {
    pub fn render(&self) -> String {
        format!(" {}=\"{}\"", self.qualified_name, escape_attr(&self.value))
    }

    /// Attributes of `node` with their written qualified names.
    pub fn collect(node: &Node<'_, '_>) -> Vec<Attr> {
        let qnames = dss_xml::qname::attribute_qnames(node);
        node.attributes()
            .zip(qnames)
            .map(|(a, qname)| Attr {
                ns_uri: a.namespace().unwrap_or("").to_owned(),
                local_name: a.name().to_owned(),
                qualified_name: qname,
                value: a.value().to_owned(),
            })
            .collect()
    }
}

impl Ord for Attr {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // No-namespace attributes first, by local name; then by (ns, local).
        match (self.ns_uri.is_empty(), other.ns_uri.is_empty()) {
            (true, true) => self.local_name.cmp(&other.local_name),
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            (false, false) => self
                .ns_uri
                .cmp(&other.ns_uri)
                .then(self.local_name.cmp(&other.local_name)),
        }
    }
}

impl PartialOrd for Attr {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Escape text node content.
pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escape an attribute value.
pub fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escape processing instruction data.
pub fn escape_pi(s: &str) -> String {
    s.replace('\r', "&#xD;")
}

/// Render a comment or processing instruction node.
///
/// Outside the document element these are separated from it by a line feed.
pub fn render_misc(node: &Node<'_, '_>, output: &mut Vec<u8>) {
    let parent_is_root = node
        .parent()
        .is_some_and(|p| p.node_type() == NodeType::Root);
    if parent_is_root && node.prev_siblings().any(|s| s.is_element()) {
        output.push(b'\n');
    }
    match node.node_type() {
        NodeType::Comment => {
            output.extend_from_slice(b"<!--");
            output.extend_from_slice(node.text().unwrap_or("").as_bytes());
            output.extend_from_slice(b"-->");
        }
        NodeType::PI => {
            if let Some(pi) = node.pi() {
                output.extend_from_slice(b"<?");
                output.extend_from_slice(pi.target.as_bytes());
                if let Some(value) = pi.value {
                    if !value.is_empty() {
                        output.push(b' ');
                        output.extend_from_slice(escape_pi(value).as_bytes());
                    }
                }
                output.extend_from_slice(b"?>");
            }
        }
        _ => {}
    }
    if parent_is_root && node.next_siblings().any(|s| s.is_element()) {
        output.push(b'\n');
    }
}
