#![forbid(unsafe_code)]

//! Qualified-name recovery.
//!
//! roxmltree resolves names to `(namespace, local)` pairs and drops the
//! prefixes. Canonical XML renders the prefixes exactly as written, so they
//! are read back from the element's start tag in the input text.

use roxmltree::Node;

/// The raw start tag (`<p:name a="1">`) of an element.
fn start_tag<'input>(node: &Node<'_, 'input>) -> Option<&'input str> {
    let text = node.document().input_text();
    let rest = text.get(node.range().start..)?;
    if !rest.starts_with('<') {
        return None;
    }
    let mut quote: Option<char> = None;
    for (i, c) in rest.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '>') => return rest.get(..=i),
            _ => {}
        }
    }
    None
}

/// Split a start tag into its element qname and attribute qnames, in
/// document order, namespace declarations included.
fn split_start_tag(tag: &str) -> Option<(&str, Vec<&str>)> {
    let body = tag.strip_prefix('<')?;
    let is_name_end = |c: char| c.is_whitespace() || c == '/' || c == '>';
    let name_end = body.find(is_name_end)?;
    let qname = &body[..name_end];
    let mut rest = &body[name_end..];
    let mut attrs = Vec::new();
    loop {
        rest = rest.trim_start();
        if rest.is_empty() || rest.starts_with('/') || rest.starts_with('>') {
            break;
        }
        let eq = rest.find('=')?;
        attrs.push(rest[..eq].trim_end());
        rest = rest[eq + 1..].trim_start();
        let q = rest.chars().next()?;
        if q != '"' && q != '\'' {
            return None;
        }
        let close = rest[1..].find(q)? + 1;
        rest = &rest[close + 1..];
    }
    Some((qname, attrs))
}

/// Prefix of an element as written, `None` for unprefixed names.
pub fn element_prefix(node: &Node<'_, '_>) -> Option<String> {
    let qname = element_qname(node);
    qname.split_once(':').map(|(p, _)| p.to_owned())
}

/// Qualified element name (`prefix:local` or `local`).
pub fn element_qname(node: &Node<'_, '_>) -> String {
    start_tag(node)
        .and_then(split_start_tag)
        .map(|(q, _)| q.to_owned())
        .unwrap_or_else(|| node.tag_name().name().to_owned())
}

/// Qualified names of an element's attributes, aligned with
/// `node.attributes()`.
pub fn attribute_qnames(node: &Node<'_, '_>) -> Vec<String> {
    let written: Vec<String> = start_tag(node)
        .and_then(split_start_tag)
        .map(|(_, attrs)| {
            attrs
                .into_iter()
                .filter(|a| *a != "xmlns" && !a.starts_with("xmlns:"))
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();
    let attrs: Vec<_> = node.attributes().collect();
    if written.len() == attrs.len() {
        return written;
    }
    // Attributes defaulted from a DTD are not in the start tag.
    attrs
        .iter()
        .map(|a| match a.namespace() {
            Some(dss_core::ns::XML) => format!("xml:{}", a.name()),
            Some(uri) => match node.lookup_prefix(uri) {
                Some(p) if !p.is_empty() => format!("{p}:{}", a.name()),
                _ => a.name().to_owned(),
            },
            None => a.name().to_owned(),
        })
        .collect()
}

/// Prefix of a qualified name, `None` when unprefixed.
pub fn prefix_of(qname: &str) -> Option<&str> {
    qname.split_once(':').map(|(p, _)| p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_come_from_source() {
        let xml = r#"<ds:Sig xmlns:ds="urn:d" xmlns:x="urn:d" x:Id='a>b' plain="1"><x:Child/></ds:Sig>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let root = doc.root_element();
        assert_eq!(element_qname(&root), "ds:Sig");
        assert_eq!(attribute_qnames(&root), vec!["x:Id", "plain"]);
        let child = root.first_child().unwrap();
        assert_eq!(element_qname(&child), "x:Child");
        assert_eq!(element_prefix(&child).as_deref(), Some("x"));
    }

    #[test]
    fn unprefixed_and_self_closing() {
        let doc = roxmltree::Document::parse(r#"<a xmlns="urn:z"><b/></a>"#).unwrap();
        let b = doc.root_element().first_child().unwrap();
        assert_eq!(element_qname(&b), "b");
        assert!(element_prefix(&b).is_none());
        assert!(attribute_qnames(&b).is_empty());
    }
}
