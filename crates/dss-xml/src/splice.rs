#![forbid(unsafe_code)]

//! In-place edits of serialized XML.
//!
//! Signature structures are completed after signing by inserting elements
//! into their serialized form. Edits are expressed against byte positions of
//! a parsed `roxmltree` document and applied to its input text, so the bytes
//! outside the edited spans are preserved exactly and existing digests stay
//! valid.

use dss_core::{Error, Result};
use roxmltree::Node;

/// A batch of text edits against one input string.
#[derive(Debug)]
pub struct Splicer<'a> {
    text: &'a str,
    edits: Vec<(usize, usize, String)>,
}

impl<'a> Splicer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            edits: Vec::new(),
        }
    }

    /// Insert `fragment` at byte offset `pos`.
    pub fn insert(&mut self, pos: usize, fragment: impl Into<String>) {
        self.edits.push((pos, pos, fragment.into()));
    }

    /// Replace the bytes `start..end` by `fragment`.
    pub fn replace(&mut self, start: usize, end: usize, fragment: impl Into<String>) {
        self.edits.push((start, end, fragment.into()));
    }

    /// Insert `fragment` right after `node`.
    pub fn insert_after(&mut self, node: &Node<'_, '_>, fragment: impl Into<String>) {
        self.insert(node.range().end, fragment);
    }

    /// Insert `fragment` right before `node`.
    pub fn insert_before(&mut self, node: &Node<'_, '_>, fragment: impl Into<String>) {
        self.insert(node.range().start, fragment);
    }

    /// Remove `node` entirely.
    pub fn remove(&mut self, node: &Node<'_, '_>) {
        let r = node.range();
        self.replace(r.start, r.end, "");
    }

    /// Append `fragment` as the last child of `element`.
    pub fn append_child(&mut self, element: &Node<'_, '_>, fragment: &str) -> Result<()> {
        let r = element.range();
        let src = self
            .text
            .get(r.clone())
            .ok_or_else(|| Error::XmlStructure("element range outside input".into()))?;
        if src.ends_with("/>") {
            let qname = crate::qname::element_qname(element);
            self.replace(r.end - 2, r.end, format!(">{fragment}</{qname}>"));
        } else {
            let close = src
                .rfind("</")
                .ok_or_else(|| Error::XmlStructure("element has no end tag".into()))?;
            self.insert(r.start + close, fragment);
        }
        Ok(())
    }

    /// Apply all edits. Edits must not overlap.
    pub fn finish(mut self) -> Result<String> {
        self.edits.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        let mut out = String::with_capacity(self.text.len());
        let mut cursor = 0;
        for (start, end, fragment) in &self.edits {
            if *start < cursor || *end > self.text.len() {
                return Err(Error::XmlStructure("overlapping XML edits".into()));
            }
            out.push_str(&self.text[cursor..*start]);
            out.push_str(fragment);
            cursor = *end;
        }
        out.push_str(&self.text[cursor..]);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_to_open_and_self_closing() {
        let xml = r#"<r><a>x</a><p:b xmlns:p="urn:p"/></r>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let a = doc.descendants().find(|n| n.has_tag_name("a")).unwrap();
        let b = doc.descendants().find(|n| n.has_tag_name(("urn:p", "b"))).unwrap();
        let mut s = Splicer::new(xml);
        s.append_child(&a, "<c/>").unwrap();
        s.append_child(&b, "<d/>").unwrap();
        assert_eq!(
            s.finish().unwrap(),
            r#"<r><a>x<c/></a><p:b xmlns:p="urn:p"><d/></p:b></r>"#
        );
    }

    #[test]
    fn insert_after_and_remove() {
        let xml = "<r><a/><b/></r>";
        let doc = roxmltree::Document::parse(xml).unwrap();
        let a = doc.descendants().find(|n| n.has_tag_name("a")).unwrap();
        let b = doc.descendants().find(|n| n.has_tag_name("b")).unwrap();
        let mut s = Splicer::new(xml);
        s.insert_after(&a, "<x/>");
        s.remove(&b);
        assert_eq!(s.finish().unwrap(), "<r><a/><x/></r>");
    }

    #[test]
    fn overlapping_edits_fail() {
        let mut s = Splicer::new("<r/>");
        s.replace(0, 3, "");
        s.replace(1, 2, "");
        assert!(s.finish().is_err());
    }
}
