#![forbid(unsafe_code)]

//! XML document wrapper over roxmltree with ID attribute registration.

use dss_core::Error;
use std::collections::HashMap;

/// An owned XML document.  Stores the text and pre-computed metadata.
///
/// To work with the parsed tree, call [`XmlDocument::parse_doc`] which
/// returns a temporary `roxmltree::Document` borrowing from the text.
pub struct XmlDocument {
    text: String,
}

impl XmlDocument {
    /// Parse and validate XML from a string, taking ownership.
    pub fn parse(text: String) -> Result<Self, Error> {
        crate::parse(&text)?;
        Ok(Self { text })
    }

    /// Parse and validate XML from bytes.
    pub fn parse_bytes(data: &[u8]) -> Result<Self, Error> {
        let text = std::str::from_utf8(data)
            .map_err(|e| Error::XmlParse(format!("invalid UTF-8: {e}")))?;
        // A UTF-8 byte order mark is legal in container parts.
        let text = text.strip_prefix('\u{feff}').unwrap_or(text).to_owned();
        Self::parse(text)
    }

    /// Get the raw XML text.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    /// Parse the document and return a temporary `roxmltree::Document`.
    pub fn parse_doc(&self) -> Result<roxmltree::Document<'_>, Error> {
        crate::parse(&self.text)
    }

    /// Build the ID → NodeId mapping for a parsed document.
    ///
    /// `Id`, `ID` and `id` attributes are registered.
    pub fn build_id_map(doc: &roxmltree::Document<'_>) -> HashMap<String, roxmltree::NodeId> {
        let default_attrs = ["Id", "ID", "id"];
        let mut map = HashMap::new();
        for node in doc.descendants().filter(|n| n.is_element()) {
            for attr_name in &default_attrs {
                if let Some(val) = node.attribute(*attr_name) {
                    map.insert(val.to_owned(), node.id());
                }
            }
        }
        map
    }

    /// Find an element by its registered ID value in a parsed document.
    pub fn find_by_id<'a, 'input>(
        doc: &'a roxmltree::Document<'input>,
        id_map: &HashMap<String, roxmltree::NodeId>,
        id: &str,
    ) -> Option<roxmltree::Node<'a, 'input>> {
        let node_id = id_map.get(id)?;
        doc.get_node(*node_id)
    }

    /// Find the first descendant element with the given local name and namespace.
    pub fn find_element<'a, 'input>(
        doc: &'a roxmltree::Document<'input>,
        ns: &str,
        local_name: &str,
    ) -> Option<roxmltree::Node<'a, 'input>> {
        doc.descendants().find(|n| is_element(n, ns, local_name))
    }

    /// Find all descendant elements with the given local name and namespace.
    pub fn find_elements<'a, 'input>(
        doc: &'a roxmltree::Document<'input>,
        ns: &str,
        local_name: &str,
    ) -> Vec<roxmltree::Node<'a, 'input>> {
        doc.descendants()
            .filter(|n| is_element(n, ns, local_name))
            .collect()
    }
}

/// Whether `node` is an element named `{ns}local_name`.
pub fn is_element(node: &roxmltree::Node<'_, '_>, ns: &str, local_name: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local_name
        && node.tag_name().namespace().unwrap_or("") == ns
}

/// First child element named `{ns}local_name`.
pub fn child_element<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    ns: &str,
    local_name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    node.children().find(|c| is_element(c, ns, local_name))
}

/// All child elements named `{ns}local_name`, in document order.
pub fn child_elements<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    ns: &str,
    local_name: &str,
) -> impl Iterator<Item = roxmltree::Node<'a, 'input>> + 'a
where
    'input: 'a,
{
    let ns = ns.to_owned();
    let local_name = local_name.to_owned();
    node.children()
        .filter(move |c| is_element(c, &ns, &local_name))
}

/// Follow a path of child elements in one namespace.
pub fn descend<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    ns: &str,
    path: &[&str],
) -> Option<roxmltree::Node<'a, 'input>> {
    let mut current = node;
    for name in path {
        current = child_element(current, ns, name)?;
    }
    Some(current)
}

/// Concatenated text content of an element, trimmed.
pub fn element_text(node: roxmltree::Node<'_, '_>) -> String {
    let mut out = String::new();
    for d in node.descendants().filter(|d| d.is_text()) {
        if let Some(t) = d.text() {
            out.push_str(t);
        }
    }
    out.trim().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const XML: &str = r#"<r xmlns:a="urn:a"><a:x Id="one">t1</a:x><a:x ID="two"> t2 </a:x><y id="three"/></r>"#;

    #[test]
    fn id_map_registers_all_spellings() {
        let doc = crate::parse(XML).unwrap();
        let map = XmlDocument::build_id_map(&doc);
        assert_eq!(map.len(), 3);
        let n = XmlDocument::find_by_id(&doc, &map, "two").unwrap();
        assert_eq!(element_text(n), "t2");
    }

    #[test]
    fn child_lookup_respects_namespace() {
        let doc = crate::parse(XML).unwrap();
        let root = doc.root_element();
        assert_eq!(child_elements(root, "urn:a", "x").count(), 2);
        assert!(child_element(root, "", "x").is_none());
        assert!(child_element(root, "", "y").is_some());
    }

    #[test]
    fn bom_is_stripped() {
        let mut data = "\u{feff}".as_bytes().to_vec();
        data.extend_from_slice(b"<a/>");
        let doc = XmlDocument::parse_bytes(&data).unwrap();
        assert_eq!(doc.text(), "<a/>");
    }

    #[test]
    fn rejects_malformed() {
        assert!(matches!(
            XmlDocument::parse("<a>".into()),
            Err(Error::XmlParse(_))
        ));
    }
}
