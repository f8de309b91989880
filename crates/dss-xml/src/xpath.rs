#![forbid(unsafe_code)]

//! Same-document reference resolution and ancestor tests.
//!
//! Only the patterns used by the signatures this engine produces and
//! consumes are supported:
//! - same-document URI references: `#id-value`
//! - `#xpointer(id('...'))`
//! - the ancestor-or-self axis (for signature exclusion)

use dss_core::Error;
use std::collections::HashMap;

/// Parse a same-document reference (e.g., `#foo` → `foo`).
///
/// `#xpointer(id('foo'))` is accepted too.
pub fn parse_same_document_ref(uri: &str) -> Option<&str> {
    let frag = uri.strip_prefix('#')?;
    Some(parse_xpointer_id(frag).unwrap_or(frag))
}

/// Resolve an ID value in a parsed document using a pre-built ID map.
pub fn resolve_id<'a, 'input>(
    doc: &'a roxmltree::Document<'input>,
    id_map: &HashMap<String, roxmltree::NodeId>,
    id: &str,
) -> Result<roxmltree::Node<'a, 'input>, Error> {
    id_map
        .get(id)
        .and_then(|nid| doc.get_node(*nid))
        .ok_or_else(|| Error::InvalidUri(format!("ID not found: {id}")))
}

/// Parse an `xpointer(id('...'))` expression and return the ID value.
pub fn parse_xpointer_id(expr: &str) -> Option<&str> {
    let inner = expr.strip_prefix("xpointer(id('")?;
    inner.strip_suffix("'))")
}

/// Check if `ancestor` is an ancestor-or-self of `node`.
pub fn is_ancestor_or_self(
    ancestor: roxmltree::Node<'_, '_>,
    node: roxmltree::Node<'_, '_>,
) -> bool {
    node.ancestors().any(|n| n.id() == ancestor.id())
}

/// Whether `node` or one of its ancestors is an element `{ns}local_name`.
pub fn has_ancestor_or_self_named(node: roxmltree::Node<'_, '_>, ns: &str, local_name: &str) -> bool {
    node.ancestors()
        .any(|n| crate::document::is_element(&n, ns, local_name))
}
