#![forbid(unsafe_code)]

//! NodeSet type for XML canonicalization and transforms.
//!
//! A `NodeSet` is a set of nodes of one parsed `roxmltree::Document`,
//! identified by their `NodeId`.  Attributes and namespace nodes are not
//! tracked separately: an element in the set is rendered with its full
//! attribute and namespace axes, which is all that same-document
//! references and signature-exclusion transforms need.

use std::collections::HashSet;

use roxmltree::{Document, Node, NodeId};

/// A set of XML document nodes identified by `NodeId`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSet {
    nodes: HashSet<NodeId>,
}

impl NodeSet {
    /// Create an empty node set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every node of the document, comments included.
    pub fn all(doc: &Document<'_>) -> Self {
        Self {
            nodes: doc.descendants().map(|n| n.id()).collect(),
        }
    }

    /// Every node of the document except comments.
    ///
    /// This is the node set selected by the same-document reference `URI=""`.
    pub fn all_without_comments(doc: &Document<'_>) -> Self {
        Self {
            nodes: doc
                .descendants()
                .filter(|n| !n.is_comment())
                .map(|n| n.id())
                .collect(),
        }
    }

    /// `node` and its descendants, comments excluded (`URI="#id"`).
    pub fn tree_without_comments(node: Node<'_, '_>) -> Self {
        Self {
            nodes: node
                .descendants()
                .filter(|n| !n.is_comment())
                .map(|n| n.id())
                .collect(),
        }
    }

    /// `node` and its descendants, comments included.
    pub fn tree_with_comments(node: Node<'_, '_>) -> Self {
        Self {
            nodes: node.descendants().map(|n| n.id()).collect(),
        }
    }

    pub fn contains(&self, node: &Node<'_, '_>) -> bool {
        self.nodes.contains(&node.id())
    }

    pub fn contains_id(&self, id: NodeId) -> bool {
        self.nodes.contains(&id)
    }

    pub fn insert(&mut self, node: &Node<'_, '_>) {
        self.nodes.insert(node.id());
    }

    /// Remove `node` and all of its descendants.
    pub fn remove_subtree(&mut self, node: Node<'_, '_>) {
        for d in node.descendants() {
            self.nodes.remove(&d.id());
        }
    }

    pub fn intersection(&self, other: &NodeSet) -> NodeSet {
        NodeSet {
            nodes: self.nodes.intersection(&other.nodes).copied().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}
