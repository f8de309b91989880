#![forbid(unsafe_code)]

//! OPC Relationship transform.
//!
//! Selects the `Relationship` elements of a relationships part whose `Id` is
//! listed in a `RelationshipReference` (or whose `Type` is listed in a
//! `RelationshipsGroupReference`), sorts them by `Id`, makes the default
//! `TargetMode="Internal"` explicit and drops everything else. The result is
//! normally canonicalized by a following C14N transform.

use crate::pipeline::{Transform, TransformData};
use dss_core::{algorithm, ns, Error};
use dss_xml::XmlWriter;

const RELATIONSHIP_REFERENCE: &str = "RelationshipReference";
const RELATIONSHIPS_GROUP_REFERENCE: &str = "RelationshipsGroupReference";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationshipTransform {
    source_ids: Vec<String>,
    source_types: Vec<String>,
}

impl RelationshipTransform {
    pub fn new(source_ids: Vec<String>, source_types: Vec<String>) -> Self {
        Self {
            source_ids,
            source_types,
        }
    }

    /// Read the selectors from a `<Transform>` element.
    pub fn from_transform_element(transform: roxmltree::Node<'_, '_>) -> Self {
        let mut t = Self::default();
        for child in transform.children().filter(|c| c.is_element()) {
            if child.tag_name().namespace() != Some(ns::OPC_DSIG) {
                continue;
            }
            match child.tag_name().name() {
                RELATIONSHIP_REFERENCE => {
                    if let Some(id) = child.attribute("SourceId") {
                        t.source_ids.push(id.to_owned());
                    }
                }
                RELATIONSHIPS_GROUP_REFERENCE => {
                    if let Some(ty) = child.attribute("SourceType") {
                        t.source_types.push(ty.to_owned());
                    }
                }
                _ => {}
            }
        }
        t
    }

    pub fn source_ids(&self) -> &[String] {
        &self.source_ids
    }

    /// Write the transform's parameter elements (`mdssi` prefix assumed bound).
    pub fn write_parameters(&self, w: &mut XmlWriter) {
        for id in &self.source_ids {
            w.empty_element(
                &format!("mdssi:{RELATIONSHIP_REFERENCE}"),
                &[("xmlns:mdssi", ns::OPC_DSIG), ("SourceId", id)],
            );
        }
        for ty in &self.source_types {
            w.empty_element(
                &format!("mdssi:{RELATIONSHIPS_GROUP_REFERENCE}"),
                &[("xmlns:mdssi", ns::OPC_DSIG), ("SourceType", ty)],
            );
        }
    }

    fn selects(&self, id: &str, ty: &str) -> bool {
        self.source_ids.iter().any(|s| s == id) || self.source_types.iter().any(|s| s == ty)
    }
}

impl Transform for RelationshipTransform {
    fn uri(&self) -> &str {
        algorithm::RELATIONSHIP
    }

    fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        let (xml_text, _) = input.into_xml_text()?;
        let doc = dss_xml::parse(&xml_text)?;
        let root = doc.root_element();
        if !dss_xml::document::is_element(&root, ns::RELATIONSHIPS, "Relationships") {
            return Err(Error::Transform("not a relationships part".into()));
        }

        let mut selected: Vec<(String, String, String, String)> = Vec::new();
        for rel in dss_xml::document::child_elements(root, ns::RELATIONSHIPS, "Relationship") {
            let id = rel.attribute("Id").unwrap_or("");
            let ty = rel.attribute("Type").unwrap_or("");
            if !self.selects(id, ty) {
                continue;
            }
            selected.push((
                id.to_owned(),
                rel.attribute("Target").unwrap_or("").to_owned(),
                rel.attribute("TargetMode").unwrap_or("Internal").to_owned(),
                ty.to_owned(),
            ));
        }
        selected.sort_by(|a, b| a.0.cmp(&b.0));

        let mut w = XmlWriter::new();
        w.start_element("Relationships", &[("xmlns", ns::RELATIONSHIPS)]);
        for (id, target, mode, ty) in &selected {
            w.empty_element(
                "Relationship",
                &[("Id", id), ("Target", target), ("TargetMode", mode), ("Type", ty)],
            );
        }
        w.end_element("Relationships");
        Ok(TransformData::Xml {
            xml_text: w.into_string(),
            node_set: None,
        })
    }
}
