#![forbid(unsafe_code)]

//! Transform pipeline engine for the eID DSS engine.
//!
//! Implements the transform chain model from XML-DSig: each reference
//! contains a sequence of transforms that are applied in order.

pub mod enveloped;
pub mod pipeline;
pub mod relationship;
pub mod uri;

pub use enveloped::{EnvelopedSignatureTransform, SignatureExclusionTransform};
pub use pipeline::{C14nTransform, Transform, TransformData, TransformPipeline};
pub use relationship::RelationshipTransform;

use dss_c14n::C14nMode;
use dss_core::{algorithm, ns, Error};
use dss_xml::document::{child_element, child_elements};

/// Build the pipeline for a `<Transforms>` element of a reference that
/// belongs to the signature `signature`.
pub fn build_pipeline(
    transforms: Option<roxmltree::Node<'_, '_>>,
    signature: roxmltree::Node<'_, '_>,
) -> Result<TransformPipeline, Error> {
    let mut pipeline = TransformPipeline::new();
    let Some(transforms) = transforms else {
        return Ok(pipeline);
    };
    for t in child_elements(transforms, ns::DSIG, ns::node::TRANSFORM) {
        let alg = t
            .attribute(ns::attr::ALGORITHM)
            .ok_or_else(|| Error::MissingAttribute("Transform/@Algorithm".into()))?;
        let transform: Box<dyn Transform> = if let Some(mode) = C14nMode::from_uri(alg) {
            Box::new(C14nTransform::new(mode, read_inclusive_prefixes(t)))
        } else {
            match alg {
                algorithm::ENVELOPED_SIGNATURE => {
                    Box::new(EnvelopedSignatureTransform::new(signature.id()))
                }
                algorithm::XPATH => {
                    let xpath = child_element(t, ns::DSIG, ns::node::XPATH)
                        .ok_or_else(|| Error::MissingElement("XPath".into()))?;
                    Box::new(SignatureExclusionTransform::from_xpath_element(xpath)?)
                }
                algorithm::RELATIONSHIP => Box::new(RelationshipTransform::from_transform_element(t)),
                other => return Err(Error::UnsupportedAlgorithm(format!("transform {other}"))),
            }
        };
        pipeline.push(transform);
    }
    Ok(pipeline)
}

/// Read the `InclusiveNamespaces/@PrefixList` of an exclusive C14N element.
pub fn read_inclusive_prefixes(node: roxmltree::Node<'_, '_>) -> Vec<String> {
    child_element(node, ns::EXC_C14N, ns::node::INCLUSIVE_NAMESPACES)
        .and_then(|n| n.attribute(ns::attr::PREFIX_LIST))
        .map(|list| list.split_whitespace().map(str::to_owned).collect())
        .unwrap_or_default()
}
