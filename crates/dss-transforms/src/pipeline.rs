#![forbid(unsafe_code)]

//! Transform pipeline and trait definitions.

use dss_c14n::C14nMode;
use dss_core::Error;
use dss_xml::NodeSet;

/// Data flowing through the transform pipeline.
///
/// A node set is expressed over the `NodeId`s of `xml_text` as parsed by
/// [`dss_xml::parse`]; re-parsing the same text yields the same ids.
#[derive(Debug, Clone)]
pub enum TransformData {
    /// XML node set (for XML-aware transforms like C14N).
    Xml {
        xml_text: String,
        node_set: Option<NodeSet>,
    },
    /// Raw binary data.
    Binary(Vec<u8>),
}

impl TransformData {
    /// Convert to binary, applying inclusive C14N to node sets.
    pub fn to_binary(&self) -> Result<Vec<u8>, Error> {
        match self {
            TransformData::Binary(data) => Ok(data.clone()),
            TransformData::Xml { xml_text, node_set } => {
                dss_c14n::canonicalize(xml_text, C14nMode::Inclusive, node_set.as_ref(), &[])
            }
        }
    }

    /// The XML text of this data, parsing octets as UTF-8 when needed.
    pub fn into_xml_text(self) -> Result<(String, Option<NodeSet>), Error> {
        match self {
            TransformData::Xml { xml_text, node_set } => Ok((xml_text, node_set)),
            TransformData::Binary(data) => {
                let text = String::from_utf8(data)
                    .map_err(|e| Error::Transform(format!("invalid UTF-8: {e}")))?;
                let text = match text.strip_prefix('\u{feff}') {
                    Some(t) => t.to_owned(),
                    None => text,
                };
                Ok((text, None))
            }
        }
    }
}

/// Trait for individual transforms.
pub trait Transform: Send {
    /// The algorithm URI for this transform.
    fn uri(&self) -> &str;

    /// Execute the transform on the given data.
    fn execute(&self, input: TransformData) -> Result<TransformData, Error>;
}

/// A pipeline of transforms executed in sequence.
#[derive(Default)]
pub struct TransformPipeline {
    transforms: Vec<Box<dyn Transform>>,
}

impl TransformPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, transform: Box<dyn Transform>) {
        self.transforms.push(transform);
    }

    /// Execute all transforms in order.
    pub fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        let mut data = input;
        for transform in &self.transforms {
            log::trace!("applying transform {}", transform.uri());
            data = transform.execute(data)?;
        }
        Ok(data)
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

// ── C14N Transform ───────────────────────────────────────────────────

/// A canonicalization transform.
pub struct C14nTransform {
    mode: C14nMode,
    inclusive_prefixes: Vec<String>,
}

impl C14nTransform {
    pub fn new(mode: C14nMode, inclusive_prefixes: Vec<String>) -> Self {
        Self {
            mode,
            inclusive_prefixes,
        }
    }
}

impl Transform for C14nTransform {
    fn uri(&self) -> &str {
        self.mode.uri()
    }

    fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        let (xml_text, node_set) = input.into_xml_text()?;
        let bytes = dss_c14n::canonicalize(
            &xml_text,
            self.mode,
            node_set.as_ref(),
            &self.inclusive_prefixes,
        )?;
        Ok(TransformData::Binary(bytes))
    }
}
