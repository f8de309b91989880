#![forbid(unsafe_code)]

//! Trust store: the certificates a verifier accepts as chain anchors.

use std::path::Path;

use dss_core::Result;

use crate::{cert, loader};

/// A collection of trusted DER certificates.
#[derive(Debug, Clone, Default)]
pub struct TrustStore {
    anchors: Vec<Vec<u8>>,
}

impl TrustStore {
    /// Create an empty trust store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a DER certificate. Duplicates are ignored.
    pub fn add_anchor(&mut self, der: Vec<u8>) -> Result<()> {
        cert::parse_certificate(&der)?;
        if !self.anchors.contains(&der) {
            self.anchors.push(der);
        }
        Ok(())
    }

    /// Add every certificate of a PEM bundle or DER file.
    pub fn load_file(&mut self, path: &Path) -> Result<usize> {
        let certs = loader::load_certificate_file(path)?;
        let n = certs.len();
        for der in certs {
            self.add_anchor(der)?;
        }
        log::debug!("loaded {n} trusted certificate(s) from {}", path.display());
        Ok(n)
    }

    pub fn anchors(&self) -> &[Vec<u8>] {
        &self.anchors
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }
}
