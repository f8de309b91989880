#![forbid(unsafe_code)]

//! Random-access views of the document being signed or verified.
//!
//! Container facets enumerate entries and digest their bytes; verification
//! dereferences detached references through the same trait.

use std::cell::RefCell;
use std::io::{Read, Seek};

use dss_core::{Error, Result};
use zip::ZipArchive;

/// Entry-level access to a document.
pub trait DocumentSource {
    /// Names of the non-directory entries, in archive order.
    fn entry_names(&self) -> Vec<String>;

    /// The uncompressed bytes of the entry `name`.
    fn read_entry(&self, name: &str) -> Result<Vec<u8>>;

    fn contains(&self, name: &str) -> bool {
        self.entry_names().iter().any(|n| n == name)
    }
}

/// A document without entries (plain XML).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSource;

impl DocumentSource for NoSource {
    fn entry_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn read_entry(&self, name: &str) -> Result<Vec<u8>> {
        Err(Error::InvalidUri(format!("no external data: {name}")))
    }
}

/// A ZIP archive.
pub struct ZipSource<R: Read + Seek> {
    archive: RefCell<ZipArchive<R>>,
    names: Vec<String>,
}

impl<R: Read + Seek> ZipSource<R> {
    pub fn new(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader).map_err(zip_err)?;
        let mut names = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let file = archive.by_index_raw(i).map_err(zip_err)?;
            if !file.is_dir() {
                names.push(file.name().to_owned());
            }
        }
        Ok(Self {
            archive: RefCell::new(archive),
            names,
        })
    }

    pub fn into_inner(self) -> ZipArchive<R> {
        self.archive.into_inner()
    }
}

impl<R: Read + Seek> DocumentSource for ZipSource<R> {
    fn entry_names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn read_entry(&self, name: &str) -> Result<Vec<u8>> {
        let mut archive = self.archive.borrow_mut();
        let mut file = archive
            .by_name(name)
            .map_err(|e| Error::InvalidUri(format!("entry {name}: {e}")))?;
        let mut data = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
        file.read_to_end(&mut data)?;
        Ok(data)
    }

    fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }
}

pub(crate) fn zip_err(e: zip::result::ZipError) -> Error {
    Error::Zip(e.to_string())
}
