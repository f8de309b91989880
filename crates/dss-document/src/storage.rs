#![forbid(unsafe_code)]

//! Session-scoped temporary storage.
//!
//! Container formats snapshot the input into a uniquely named temporary
//! file so the archive can be re-read while references are built and again
//! when the signed package is written. The file is removed by
//! [`TemporaryDataStorage::close`] or, failing that, when the storage is
//! dropped.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use dss_core::{Error, Result};
use tempfile::NamedTempFile;

/// A byte sink/source backed by a temporary file, plus string attributes.
#[derive(Debug)]
pub struct TemporaryDataStorage {
    file: Option<NamedTempFile>,
    attributes: HashMap<String, String>,
}

impl TemporaryDataStorage {
    /// Create the backing file in the system temporary directory.
    pub fn new() -> Result<Self> {
        Self::with_file(tempfile::Builder::new().prefix("dss-").suffix(".tmp").tempfile()?)
    }

    /// Create the backing file in `dir`.
    pub fn new_in(dir: &Path) -> Result<Self> {
        Self::with_file(
            tempfile::Builder::new()
                .prefix("dss-")
                .suffix(".tmp")
                .tempfile_in(dir)?,
        )
    }

    fn with_file(file: NamedTempFile) -> Result<Self> {
        log::debug!("temporary storage {}", file.path().display());
        Ok(Self {
            file: Some(file),
            attributes: HashMap::new(),
        })
    }

    fn file(&self) -> Result<&NamedTempFile> {
        self.file
            .as_ref()
            .ok_or_else(|| Error::Precondition("temporary storage already closed".into()))
    }

    /// Replace the stored bytes with `data`.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| Error::Precondition("temporary storage already closed".into()))?;
        let f = file.as_file_mut();
        f.set_len(0)?;
        f.seek(SeekFrom::Start(0))?;
        f.write_all(data)?;
        f.flush()?;
        Ok(())
    }

    /// A fresh read handle positioned at the start.
    pub fn open(&self) -> Result<File> {
        Ok(self.file()?.reopen()?)
    }

    /// Path of the backing file while it exists.
    pub fn path(&self) -> Option<PathBuf> {
        self.file.as_ref().map(|f| f.path().to_path_buf())
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    /// Delete the backing file. Later calls do nothing.
    pub fn close(&mut self) -> Result<()> {
        self.attributes.clear();
        match self.file.take() {
            Some(file) => {
                let path = file.path().to_path_buf();
                file.close()?;
                log::debug!("removed temporary storage {}", path.display());
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn stores_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = TemporaryDataStorage::new_in(dir.path()).unwrap();
        storage.write(b"first version").unwrap();
        storage.write(b"second").unwrap();
        let mut data = String::new();
        storage.open().unwrap().read_to_string(&mut data).unwrap();
        assert_eq!(data, "second");

        storage.set_attribute("signature-id", "xmldsig-1");
        assert_eq!(storage.attribute("signature-id"), Some("xmldsig-1"));

        let path = storage.path().unwrap();
        assert!(path.exists());
        storage.close().unwrap();
        storage.close().unwrap();
        assert!(!path.exists());
        assert!(storage.is_closed());
        assert!(storage.open().is_err());
        assert_eq!(storage.attribute("signature-id"), None);
    }

    #[test]
    fn drop_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let mut storage = TemporaryDataStorage::new_in(dir.path()).unwrap();
            storage.write(b"x").unwrap();
            storage.path().unwrap()
        };
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
