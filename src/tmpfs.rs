//! Test fixtures over the `tempfile` crate: scratch directories and files
//! that clean themselves up when dropped.

use std::path::Path;

pub struct TempDir {
    inner: tempfile::TempDir,
}

impl TempDir {
    pub fn new() -> std::io::Result<Self> {
        let inner = tempfile::Builder::new().prefix("emberdb_test_").tempdir()?;
        Ok(Self { inner })
    }

    pub fn path(&self) -> &Path {
        self.inner.path()
    }
}

pub struct NamedTempFile {
    inner: tempfile::NamedTempFile,
}

impl NamedTempFile {
    pub fn new() -> std::io::Result<Self> {
        let inner = tempfile::Builder::new()
            .prefix("emberdb_file_")
            .tempfile()?;
        Ok(Self { inner })
    }

    pub fn path(&self) -> &Path {
        self.inner.path()
    }
}
