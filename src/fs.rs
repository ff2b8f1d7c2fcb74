use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};

#[cfg(unix)]
use std::os::unix::fs::FileExt;

/// Positional-I/O file used by the index, data, window and log files.
/// All reads and writes are offset-addressed so concurrent readers never
/// contend on a shared cursor; the logical size is tracked separately from
/// the inode so extension is atomic with respect to readers.
pub struct BlockFile {
    file: File,
    path: PathBuf,
    size: AtomicU64,
}

impl BlockFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::options()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            file,
            path,
            size: AtomicU64::new(size),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    /// Grows the file by `size` bytes and returns the offset of the new
    /// region.
    pub fn extend(&self, size: u64) -> Result<u64> {
        let off = self.size.fetch_add(size, Ordering::AcqRel);
        self.file.set_len(off + size)?;
        Ok(off)
    }

    pub fn truncate(&self, size: u64) -> Result<()> {
        self.file.set_len(size)?;
        self.size.store(size, Ordering::Release);
        Ok(())
    }

    #[cfg(unix)]
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        self.file
            .read_exact_at(buf, offset)
            .map_err(|e| Error::IoError(format!("read at {offset}: {e}")))
    }

    #[cfg(unix)]
    pub fn write_at(&self, buf: &[u8], offset: u64) -> Result<()> {
        self.file
            .write_all_at(buf, offset)
            .map_err(|e| Error::IoError(format!("write at {offset}: {e}")))?;
        // Writes past the tracked size keep it current.
        let end = offset + buf.len() as u64;
        self.size.fetch_max(end, Ordering::AcqRel);
        Ok(())
    }

    /// Flushes file content and metadata to stable storage.
    pub fn sync(&self) -> Result<()> {
        Ok(self.file.sync_all()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tmpfs::NamedTempFile;

    #[test]
    fn test_extend_and_write_read() {
        let tmp = NamedTempFile::new().expect("Failed to create temp file");
        let file = BlockFile::open(tmp.path()).expect("Failed to open");

        assert_eq!(file.size(), 0);
        let off = file.extend(64).expect("Failed to extend");
        assert_eq!(off, 0);
        assert_eq!(file.size(), 64);

        file.write_at(b"hello", 10).expect("Failed to write");
        let mut buf = [0u8; 5];
        file.read_at(&mut buf, 10).expect("Failed to read");
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn test_write_past_end_tracks_size() {
        let tmp = NamedTempFile::new().expect("Failed to create temp file");
        let file = BlockFile::open(tmp.path()).expect("Failed to open");

        file.write_at(b"abc", 100).expect("Failed to write");
        assert_eq!(file.size(), 103);
    }

    #[test]
    fn test_truncate() {
        let tmp = NamedTempFile::new().expect("Failed to create temp file");
        let file = BlockFile::open(tmp.path()).expect("Failed to open");

        file.extend(128).expect("Failed to extend");
        file.truncate(32).expect("Failed to truncate");
        assert_eq!(file.size(), 32);
    }

    #[test]
    fn test_size_survives_reopen() {
        let tmp = NamedTempFile::new().expect("Failed to create temp file");
        {
            let file = BlockFile::open(tmp.path()).expect("Failed to open");
            file.extend(256).expect("Failed to extend");
            file.sync().expect("Failed to sync");
        }
        let file = BlockFile::open(tmp.path()).expect("Failed to reopen");
        assert_eq!(file.size(), 256);
    }
}
