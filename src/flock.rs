use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Exclusive advisory lock on the database directory. Held for the lifetime
/// of the open database; a second process opening the same directory fails
/// with [`Error::Locked`].
pub struct FileLock {
    _file: File,
    path: PathBuf,
}

impl FileLock {
    /// Creates the lock file (containing the holder's process ID) and
    /// acquires the lock.
    pub fn lock<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        Self::try_lock(&file).map_err(|e| Error::Locked(e.to_string()))?;

        // Record the process ID for debugging.
        writeln!(file, "{}", std::process::id())?;
        file.flush()?;

        Ok(Self { _file: file, path })
    }

    #[cfg(unix)]
    fn try_lock(file: &File) -> std::io::Result<()> {
        use libc::{flock, LOCK_EX, LOCK_NB};

        let fd = file.as_raw_fd();
        let result = unsafe { flock(fd, LOCK_EX | LOCK_NB) };
        if result != 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn try_lock(_file: &File) -> std::io::Result<()> {
        Ok(())
    }

    /// Releases the lock. The lock file is left in place; removing it would
    /// race with another process acquiring it.
    pub fn unlock(self) -> Result<()> {
        Ok(())
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // The OS releases the lock when the file handle closes.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tmpfs::TempDir;

    #[test]
    fn test_lock_and_unlock() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let lock_path = dir.path().join("db.lock");

        let lock = FileLock::lock(&lock_path).expect("Failed to acquire lock");
        assert!(lock_path.exists());
        let content = std::fs::read_to_string(&lock_path).expect("Failed to read lock file");
        assert!(content.contains(&std::process::id().to_string()));

        lock.unlock().expect("Failed to release lock");
    }

    #[test]
    fn test_double_lock() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let lock_path = dir.path().join("db.lock");

        let _lock1 = FileLock::lock(&lock_path).expect("Failed to acquire first lock");
        let lock2 = FileLock::lock(&lock_path);
        assert!(matches!(lock2, Err(Error::Locked(_))));
    }

    #[test]
    fn test_relock_after_drop() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let lock_path = dir.path().join("db.lock");

        {
            let _lock = FileLock::lock(&lock_path).expect("Failed to acquire lock");
            assert!(lock_path.exists());
        }

        let _lock2 = FileLock::lock(&lock_path).expect("Should reacquire after drop");
    }
}
