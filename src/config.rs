use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::codec::Cipher;

/// Configuration for an EmberDB database.
#[derive(Clone)]
pub struct Options {
    /// Directory path for the database files.
    pub dir: PathBuf,

    /// Time between background sync cycles that materialize staged entries
    /// into the index, data and window files (default: 1s).
    ///
    /// Setting the value to zero disables background synchronization.
    pub background_sync_interval: Duration,

    /// Sync after every write instead of on the background interval
    /// (default: false).
    pub sync_writes: bool,

    /// Run the time-mark expirer in the background (default: true).
    pub background_key_expiry: bool,

    /// Encrypt all payloads (default: false). Requires `cipher`.
    pub encryption: bool,

    /// AEAD cipher used when encryption is requested.
    pub cipher: Option<Arc<dyn Cipher>>,

    /// Maximum memory for staged blocks before writes back off (default: 1 GiB).
    pub block_cache_size: u64,

    /// Number of writes coalesced into one tiny batch before an early flush
    /// (default: 100).
    pub tiny_batch_size: usize,

    /// Interval at which accumulated tiny batches are flushed to the write
    /// ahead log (default: 15ms).
    pub tiny_batch_write_interval: Duration,

    /// Maximum size of the staging store (default: 1 GiB).
    pub memdb_size: u64,

    /// Size the write ahead log grows to before reclaimed segments are
    /// reused (default: 1 GiB).
    pub log_size: u64,

    /// Allow deletes (default: false, the database is immutable).
    pub mutable: bool,

    /// Truncate the write ahead log instead of failing when recovery finds
    /// corruption (default: false).
    pub reset_log: bool,
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("dir", &self.dir)
            .field("background_sync_interval", &self.background_sync_interval)
            .field("sync_writes", &self.sync_writes)
            .field("background_key_expiry", &self.background_key_expiry)
            .field("encryption", &self.encryption)
            .field("cipher", &self.cipher.as_ref().map(|_| "..."))
            .field("block_cache_size", &self.block_cache_size)
            .field("tiny_batch_size", &self.tiny_batch_size)
            .field("tiny_batch_write_interval", &self.tiny_batch_write_interval)
            .field("memdb_size", &self.memdb_size)
            .field("log_size", &self.log_size)
            .field("mutable", &self.mutable)
            .field("reset_log", &self.reset_log)
            .finish()
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./emberdb"),
            background_sync_interval: Duration::from_secs(1),
            sync_writes: false,
            background_key_expiry: true,
            encryption: false,
            cipher: None,
            block_cache_size: 1 << 30,
            tiny_batch_size: 100,
            tiny_batch_write_interval: Duration::from_millis(15),
            memdb_size: 1 << 30,
            log_size: 1 << 30,
            mutable: false,
            reset_log: false,
        }
    }
}

impl Options {
    /// Create options with the given database directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }

    /// Set the background sync interval; zero disables background sync.
    pub fn background_sync_interval(mut self, interval: Duration) -> Self {
        self.background_sync_interval = interval;
        self
    }

    /// Sync after every write operation.
    pub fn sync_writes(mut self, enabled: bool) -> Self {
        self.sync_writes = enabled;
        self
    }

    /// Enable or disable the background time-mark expirer.
    pub fn background_key_expiry(mut self, enabled: bool) -> Self {
        self.background_key_expiry = enabled;
        self
    }

    /// Encrypt all payloads with the configured cipher.
    pub fn encryption(mut self, enabled: bool) -> Self {
        self.encryption = enabled;
        self
    }

    /// Set the AEAD cipher used for encrypted payloads.
    pub fn cipher(mut self, cipher: Arc<dyn Cipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// Set maximum memory for staged blocks.
    pub fn block_cache_size(mut self, size: u64) -> Self {
        self.block_cache_size = size;
        self
    }

    /// Set the tiny batch size.
    pub fn tiny_batch_size(mut self, size: usize) -> Self {
        self.tiny_batch_size = size;
        self
    }

    /// Set the tiny batch write interval.
    pub fn tiny_batch_write_interval(mut self, interval: Duration) -> Self {
        self.tiny_batch_write_interval = interval;
        self
    }

    /// Set the maximum size of the staging store.
    pub fn memdb_size(mut self, size: u64) -> Self {
        self.memdb_size = size;
        self
    }

    /// Set the target size of the write ahead log.
    pub fn log_size(mut self, size: u64) -> Self {
        self.log_size = size;
        self
    }

    /// Allow deletes.
    pub fn mutable(mut self, enabled: bool) -> Self {
        self.mutable = enabled;
        self
    }

    /// Truncate the write ahead log when recovery finds corruption.
    pub fn reset_log(mut self, enabled: bool) -> Self {
        self.reset_log = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = Options::default();
        assert_eq!(opts.dir, PathBuf::from("./emberdb"));
        assert_eq!(opts.background_sync_interval, Duration::from_secs(1));
        assert_eq!(opts.tiny_batch_size, 100);
        assert_eq!(opts.tiny_batch_write_interval, Duration::from_millis(15));
        assert_eq!(opts.block_cache_size, 1 << 30);
        assert!(opts.background_key_expiry);
        assert!(!opts.mutable);
        assert!(!opts.encryption);
    }

    #[test]
    fn test_options_builder() {
        let opts = Options::new("/tmp/test")
            .tiny_batch_size(10)
            .tiny_batch_write_interval(Duration::from_millis(5))
            .background_sync_interval(Duration::ZERO)
            .mutable(true);

        assert_eq!(opts.dir, PathBuf::from("/tmp/test"));
        assert_eq!(opts.tiny_batch_size, 10);
        assert_eq!(opts.tiny_batch_write_interval, Duration::from_millis(5));
        assert_eq!(opts.background_sync_interval, Duration::ZERO);
        assert!(opts.mutable);
    }
}
