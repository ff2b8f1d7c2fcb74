//! In-memory staging store partitioned by TimeId.
//!
//! Every write lands in the block of the current tiny batch's TimeId and
//! becomes durable once the batch's group reaches the write-ahead log. A
//! block stays queryable until its TimeId is released in the time mark and
//! the owner has materialized it into the permanent files, at which point
//! `release_log` drops the block and signals the log group applied.

pub(crate) mod block;
pub(crate) mod timelock;
pub(crate) mod timemark;
pub(crate) mod tiny;

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use byteorder::{ByteOrder, LittleEndian};
use crossbeam_skiplist::SkipMap;

use crate::config::Options;
use crate::error::{Error, Result};
use crate::memdb::block::{Block, IKey, FRAME_OVERHEAD};
use crate::memdb::timelock::TimeLock;
use crate::memdb::timemark::TimeMark;
use crate::memdb::tiny::{BatchPool, TinyBatch};
use crate::wal::{Wal, WalOptions};

/// Nanosecond-resolution logical epoch key for staging blocks and log
/// groups.
pub(crate) type TimeId = i64;

/// Log file name inside the database directory.
const LOG_FILE_NAME: &str = "data.log";

/// Worker pool size for tiny batch commits.
const N_POOL_SIZE: usize = 27;

/// Released TimeIds are swept from the time mark after this long.
const TIME_MARK_EXPIRY: Duration = Duration::from_secs(60);

pub(crate) struct Memdb {
    pub(crate) core: Arc<MemCore>,
    pool: BatchPool,
}

pub(crate) struct MemCore {
    blocks: SkipMap<TimeId, Arc<Block>>,
    pub(crate) time_mark: TimeMark,
    time_lock: TimeLock,
    tiny: RwLock<Arc<TinyBatch>>,
    wal: Wal,
    /// Single-token latch serializing all log writes.
    write_lock: Mutex<()>,
    tiny_batch_size: usize,
    max_size: u64,
    size: AtomicU64,
    closed: AtomicBool,
}

impl Memdb {
    /// Opens the staging store and its write-ahead log. Returns the store
    /// plus the surviving records of any unapplied log groups, keyed by
    /// internal key; the owner re-ingests them through the normal write
    /// path.
    pub fn open(dir: &Path, opts: &Options) -> Result<(Self, HashMap<u64, Vec<u8>>)> {
        let (wal, need_recovery) = Wal::new(WalOptions {
            path: dir.join(LOG_FILE_NAME),
            target_size: opts.log_size as i64,
            reset: opts.reset_log,
        })?;

        let mut recovered: HashMap<u64, Vec<u8>> = HashMap::new();
        if need_recovery && !opts.reset_log {
            let mut reader = wal.reader()?;
            reader.read(|_, group| {
                while let Some(data) = group.next()? {
                    if data.len() < 9 {
                        return Err(Error::Corrupted("log record too short".to_string()));
                    }
                    let del = data[0] == 1;
                    let key = LittleEndian::read_u64(&data[1..9]);
                    if del {
                        recovered.remove(&key);
                    } else {
                        recovered.insert(key, data[9..].to_vec());
                    }
                }
                Ok(false)
            })?;
            tracing::info!(records = recovered.len(), "log replay complete");
            wal.reset()?;
        } else if need_recovery {
            wal.reset()?;
        }

        let time_mark = TimeMark::new(TIME_MARK_EXPIRY);
        let tiny = TinyBatch::new(time_mark.new_time_id(), false);
        let core = Arc::new(MemCore {
            blocks: SkipMap::new(),
            time_mark,
            time_lock: TimeLock::new(),
            tiny: RwLock::new(tiny),
            wal,
            write_lock: Mutex::new(()),
            tiny_batch_size: opts.tiny_batch_size.max(1),
            max_size: opts.memdb_size,
            size: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });
        let pool = BatchPool::new(Arc::downgrade(&core), N_POOL_SIZE);

        Ok((Self { core, pool }, recovered))
    }

    /// Stages a live record under the current tiny batch's TimeId.
    pub fn put(&self, key: u64, payload: &[u8]) -> Result<TimeId> {
        self.core.ok()?;
        let record_size = (FRAME_OVERHEAD + payload.len()) as u64;
        if self.core.size.load(Ordering::Acquire) + record_size > self.core.max_size {
            return Err(Error::Full);
        }

        let tiny = self.core.tiny.read()?.clone();
        let time_id = tiny.time_id();
        {
            let _guard = self.core.time_lock.get(time_id).write()?;
            let entry = self
                .core
                .blocks
                .get_or_insert_with(time_id, || Arc::new(Block::new()));
            entry.value().put(IKey::live(key), payload)?;
            // A fresh write supersedes a same-block deletion marker, e.g.
            // when a leased sequence is reused right after its delete.
            entry.value().remove(IKey::deleted(key))?;
        }
        self.core.size.fetch_add(record_size, Ordering::AcqRel);
        tiny.incount();

        if tiny.len() as usize >= self.core.tiny_batch_size {
            self.flush_tiny()?;
        }
        Ok(time_id)
    }

    /// Stages a record under an explicit TimeId, used by managed batches.
    pub fn put_at(&self, time_id: TimeId, key: u64, payload: &[u8]) -> Result<()> {
        self.core.ok()?;
        let record_size = (FRAME_OVERHEAD + payload.len()) as u64;
        let _guard = self.core.time_lock.get(time_id).write()?;
        let entry = self
            .core
            .blocks
            .get_or_insert_with(time_id, || Arc::new(Block::new()));
        entry.value().put(IKey::live(key), payload)?;
        entry.value().remove(IKey::deleted(key))?;
        self.core.size.fetch_add(record_size, Ordering::AcqRel);
        Ok(())
    }

    /// Returns the staged payload for `key`, probing blocks newest first.
    /// A deletion marker shadowing the key fails with
    /// [`Error::MsgIdDeleted`].
    pub fn get(&self, key: u64) -> Result<Option<Vec<u8>>> {
        self.core.ok()?;
        for time_id in self.time_ids().into_iter().rev() {
            let Some(entry) = self.core.blocks.get(&time_id) else {
                continue;
            };
            let block = entry.value();
            if block.contains(IKey::deleted(key)) {
                return Err(Error::MsgIdDeleted);
            }
            if let Some(payload) = block.get(IKey::live(key))? {
                return Ok(Some(payload));
            }
        }
        Ok(None)
    }

    /// Stages a deletion: writes a marker carrying the TimeId of the block
    /// holding the newest live record (so the marker can outlive that
    /// block) and drops the live record so the sync stage never
    /// materializes it.
    pub fn delete(&self, key: u64) -> Result<()> {
        self.core.ok()?;
        let target = self
            .time_ids()
            .into_iter()
            .rev()
            .find(|tid| {
                self.core
                    .blocks
                    .get(tid)
                    .map(|e| e.value().contains(IKey::live(key)))
                    .unwrap_or(false)
            });

        let tiny = self.core.tiny.read()?.clone();
        let time_id = tiny.time_id();
        let marker_target = target.unwrap_or(time_id);
        {
            let _guard = self.core.time_lock.get(time_id).write()?;
            let entry = self
                .core
                .blocks
                .get_or_insert_with(time_id, || Arc::new(Block::new()));
            entry
                .value()
                .put(IKey::deleted(key), &marker_target.to_le_bytes())?;
        }
        tiny.incount();

        if let Some(target) = target {
            if let Some(entry) = self.core.blocks.get(&target) {
                entry.value().remove(IKey::live(key))?;
            }
        }
        Ok(())
    }

    /// Rotates the current tiny batch and queues it for commit when it
    /// holds anything.
    pub fn flush_tiny(&self) -> Result<()> {
        let rotated = {
            let mut tiny = self.core.tiny.write()?;
            if tiny.len() == 0 {
                None
            } else {
                let old = tiny.clone();
                *tiny = TinyBatch::new(self.core.time_mark.new_time_id(), false);
                Some(old)
            }
        };
        if let Some(tb) = rotated {
            self.pool.write(tb)?;
        }
        Ok(())
    }

    /// Queues a managed tiny batch (owned by a user batch) for commit.
    pub fn commit_managed(&self, tb: Arc<TinyBatch>) -> Result<()> {
        self.pool.write(tb)
    }

    /// TimeIds whose blocks are released and safe to materialize.
    pub fn released_blocks(&self) -> Vec<TimeId> {
        self.time_ids()
            .into_iter()
            .filter(|tid| self.core.time_mark.is_released(*tid))
            .collect()
    }

    /// Snapshot of one block's records.
    pub fn block_entries(&self, time_id: TimeId) -> Result<Vec<(IKey, Vec<u8>)>> {
        let entry = self
            .core
            .blocks
            .get(&time_id)
            .ok_or(Error::EntryDoesNotExist)?;
        entry.value().entries()
    }

    /// Drops a released block and signals its log group applied. Deletion
    /// markers still targeting live blocks are re-issued first so they
    /// survive this block's disappearance.
    pub fn release_log(&self, time_id: TimeId) -> Result<()> {
        self.move_deleted(time_id)?;

        let _guard = self.core.time_lock.get(time_id).write()?;
        let entry = self
            .core
            .blocks
            .get(&time_id)
            .ok_or(Error::EntryDoesNotExist)?;
        let block_size = entry.value().size() as u64;
        self.core.blocks.remove(&time_id);
        let _ = self
            .core
            .size
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                Some(s.saturating_sub(block_size))
            });
        drop(_guard);

        match self.core.wal.signal_log_applied(time_id) {
            // Every record of the block was superseded before its flush:
            // the group never reached the log, nothing to apply.
            Err(Error::EntryDoesNotExist) => Ok(()),
            result => result,
        }
    }

    /// Re-issues deletion markers of `time_id` whose target block is still
    /// resident elsewhere.
    fn move_deleted(&self, time_id: TimeId) -> Result<()> {
        let Some(entry) = self.core.blocks.get(&time_id) else {
            return Ok(());
        };
        let markers = entry.value().del_markers()?;
        drop(entry);

        for (key, payload) in markers {
            if payload.len() != 8 {
                return Err(Error::BadRequest(
                    "deletion marker payload malformed".to_string(),
                ));
            }
            let target = LittleEndian::read_i64(&payload);
            if target != time_id && self.core.blocks.contains_key(&target) {
                self.delete(key)?;
            }
        }
        Ok(())
    }

    /// Number of live staged records across all blocks.
    pub fn count(&self) -> u64 {
        self.time_ids()
            .into_iter()
            .filter_map(|tid| self.core.blocks.get(&tid))
            .map(|e| e.value().count().max(0) as u64)
            .sum()
    }

    pub fn size(&self) -> u64 {
        self.core.size.load(Ordering::Acquire)
    }

    /// Sweeps expired released TimeIds.
    pub fn expire(&self) {
        self.core.time_mark.expire_released();
    }

    pub fn time_mark(&self) -> &TimeMark {
        &self.core.time_mark
    }

    /// Discards the block staged under `time_id` without touching the log.
    /// Used when a batch aborts before anything was committed.
    pub fn discard(&self, time_id: TimeId) -> Result<()> {
        let _guard = self.core.time_lock.get(time_id).write()?;
        if let Some(entry) = self.core.blocks.get(&time_id) {
            let block_size = entry.value().size() as u64;
            self.core.blocks.remove(&time_id);
            let _ = self
                .core
                .size
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                    Some(s.saturating_sub(block_size))
                });
        }
        Ok(())
    }

    /// Flushes the current tiny batch, drains the worker pool and closes
    /// the log.
    pub async fn close(&self) -> Result<()> {
        if self.core.closed.swap(true, Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        if let Err(e) = self.flush_tiny() {
            tracing::warn!(error = %e, "final tiny batch flush failed");
        }
        self.pool.stop_wait().await?;
        self.core.wal.close()
    }

    fn time_ids(&self) -> Vec<TimeId> {
        self.core.blocks.iter().map(|e| *e.key()).collect()
    }
}

impl MemCore {
    /// Commits one tiny batch: serializes its block into a single log
    /// group under the write latch. On failure the TimeId is aborted and
    /// the block discarded; the error surfaces on the batch's signal.
    pub(crate) fn tiny_commit(&self, tb: &TinyBatch) -> Result<()> {
        let _latch = self.write_lock.lock()?;

        if tb.len() == 0 {
            if !tb.managed {
                self.time_mark.release(tb.time_id());
            }
            return Ok(());
        }

        match self.tiny_write(tb) {
            Ok(()) => {
                if !tb.managed {
                    self.time_mark.release(tb.time_id());
                }
                Ok(())
            }
            Err(e) => {
                self.time_mark.abort(tb.time_id());
                if let Some(entry) = self.blocks.get(&tb.time_id()) {
                    let block_size = entry.value().size() as u64;
                    self.blocks.remove(&tb.time_id());
                    let _ = self.size.fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                        Some(s.saturating_sub(block_size))
                    });
                }
                Err(e)
            }
        }
    }

    fn tiny_write(&self, tb: &TinyBatch) -> Result<()> {
        let Some(entry) = self.blocks.get(&tb.time_id()) else {
            return Ok(());
        };
        let frames = {
            let _guard = self.time_lock.get(tb.time_id()).read()?;
            entry.value().frames()?
        };

        let mut writer = self.wal.writer()?;
        for frame in &frames {
            writer.append(frame)?;
        }
        writer.signal_init_write(tb.time_id())
    }

    fn ok(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tmpfs::TempDir;

    fn test_options(dir: &TempDir) -> Options {
        Options::new(dir.path()).tiny_batch_size(1000)
    }

    fn open(dir: &TempDir) -> Memdb {
        let opts = test_options(dir);
        Memdb::open(dir.path(), &opts).expect("Failed to open memdb").0
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mem = open(&dir);

        mem.put(1, b"alpha").expect("put failed");
        mem.put(2, b"beta").expect("put failed");

        assert_eq!(mem.get(1).expect("get failed"), Some(b"alpha".to_vec()));
        assert_eq!(mem.get(2).expect("get failed"), Some(b"beta".to_vec()));
        assert_eq!(mem.get(3).expect("get failed"), None);
        assert_eq!(mem.count(), 2);

        mem.close().await.expect("close failed");
    }

    #[tokio::test]
    async fn test_delete_shadows_live_record() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mem = open(&dir);

        mem.put(7, b"value").expect("put failed");
        mem.delete(7).expect("delete failed");

        assert!(matches!(mem.get(7), Err(Error::MsgIdDeleted)));
        assert_eq!(mem.count(), 0);

        mem.close().await.expect("close failed");
    }

    #[tokio::test]
    async fn test_flush_makes_block_released() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mem = open(&dir);

        let time_id = mem.put(1, b"x").expect("put failed");
        mem.flush_tiny().expect("flush failed");

        // The pool commits asynchronously.
        for _ in 0..100 {
            if mem.time_mark().is_released(time_id) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(mem.time_mark().is_released(time_id));
        assert_eq!(mem.released_blocks(), vec![time_id]);

        mem.close().await.expect("close failed");
    }

    #[tokio::test]
    async fn test_release_log_drops_block() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mem = open(&dir);

        let time_id = mem.put(1, b"x").expect("put failed");
        mem.flush_tiny().expect("flush failed");
        for _ in 0..100 {
            if mem.time_mark().is_released(time_id) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        mem.release_log(time_id).expect("release_log failed");
        assert_eq!(mem.get(1).expect("get failed"), None);
        assert_eq!(mem.size(), 0);

        mem.close().await.expect("close failed");
    }

    #[tokio::test]
    async fn test_recovery_after_unclean_close() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let opts = test_options(&dir);

        {
            let (mem, recovered) = Memdb::open(dir.path(), &opts).expect("open failed");
            assert!(recovered.is_empty());
            for i in 0..1000u64 {
                mem.put(i, format!("msg-{i}").as_bytes()).expect("put failed");
            }
            // Flush to the log but never release it.
            mem.close().await.expect("close failed");
        }

        let (mem, recovered) = Memdb::open(dir.path(), &opts).expect("reopen failed");
        assert_eq!(recovered.len(), 1000);
        assert_eq!(recovered.get(&42).map(Vec::as_slice), Some(&b"msg-42"[..]));
        mem.close().await.expect("close failed");
    }

    #[tokio::test]
    async fn test_recovery_drops_deleted_keys() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let opts = test_options(&dir);

        {
            let (mem, _) = Memdb::open(dir.path(), &opts).expect("open failed");
            mem.put(1, b"keep").expect("put failed");
            mem.put(2, b"drop").expect("put failed");
            mem.delete(2).expect("delete failed");
            mem.close().await.expect("close failed");
        }

        let (mem, recovered) = Memdb::open(dir.path(), &opts).expect("reopen failed");
        assert_eq!(recovered.len(), 1);
        assert!(recovered.contains_key(&1));
        mem.close().await.expect("close failed");
    }

    #[tokio::test]
    async fn test_memdb_full() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let opts = Options::new(dir.path()).memdb_size(64);
        let (mem, _) = Memdb::open(dir.path(), &opts).expect("open failed");

        mem.put(1, &[0u8; 32]).expect("put failed");
        assert!(matches!(mem.put(2, &[0u8; 32]), Err(Error::Full)));

        mem.close().await.expect("close failed");
    }

    #[tokio::test]
    async fn test_closed_memdb_rejects_writes() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mem = open(&dir);
        mem.close().await.expect("close failed");
        assert!(matches!(mem.put(1, b"x"), Err(Error::Closed)));
    }
}
