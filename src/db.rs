//! The database façade: ties the staging store, the permanent files and
//! the topic/time indexes together.
//!
//! Writes stage into the memdb under the current tiny batch and become
//! durable when the batch's group reaches the write-ahead log; the sync
//! stage later materializes released blocks into the index, data and
//! window files and signals the groups applied. Reads resolve topic
//! patterns through the trie, window entries through the time-window
//! index, and each sequence first against the memdb, then the index file.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::batch::Batch;
use crate::codec::{Codec, Snappy};
use crate::config::Options;
use crate::data::{DataFile, MAX_VALUE_LENGTH};
use crate::entry::{Entry, EntryHeader, ENTRY_HEADER_SIZE};
use crate::error::{Error, Result};
use crate::filter;
use crate::flock::FileLock;
use crate::index::{DbInfo, IndexFile};
use crate::iterator::{Item, ItemIterator};
use crate::lease::Lease;
use crate::memdb::timemark::now_nanos;
use crate::memdb::{Memdb, TimeId};
use crate::message::topic::{contract_path, Last, Topic};
use crate::message::{Id, ID_SIZE, MASTER_CONTRACT};
use crate::meter::Meter;
use crate::query::Query;
use crate::scheduler::{BackgroundTask, Scheduler};
use crate::trie::Trie;
use crate::window::{unix_seconds, WinEntry, WindowFile};

const INDEX_FILE: &str = "db.index";
const DATA_FILE: &str = "db.data";
const WINDOW_FILE: &str = "db.win";
const LEASE_FILE: &str = "db.lease";
const LOCK_FILE: &str = "db.lock";

/// Expected keys sized into the fresh bloom filter.
const FILTER_KEYS: usize = 1 << 16;

/// Interval of the time-mark expirer task.
const EXPIRY_INTERVAL: Duration = Duration::from_secs(60);

/// An embedded time-series message store.
///
/// Must be opened and closed inside a tokio runtime: background roles
/// (tiny-batch ticker, sync stage, expirer) run as scheduler tasks.
pub struct Db {
    core: Arc<DbCore>,
    scheduler: Scheduler,
}

pub(crate) struct DbCore {
    pub(crate) opts: Options,
    _lock: FileLock,
    pub(crate) mem: Memdb,
    index: IndexFile,
    data: DataFile,
    pub(crate) window: WindowFile,
    lease: Mutex<Lease>,
    pub(crate) trie: Trie,
    filter: Mutex<filter::Generator>,
    pub(crate) meter: Meter,
    codec: Box<dyn Codec>,

    encryption: u8,
    cache_id: u64,
    sequence: AtomicU64,
    count: AtomicU64,

    sync_lock: Mutex<()>,
    closed: AtomicBool,
}

impl Db {
    /// Opens a database with default options.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(Options::new(dir.as_ref()))
    }

    /// Opens or creates a database. Recovery of unapplied log groups
    /// happens here, before any background task starts.
    pub fn open_with_options(opts: Options) -> Result<Self> {
        if opts.encryption && opts.cipher.is_none() {
            return Err(Error::BadRequest(
                "encryption requires a cipher".to_string(),
            ));
        }
        fs::create_dir_all(&opts.dir)?;
        let lock = FileLock::lock(opts.dir.join(LOCK_FILE))?;

        let (index, info) = IndexFile::open(opts.dir.join(INDEX_FILE))?;
        let data = DataFile::open(opts.dir.join(DATA_FILE))?;
        let window = WindowFile::open(opts.dir.join(WINDOW_FILE))?;
        let lease = Lease::read(opts.dir.join(LEASE_FILE))?;
        let info = info.unwrap_or(DbInfo {
            encryption: u8::from(opts.encryption),
            cache_id: now_nanos() as u64,
            ..Default::default()
        });

        let (mem, recovered) = Memdb::open(&opts.dir, &opts)?;

        let core = Arc::new(DbCore {
            encryption: info.encryption,
            cache_id: info.cache_id,
            sequence: AtomicU64::new(info.sequence),
            count: AtomicU64::new(info.count),
            mem,
            index,
            data,
            window,
            lease: Mutex::new(lease),
            trie: Trie::new(),
            filter: Mutex::new(filter::Generator::new(FILTER_KEYS)),
            meter: Meter::new(),
            codec: Box::new(Snappy),
            opts,
            _lock: lock,
            sync_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        });

        core.load_trie()?;
        core.reingest(recovered)?;

        let scheduler = Scheduler::new();
        scheduler.register(Arc::new(TinyBatchTask { core: core.clone() }));
        if core.opts.background_sync_interval > Duration::ZERO {
            scheduler.register(Arc::new(SyncTask { core: core.clone() }));
        }
        if core.opts.background_key_expiry {
            scheduler.register(Arc::new(ExpiryTask { core: core.clone() }));
        }

        Ok(Self { core, scheduler })
    }

    /// Stores a message under a topic. Returns the assigned message ID.
    pub fn put(&self, topic: impl Into<Vec<u8>>, payload: impl Into<Vec<u8>>) -> Result<Id> {
        let mut entry = Entry::new(topic.into(), payload.into());
        self.put_entry(&mut entry)
    }

    /// Stores a message described by `entry`. The entry keeps its parsed
    /// topic, so reusing it across puts skips re-parsing.
    pub fn put_entry(&self, entry: &mut Entry) -> Result<Id> {
        self.core.put_entry(entry)
    }

    /// Retrieves message payloads for a topic pattern, newest first.
    pub fn get(&self, query: &Query) -> Result<Vec<Vec<u8>>> {
        self.core.ok()?;
        self.core.meter.gets.inc(1);
        let items = self.core.query_entries(query)?;
        Ok(items.into_iter().map(|i| i.value).collect())
    }

    /// Iterates messages matching a query.
    pub fn items(&self, query: &Query) -> Result<ItemIterator> {
        self.core.ok()?;
        self.core.meter.gets.inc(1);
        Ok(ItemIterator::new(self.core.query_entries(query)?))
    }

    /// Deletes the message with the given ID under `topic`.
    pub fn delete(&self, id: &[u8], topic: &[u8]) -> Result<()> {
        let mut entry = Entry::new(topic.to_vec(), Vec::new());
        entry.id = Some(Id::from_bytes(id)?);
        self.delete_entry(&mut entry)
    }

    /// Deletes the message identified by `entry.id`.
    pub fn delete_entry(&self, entry: &mut Entry) -> Result<()> {
        self.core.delete_entry(entry)
    }

    /// Runs `f` over a batch, then commits it atomically: either every
    /// write in the batch becomes durable and visible, or the batch's
    /// TimeId is aborted and nothing survives.
    pub async fn batch<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Batch) -> Result<()>,
    {
        self.core.ok()?;
        let time_id = self.core.mem.time_mark().new_time_id();
        let mut batch = Batch::new(time_id);
        if let Err(e) = f(&mut batch) {
            self.core.mem.time_mark().abort(time_id);
            self.core.meter.aborts.inc(1);
            return Err(e);
        }
        batch.commit(&self.core).await
    }

    /// Generates a fresh contract.
    pub fn new_contract(&self) -> u32 {
        loop {
            let c = (crate::hasher::hash64(&now_nanos().to_le_bytes()) >> 32) as u32;
            if c != 0 && c != MASTER_CONTRACT {
                return c;
            }
        }
    }

    /// Generates an ID carrying the next sequence.
    pub fn new_id(&self) -> Id {
        Id::new(self.core.next_seq())
    }

    /// Number of messages in the store, staged entries included.
    pub fn count(&self) -> u64 {
        self.core.count.load(Ordering::Acquire) + self.core.mem.count()
    }

    pub fn meter(&self) -> &Meter {
        &self.core.meter
    }

    /// Forces a sync pass, materializing all released staging blocks.
    pub fn sync(&self) -> Result<()> {
        self.core.sync()
    }

    /// Closes the database: drains in-flight tiny batches, stops the
    /// background tasks, flushes the staging store's log and persists the
    /// header. Staged-but-unsynced entries stay in the log and are
    /// recovered on the next open.
    pub async fn close(&self) -> Result<()> {
        if self.core.closed.swap(true, Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        // Let the in-flight tiny batch interval elapse so writers drain.
        tokio::time::sleep(self.core.opts.tiny_batch_write_interval).await;
        self.scheduler.shutdown().await?;
        self.core.mem.close().await?;
        self.core.write_header(true)?;
        self.core.index.sync()?;
        self.core.data.sync()?;
        self.core.window.sync()?;
        Ok(())
    }
}

impl DbCore {
    pub(crate) fn ok(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        Ok(())
    }

    fn next_seq(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Stages one entry: assigns its sequence, builds the cache entry
    /// blob, writes it to the memdb and the window's pending set.
    pub(crate) fn put_entry(&self, entry: &mut Entry) -> Result<Id> {
        self.ok()?;
        if entry.payload.is_empty() {
            return Err(Error::BadRequest("payload is empty".to_string()));
        }
        if entry.payload.len() > MAX_VALUE_LENGTH {
            return Err(Error::BadRequest("value is too large".to_string()));
        }

        let (blob, key, id, topic_hash, seq, expires_at) = self.set_entry(entry)?;
        self.mem.put(key, &blob)?;
        self.window.append_pending(topic_hash, WinEntry { seq, expires_at });
        self.meter.puts.inc(1);
        self.meter.in_bytes.inc(entry.payload.len() as u64);

        if self.opts.sync_writes {
            self.mem.flush_tiny()?;
        }
        Ok(id)
    }

    /// Builds the staged representation of an entry. Returns the cache
    /// entry blob, the memdb key, the ID, the topic hash, the sequence
    /// and the expiry.
    pub(crate) fn set_entry(&self, entry: &mut Entry) -> Result<(Vec<u8>, u64, Id, u64, u64, u32)> {
        if entry.contract == 0 {
            entry.contract = MASTER_CONTRACT;
        }
        if entry.parsed.is_none() {
            let topic = Topic::parse(&entry.topic)?;
            if entry.expires_at == 0 {
                if let Some(ttl) = topic.ttl {
                    entry.expires_at = unix_seconds().saturating_add(ttl.as_secs() as u32);
                }
            }
            entry.topic_hash = topic.hash(entry.contract);
            entry.parsed = Some(topic);
        }
        let topic = entry.parsed.as_ref().unwrap();

        // The topic text is stored once per topic; subsequent entries
        // reference it through the trie.
        let mut topic_raw = Vec::new();
        if self.trie.get_offset(entry.topic_hash).is_none() {
            topic_raw = topic.marshal_with_contract(entry.contract);
            let path = contract_path(entry.contract, &topic.parts);
            self.trie.add(entry.topic_hash, &path, 0);
        }

        let seq = match &entry.id {
            Some(id) => id.sequence(),
            None => match self.lease.lock()?.get_slot(entry.topic_hash) {
                Some(seq) => {
                    self.meter.leased.inc(1);
                    seq
                }
                None => self.next_seq(),
            },
        };
        if seq == 0 {
            return Err(Error::InvalidState("sequence is zero".to_string()));
        }

        let mut id = Id::new(seq);
        let mut value = self.codec.encode(&entry.payload);
        if self.encryption == 1 || entry.encryption {
            let cipher = self
                .opts
                .cipher
                .as_ref()
                .ok_or_else(|| Error::BadRequest("encryption requires a cipher".to_string()))?;
            value = cipher.encrypt(&value);
            id.set_encrypted(true);
        }

        let header = EntryHeader {
            seq,
            topic_size: topic_raw.len() as u16,
            value_size: value.len() as u32,
            expires_at: entry.expires_at,
            topic_hash: entry.topic_hash,
        };
        let mut blob =
            Vec::with_capacity(ENTRY_HEADER_SIZE + ID_SIZE + topic_raw.len() + value.len());
        blob.extend_from_slice(&header.encode());
        blob.extend_from_slice(id.bytes());
        blob.extend_from_slice(&topic_raw);
        blob.extend_from_slice(&value);

        let key = self.cache_id ^ seq;
        Ok((blob, key, id, entry.topic_hash, seq, entry.expires_at))
    }

    pub(crate) fn delete_entry(&self, entry: &mut Entry) -> Result<()> {
        self.ok()?;
        if !self.opts.mutable {
            return Err(Error::Immutable);
        }
        let id = entry
            .id
            .ok_or_else(|| Error::BadRequest("message id is empty".to_string()))?;
        let seq = id.sequence();

        if entry.contract == 0 {
            entry.contract = MASTER_CONTRACT;
        }
        let topic = Topic::parse(&entry.topic)?;
        let topic_hash = topic.hash(entry.contract);

        self.mem.delete(self.cache_id ^ seq)?;
        self.window.remove_pending(topic_hash, seq);

        // The filter keeps never-synced sequences away from the index.
        if self.filter.lock()?.test(seq) {
            if let Some(slot) = self.index.clear_slot(seq)? {
                let size = self.data.frame_size(slot.msg_offset)?;
                self.lease
                    .lock()?
                    .free(topic_hash, seq, slot.msg_offset, size);
                let _ = self
                    .count
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                        Some(c.saturating_sub(1))
                    });
            }
        }
        self.meter.dels.inc(1);
        Ok(())
    }

    /// Resolves a query to `(id, payload)` items, newest first.
    pub(crate) fn query_entries(&self, query: &Query) -> Result<Vec<Item>> {
        let topic = Topic::parse(&query.topic)?;
        let contract = if query.contract == 0 {
            MASTER_CONTRACT
        } else {
            query.contract
        };

        let mut limit = query.limit;
        let mut cutoff = 0u32;
        match topic.last {
            Some(Last::Window(window)) => {
                cutoff = unix_seconds().saturating_sub(window.as_secs() as u32);
            }
            Some(Last::Count(count)) => limit = limit.min(count.max(1)),
            None => {}
        }
        let path = contract_path(contract, &topic.parts);
        let mut topics = self.trie.lookup(&path);
        // Newest topic heads first.
        topics.sort_by(|a, b| b.offset.cmp(&a.offset));

        let mut entries: Vec<(u64, WinEntry)> = Vec::new();
        for topic_ref in &topics {
            if entries.len() >= limit {
                break;
            }
            let found = self.window.lookup(
                topic_ref.hash,
                topic_ref.offset,
                cutoff,
                limit - entries.len(),
            )?;
            entries.extend(found.into_iter().map(|e| (topic_ref.hash, e)));
        }
        entries.sort_by(|a, b| b.1.seq.cmp(&a.1.seq));
        // A sequence can surface twice while a reused slot's staged copy
        // coexists with its window entry on disk.
        entries.dedup_by_key(|(_, e)| e.seq);

        let mut items = Vec::new();
        for (_, entry) in entries {
            if let Some(item) = self.read_message(entry.seq)? {
                self.meter.out_bytes.inc(item.value.len() as u64);
                items.push(item);
            }
        }
        Ok(items)
    }

    /// Resolves one sequence: memdb first (via the cache key), then the
    /// index slot. Deleted, missing and expired messages read as None.
    fn read_message(&self, seq: u64) -> Result<Option<Item>> {
        let now = unix_seconds();
        match self.mem.get(self.cache_id ^ seq) {
            Ok(Some(blob)) => {
                let header = EntryHeader::decode(&blob)?;
                let id = Id::from_bytes(&blob[ENTRY_HEADER_SIZE..ENTRY_HEADER_SIZE + ID_SIZE])?;
                if header.expires_at != 0 && header.expires_at <= now {
                    return Ok(None);
                }
                let value_off = ENTRY_HEADER_SIZE + ID_SIZE + header.topic_size as usize;
                let value_end = value_off + header.value_size as usize;
                if value_end > blob.len() {
                    return Err(Error::Corrupted("cache entry value out of range".to_string()));
                }
                let value = self.decode_value(&blob[value_off..value_end], id.is_encrypted())?;
                Ok(Some(Item { id, value }))
            }
            Ok(None) => {
                let Some(slot) = self.index.read_slot(seq)? else {
                    return Ok(None); // MsgIdDoesNotExist: reclaimable slot
                };
                let msg = self.data.read_message(slot.msg_offset)?;
                if msg.expires_at != 0 && msg.expires_at <= now {
                    return Ok(None);
                }
                let value = self.decode_value(&msg.value, msg.id.is_encrypted())?;
                Ok(Some(Item { id: msg.id, value }))
            }
            Err(Error::MsgIdDeleted) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn decode_value(&self, raw: &[u8], encrypted: bool) -> Result<Vec<u8>> {
        let compressed = if encrypted {
            let cipher = self
                .opts
                .cipher
                .as_ref()
                .ok_or_else(|| Error::BadRequest("encrypted message without a cipher".to_string()))?;
            cipher.decrypt(raw)?
        } else {
            raw.to_vec()
        };
        self.codec.decode(&compressed)
    }

    /// The sync stage: materializes every released staging block into the
    /// index, data and window files, then signals its log group applied.
    pub(crate) fn sync(&self) -> Result<()> {
        let _guard = self.sync_lock.lock()?;
        let mut released = self.mem.released_blocks();
        if released.is_empty() {
            return Ok(());
        }
        released.sort_unstable();

        for time_id in released {
            self.sync_block(time_id)?;
        }
        Ok(())
    }

    fn sync_block(&self, time_id: TimeId) -> Result<()> {
        let mut records: Vec<(EntryHeader, Vec<u8>)> = Vec::new();
        for (ikey, blob) in self.mem.block_entries(time_id)? {
            if ikey.del {
                continue;
            }
            let header = EntryHeader::decode(&blob)?;
            records.push((header, blob));
        }
        records.sort_by_key(|(h, _)| h.seq);

        for (header, blob) in records {
            let id = Id::from_bytes(&blob[ENTRY_HEADER_SIZE..ENTRY_HEADER_SIZE + ID_SIZE])?;
            let topic_end = ENTRY_HEADER_SIZE + ID_SIZE + header.topic_size as usize;
            let value_end = topic_end + header.value_size as usize;
            if value_end > blob.len() {
                return Err(Error::Corrupted("staged entry out of range".to_string()));
            }
            let topic_raw = &blob[ENTRY_HEADER_SIZE + ID_SIZE..topic_end];
            let value = &blob[topic_end..value_end];

            let size = DataFile::message_size(topic_raw.len(), value.len());
            let region = self.lease.lock()?.allocate_region(size);
            let (msg_offset, _) =
                self.data
                    .write_message(region, &id, topic_raw, value, header.expires_at)?;
            self.index.write_slot(header.seq, msg_offset)?;

            if let Some(new_head) = self
                .window
                .sync_entry(header.topic_hash, header.seq, header.expires_at)?
            {
                self.trie.set_offset(header.topic_hash, new_head);
            }
            self.filter.lock()?.append(header.seq);

            self.count.fetch_add(1, Ordering::AcqRel);
            let _ = self
                .sequence
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                    Some(s.max(header.seq))
                });
            self.meter.syncs.inc(1);
        }

        self.write_header(true)?;
        self.index.sync()?;
        self.data.sync()?;
        self.window.sync()?;
        self.mem.release_log(time_id)
    }

    /// Persists the header counters, defragmenting and writing the lease
    /// first when asked.
    pub(crate) fn write_header(&self, write_lease: bool) -> Result<()> {
        if write_lease {
            let mut lease = self.lease.lock()?;
            lease.defrag();
            lease.write()?;
        }
        let info = DbInfo {
            encryption: self.encryption,
            sequence: self.sequence.load(Ordering::Acquire),
            count: self.count.load(Ordering::Acquire),
            block_idx: self.index.blocks(),
            window_idx: self.window.window_index(),
            cache_id: self.cache_id,
        };
        self.index.write_header(&info)
    }

    /// Bootstraps the trie and the bloom filter from the window file: for
    /// every topic chain, the head feeds the trie offset and the oldest
    /// block's first entry leads to the stored topic text.
    fn load_trie(&self) -> Result<()> {
        let mut heads: HashMap<u64, i64> = HashMap::new();
        let mut first_seqs: HashMap<u64, u64> = HashMap::new();

        self.window.for_each_block(|handle| {
            if handle.entries.is_empty() {
                return Ok(false);
            }
            // The head is the newest block of the chain: the one at the
            // highest offset, since chains grow by appending blocks.
            let head = heads.entry(handle.topic_hash).or_insert(0);
            *head = (*head).max(handle.offset);
            if handle.next == 0 {
                first_seqs.insert(handle.topic_hash, handle.entries[0].seq);
            }
            let mut filter = self.filter.lock().unwrap();
            for entry in &handle.entries {
                filter.append(entry.seq);
            }
            Ok(false)
        })?;

        for (topic_hash, head) in heads {
            let Some(&first_seq) = first_seqs.get(&topic_hash) else {
                continue;
            };
            let Some(slot) = self.index.read_slot(first_seq)? else {
                continue;
            };
            let topic_raw = self.data.read_topic(slot.msg_offset)?;
            if topic_raw.is_empty() {
                continue;
            }
            let topic = Topic::unmarshal(&topic_raw)?;
            if !self.trie.add(topic_hash, &topic.parts, head) {
                tracing::info!(topic_hash, "topic already present in trie");
            }
            self.window.set_head(topic_hash, head);
        }
        Ok(())
    }

    /// Re-ingests records recovered from the log through the normal write
    /// path, rebuilding window pending entries and the trie for staged
    /// topics.
    fn reingest(&self, recovered: HashMap<u64, Vec<u8>>) -> Result<()> {
        if recovered.is_empty() {
            return Ok(());
        }
        let mut records: Vec<(u64, Vec<u8>)> = recovered.into_iter().collect();
        let mut parsed: Vec<(u64, EntryHeader, Vec<u8>)> = Vec::with_capacity(records.len());
        for (key, blob) in records.drain(..) {
            let header = EntryHeader::decode(&blob)?;
            parsed.push((key, header, blob));
        }
        parsed.sort_by_key(|(_, h, _)| h.seq);

        let mut max_seq = 0u64;
        let count = parsed.len();
        for (key, header, blob) in parsed {
            if header.topic_size > 0 {
                let topic_end = ENTRY_HEADER_SIZE + ID_SIZE + header.topic_size as usize;
                if topic_end > blob.len() {
                    return Err(Error::Corrupted("recovered entry out of range".to_string()));
                }
                let topic = Topic::unmarshal(&blob[ENTRY_HEADER_SIZE + ID_SIZE..topic_end])?;
                self.trie.add(header.topic_hash, &topic.parts, 0);
            }
            self.mem.put(key, &blob)?;
            self.window.append_pending(
                header.topic_hash,
                WinEntry {
                    seq: header.seq,
                    expires_at: header.expires_at,
                },
            );
            max_seq = max_seq.max(header.seq);
        }
        let _ = self
            .sequence
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| Some(s.max(max_seq)));
        self.meter.recovers.inc(count as u64);
        tracing::info!(records = count, "recovered staged entries from log");
        Ok(())
    }
}

struct TinyBatchTask {
    core: Arc<DbCore>,
}

#[async_trait::async_trait]
impl BackgroundTask for TinyBatchTask {
    fn name(&self) -> &'static str {
        "tiny-batch"
    }

    fn interval(&self) -> Duration {
        // Zero means write-through; the ticker still needs a period.
        self.core
            .opts
            .tiny_batch_write_interval
            .max(Duration::from_millis(1))
    }

    async fn execute(&self) -> Result<()> {
        self.core.mem.flush_tiny()
    }
}

struct SyncTask {
    core: Arc<DbCore>,
}

#[async_trait::async_trait]
impl BackgroundTask for SyncTask {
    fn name(&self) -> &'static str {
        "sync"
    }

    fn interval(&self) -> Duration {
        self.core.opts.background_sync_interval
    }

    async fn execute(&self) -> Result<()> {
        self.core.sync()
    }
}

struct ExpiryTask {
    core: Arc<DbCore>,
}

#[async_trait::async_trait]
impl BackgroundTask for ExpiryTask {
    fn name(&self) -> &'static str {
        "time-mark-expiry"
    }

    fn interval(&self) -> Duration {
        EXPIRY_INTERVAL
    }

    async fn execute(&self) -> Result<()> {
        self.core.mem.expire();
        Ok(())
    }
}
