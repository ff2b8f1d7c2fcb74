use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{ByteOrder, LittleEndian};

use crate::errdata;
use crate::error::Result;
use crate::fs::BlockFile;
use crate::wal::header::SIGNATURE;

/// Entries per 4 KiB window block.
pub(crate) const SEQS_PER_WINDOW_BLOCK: usize = 335;

pub(crate) const WINDOW_BLOCK_SIZE: usize = 4096;

/// Block header: topic hash, next pointer, entry index, padding.
const WIN_HEADER_SIZE: usize = 26;

const WIN_ENTRY_SIZE: usize = 12;

/// Reserved file header; keeps offset zero free so `next == 0` can mark
/// the end of a chain.
const FILE_HEADER_SIZE: u64 = 47;

/// One `(sequence, expiry)` pair of a topic's window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct WinEntry {
    pub seq: u64,
    pub expires_at: u32,
}

/// A window block read off disk.
pub(crate) struct WindowHandle {
    pub offset: i64,
    pub topic_hash: u64,
    pub next: i64,
    pub entries: Vec<WinEntry>,
}

/// Per-topic time-window index: on-disk linked chains of window blocks,
/// newest first, plus in-memory pending entries for staged messages. The
/// oldest block of a chain has `next == 0`.
pub(crate) struct WindowFile {
    file: BlockFile,
    state: Mutex<WindowState>,
}

#[derive(Default)]
struct WindowState {
    /// topic hash -> head block offset.
    heads: HashMap<u64, i64>,
    /// topic hash -> staged entries in append order.
    pending: HashMap<u64, Vec<WinEntry>>,
}

pub(crate) fn unix_seconds() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

impl WindowFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = BlockFile::open(path)?;
        if file.size() == 0 {
            file.extend(FILE_HEADER_SIZE)?;
            file.write_at(&SIGNATURE, 0)?;
        }
        Ok(Self {
            file,
            state: Mutex::new(WindowState::default()),
        })
    }

    /// Number of window blocks on disk.
    pub fn window_index(&self) -> u32 {
        ((self.file.size().saturating_sub(FILE_HEADER_SIZE)) / WINDOW_BLOCK_SIZE as u64) as u32
    }

    /// Seeds the head offset of a topic chain, used while bootstrapping
    /// from disk.
    pub fn set_head(&self, topic_hash: u64, offset: i64) {
        self.state.lock().unwrap().heads.insert(topic_hash, offset);
    }

    /// Stages a window entry for a topic that is not yet on disk.
    pub fn append_pending(&self, topic_hash: u64, entry: WinEntry) {
        self.state
            .lock()
            .unwrap()
            .pending
            .entry(topic_hash)
            .or_default()
            .push(entry);
    }

    /// Drops staged entries of an aborted batch.
    pub fn remove_pending(&self, topic_hash: u64, seq: u64) {
        let mut state = self.state.lock().unwrap();
        if let Some(entries) = state.pending.get_mut(&topic_hash) {
            entries.retain(|e| e.seq != seq);
            if entries.is_empty() {
                state.pending.remove(&topic_hash);
            }
        }
    }

    /// Materializes one staged entry into the topic's chain. Allocates a
    /// new head block when the chain is empty or the head is full;
    /// returns the new head offset in that case so the caller can update
    /// the trie.
    pub fn sync_entry(&self, topic_hash: u64, seq: u64, expires_at: u32) -> Result<Option<i64>> {
        let mut state = self.state.lock().unwrap();
        let head = state.heads.get(&topic_hash).copied().unwrap_or(0);

        let mut new_head = None;
        let (block_off, entry_idx) = if head == 0 {
            (self.new_block(topic_hash, 0)?, 0u16)
        } else {
            let idx = self.read_entry_idx(head)?;
            if idx as usize >= SEQS_PER_WINDOW_BLOCK {
                (self.new_block(topic_hash, head)?, 0u16)
            } else {
                (head, idx)
            }
        };
        if block_off != head {
            state.heads.insert(topic_hash, block_off);
            new_head = Some(block_off);
        }

        let mut entry = [0u8; WIN_ENTRY_SIZE];
        LittleEndian::write_u64(&mut entry[0..8], seq);
        LittleEndian::write_u32(&mut entry[8..12], expires_at);
        let entry_off =
            block_off + WIN_HEADER_SIZE as i64 + i64::from(entry_idx) * WIN_ENTRY_SIZE as i64;
        self.file.write_at(&entry, entry_off as u64)?;
        self.file
            .write_at(&(entry_idx + 1).to_le_bytes(), (block_off + 16) as u64)?;

        if let Some(entries) = state.pending.get_mut(&topic_hash) {
            entries.retain(|e| e.seq != seq);
            if entries.is_empty() {
                state.pending.remove(&topic_hash);
            }
        }
        Ok(new_head)
    }

    /// Yields entries for a topic, newest first: staged entries, then the
    /// disk chain from `head`. Entries expired relative to now, or older
    /// than `cutoff`, are skipped; `expires_at == 0` never expires.
    pub fn lookup(
        &self,
        topic_hash: u64,
        head: i64,
        cutoff: u32,
        limit: usize,
    ) -> Result<Vec<WinEntry>> {
        let now = unix_seconds();
        let keep = |e: &WinEntry| {
            if e.expires_at != 0 && e.expires_at <= now {
                return false;
            }
            e.expires_at == 0 || cutoff == 0 || e.expires_at >= cutoff
        };

        let mut out = Vec::new();
        {
            let state = self.state.lock().unwrap();
            if let Some(entries) = state.pending.get(&topic_hash) {
                for e in entries.iter().rev() {
                    if out.len() >= limit {
                        return Ok(out);
                    }
                    if keep(e) {
                        out.push(*e);
                    }
                }
            }
        }

        let mut off = head;
        while off != 0 && out.len() < limit {
            let handle = self.read_block(off)?;
            if handle.topic_hash != topic_hash {
                return Err(errdata!(
                    "window chain corrupt: expected topic {topic_hash:x} at {off}"
                ));
            }
            for e in handle.entries.iter().rev() {
                if out.len() >= limit {
                    break;
                }
                if keep(e) {
                    out.push(*e);
                }
            }
            off = handle.next;
        }
        Ok(out)
    }

    /// Reads the window block at `offset`.
    pub fn read_block(&self, offset: i64) -> Result<WindowHandle> {
        let mut buf = [0u8; WINDOW_BLOCK_SIZE];
        self.file.read_at(&mut buf, offset as u64)?;

        let topic_hash = LittleEndian::read_u64(&buf[0..8]);
        let next = LittleEndian::read_i64(&buf[8..16]);
        let entry_idx = LittleEndian::read_u16(&buf[16..18]) as usize;
        if entry_idx > SEQS_PER_WINDOW_BLOCK {
            return Err(errdata!("window block entry index out of range"));
        }

        let mut entries = Vec::with_capacity(entry_idx);
        for i in 0..entry_idx {
            let off = WIN_HEADER_SIZE + i * WIN_ENTRY_SIZE;
            entries.push(WinEntry {
                seq: LittleEndian::read_u64(&buf[off..off + 8]),
                expires_at: LittleEndian::read_u32(&buf[off + 8..off + 12]),
            });
        }

        Ok(WindowHandle {
            offset,
            topic_hash,
            next,
            entries,
        })
    }

    /// Iterates every window block in file order. `f` returns true to
    /// stop.
    pub fn for_each_block<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&WindowHandle) -> Result<bool>,
    {
        for i in 0..self.window_index() {
            let offset = FILE_HEADER_SIZE as i64 + i64::from(i) * WINDOW_BLOCK_SIZE as i64;
            let handle = self.read_block(offset)?;
            if f(&handle)? {
                break;
            }
        }
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync()
    }

    fn new_block(&self, topic_hash: u64, next: i64) -> Result<i64> {
        let offset = self.file.extend(WINDOW_BLOCK_SIZE as u64)? as i64;
        let mut header = [0u8; WIN_HEADER_SIZE];
        LittleEndian::write_u64(&mut header[0..8], topic_hash);
        LittleEndian::write_i64(&mut header[8..16], next);
        LittleEndian::write_u16(&mut header[16..18], 0);
        self.file.write_at(&header, offset as u64)?;
        Ok(offset)
    }

    fn read_entry_idx(&self, block_off: i64) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.file.read_at(&mut buf, (block_off + 16) as u64)?;
        Ok(LittleEndian::read_u16(&buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tmpfs::NamedTempFile;

    fn open() -> (NamedTempFile, WindowFile) {
        let tmp = NamedTempFile::new().expect("Failed to create temp file");
        let win = WindowFile::open(tmp.path()).expect("Failed to open window file");
        (tmp, win)
    }

    #[test]
    fn test_pending_lookup_newest_first() {
        let (_tmp, win) = open();
        for seq in 1..=5u64 {
            win.append_pending(9, WinEntry { seq, expires_at: 0 });
        }
        let entries = win.lookup(9, 0, 0, 10).expect("lookup failed");
        let seqs: Vec<u64> = entries.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_sync_entry_builds_chain() {
        let (_tmp, win) = open();
        for seq in 1..=3u64 {
            win.append_pending(7, WinEntry { seq, expires_at: 0 });
        }
        let head = win
            .sync_entry(7, 1, 0)
            .expect("sync failed")
            .expect("first entry allocates a head");
        assert!(win.sync_entry(7, 2, 0).expect("sync failed").is_none());
        assert!(win.sync_entry(7, 3, 0).expect("sync failed").is_none());

        let entries = win.lookup(7, head, 0, 10).expect("lookup failed");
        let seqs: Vec<u64> = entries.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![3, 2, 1]);
        assert_eq!(win.window_index(), 1);
    }

    #[test]
    fn test_full_head_links_new_block() {
        let (_tmp, win) = open();
        let mut head = 0;
        for seq in 1..=(SEQS_PER_WINDOW_BLOCK as u64 + 5) {
            if let Some(h) = win.sync_entry(3, seq, 0).expect("sync failed") {
                head = h;
            }
        }
        assert_eq!(win.window_index(), 2);

        let handle = win.read_block(head).expect("read failed");
        assert_eq!(handle.entries.len(), 5);
        assert_ne!(handle.next, 0, "new head links to the previous block");

        // Entire chain, newest first, no gaps.
        let entries = win.lookup(3, head, 0, 1000).expect("lookup failed");
        let seqs: Vec<u64> = entries.iter().map(|e| e.seq).collect();
        let want: Vec<u64> = (1..=(SEQS_PER_WINDOW_BLOCK as u64 + 5)).rev().collect();
        assert_eq!(seqs, want);
    }

    #[test]
    fn test_lookup_skips_expired() {
        let (_tmp, win) = open();
        let now = unix_seconds();
        win.append_pending(1, WinEntry { seq: 1, expires_at: now.saturating_sub(10) });
        win.append_pending(1, WinEntry { seq: 2, expires_at: now + 1000 });
        win.append_pending(1, WinEntry { seq: 3, expires_at: 0 });

        let entries = win.lookup(1, 0, 0, 10).expect("lookup failed");
        let seqs: Vec<u64> = entries.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![3, 2]);
    }

    #[test]
    fn test_lookup_honors_limit() {
        let (_tmp, win) = open();
        for seq in 1..=20u64 {
            win.append_pending(1, WinEntry { seq, expires_at: 0 });
        }
        let entries = win.lookup(1, 0, 0, 5).expect("lookup failed");
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0].seq, 20);
    }

    #[test]
    fn test_sync_removes_pending() {
        let (_tmp, win) = open();
        win.append_pending(1, WinEntry { seq: 1, expires_at: 0 });
        let head = win.sync_entry(1, 1, 0).expect("sync failed").unwrap();

        // Exactly one copy after sync.
        let entries = win.lookup(1, head, 0, 10).expect("lookup failed");
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_for_each_block() {
        let (_tmp, win) = open();
        win.sync_entry(1, 1, 0).expect("sync failed");
        win.sync_entry(2, 1, 0).expect("sync failed");

        let mut hashes = Vec::new();
        win.for_each_block(|h| {
            hashes.push(h.topic_hash);
            Ok(false)
        })
        .expect("iteration failed");
        assert_eq!(hashes, vec![1, 2]);
    }
}
