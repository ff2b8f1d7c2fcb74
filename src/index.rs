use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use byteorder::{ByteOrder, LittleEndian};

use crate::errdata;
use crate::error::Result;
use crate::fs::BlockFile;
use crate::wal::header::SIGNATURE;

/// Slots per 4 KiB index block: 255 slots of 16 bytes plus a 16-byte
/// trailer.
pub(crate) const ENTRIES_PER_INDEX_BLOCK: usize = 255;

pub(crate) const INDEX_BLOCK_SIZE: usize = 4096;

const SLOT_SIZE: usize = 16;

const TRAILER_OFFSET: usize = ENTRIES_PER_INDEX_BLOCK * SLOT_SIZE;

/// Index file header: signature, version, db info, padding.
pub(crate) const INDEX_HEADER_SIZE: usize = 47;

const INDEX_VERSION: u32 = 1;

/// Index block holding a sequence.
pub(crate) fn block_index(seq: u64) -> u32 {
    ((seq - 1) / ENTRIES_PER_INDEX_BLOCK as u64) as u32
}

/// File offset of an index block.
pub(crate) fn block_offset(idx: u32) -> i64 {
    INDEX_HEADER_SIZE as i64 + i64::from(idx) * INDEX_BLOCK_SIZE as i64
}

fn slot_position(seq: u64) -> usize {
    ((seq - 1) % ENTRIES_PER_INDEX_BLOCK as u64) as usize
}

/// Counters persisted in the index header; the process-wide mutable state
/// of the database.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct DbInfo {
    pub encryption: u8,
    pub sequence: u64,
    pub count: u64,
    pub block_idx: u32,
    pub window_idx: u32,
    pub cache_id: u64,
}

/// One index slot: a sequence and the offset of its message frame in the
/// data file. `msg_offset == 0` marks an empty or reclaimed slot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Slot {
    pub seq: u64,
    pub msg_offset: i64,
}

/// Fixed-size block index over sequences. A sequence deterministically
/// lands in block `(seq-1)/255`; reads still linear-scan the block so a
/// corrupt slot degrades to not-found instead of a wrong answer.
pub(crate) struct IndexFile {
    file: BlockFile,
    block_idx: AtomicU32,
}

impl IndexFile {
    /// Opens the index. Returns the persisted [`DbInfo`] when the file
    /// already has a header.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, Option<DbInfo>)> {
        let file = BlockFile::open(path)?;
        let mut info = None;
        if file.size() == 0 {
            file.extend(INDEX_HEADER_SIZE as u64)?;
        } else {
            let mut buf = [0u8; INDEX_HEADER_SIZE];
            file.read_at(&mut buf, 0)?;
            if buf[0..7] != SIGNATURE {
                return Err(errdata!("index signature mismatch"));
            }
            let version = LittleEndian::read_u32(&buf[7..11]);
            if version != INDEX_VERSION {
                return Err(errdata!("unsupported index version {version}"));
            }
            info = Some(DbInfo {
                encryption: buf[11],
                sequence: LittleEndian::read_u64(&buf[12..20]),
                count: LittleEndian::read_u64(&buf[20..28]),
                block_idx: LittleEndian::read_u32(&buf[28..32]),
                window_idx: LittleEndian::read_u32(&buf[32..36]),
                cache_id: LittleEndian::read_u64(&buf[36..44]),
            });
        }
        let block_idx = info.map(|i| i.block_idx).unwrap_or(0);
        Ok((
            Self {
                file,
                block_idx: AtomicU32::new(block_idx),
            },
            info,
        ))
    }

    pub fn write_header(&self, info: &DbInfo) -> Result<()> {
        let mut buf = [0u8; INDEX_HEADER_SIZE];
        buf[0..7].copy_from_slice(&SIGNATURE);
        LittleEndian::write_u32(&mut buf[7..11], INDEX_VERSION);
        buf[11] = info.encryption;
        LittleEndian::write_u64(&mut buf[12..20], info.sequence);
        LittleEndian::write_u64(&mut buf[20..28], info.count);
        LittleEndian::write_u32(&mut buf[28..32], info.block_idx);
        LittleEndian::write_u32(&mut buf[32..36], info.window_idx);
        LittleEndian::write_u64(&mut buf[36..44], info.cache_id);
        self.file.write_at(&buf, 0)
    }

    /// Number of index blocks.
    pub fn blocks(&self) -> u32 {
        self.block_idx.load(Ordering::Acquire)
    }

    /// Extends the file so block `idx` exists. New blocks arrive zeroed,
    /// which reads as empty slots.
    pub fn ensure_blocks(&self, idx: u32) -> Result<()> {
        let current = self.block_idx.load(Ordering::Acquire);
        if idx < current {
            return Ok(());
        }
        let grow = idx - current + 1;
        self.file
            .extend(u64::from(grow) * INDEX_BLOCK_SIZE as u64)?;
        self.block_idx.store(current + grow, Ordering::Release);
        Ok(())
    }

    /// Writes the slot for `seq` at its deterministic position.
    pub fn write_slot(&self, seq: u64, msg_offset: i64) -> Result<()> {
        self.ensure_blocks(block_index(seq))?;
        let pos = slot_position(seq);
        let block_off = block_offset(block_index(seq));

        let mut buf = [0u8; SLOT_SIZE];
        LittleEndian::write_u64(&mut buf[0..8], seq);
        LittleEndian::write_i64(&mut buf[8..16], msg_offset);
        self.file
            .write_at(&buf, (block_off + (pos * SLOT_SIZE) as i64) as u64)?;

        // Keep the trailer's fill mark current so scans can stop early.
        let trailer_off = (block_off + TRAILER_OFFSET as i64) as u64;
        let mut trailer = [0u8; 2];
        self.file.read_at(&mut trailer, trailer_off)?;
        let fill = LittleEndian::read_u16(&trailer);
        if (pos as u16) + 1 > fill {
            self.file
                .write_at(&((pos as u16) + 1).to_le_bytes(), trailer_off)?;
        }
        Ok(())
    }

    /// Linear-scans the block holding `seq` for a matching live slot.
    pub fn read_slot(&self, seq: u64) -> Result<Option<Slot>> {
        match self.scan_block(seq)? {
            Some((_, slot)) => Ok(Some(slot)),
            None => Ok(None),
        }
    }

    /// Zeroes the slot for `seq`, returning its previous content for the
    /// lease.
    pub fn clear_slot(&self, seq: u64) -> Result<Option<Slot>> {
        let Some((pos, slot)) = self.scan_block(seq)? else {
            return Ok(None);
        };
        let block_off = block_offset(block_index(seq));
        self.file
            .write_at(&[0u8; SLOT_SIZE], (block_off + (pos * SLOT_SIZE) as i64) as u64)?;
        Ok(Some(slot))
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync()
    }

    fn scan_block(&self, seq: u64) -> Result<Option<(usize, Slot)>> {
        let idx = block_index(seq);
        if idx >= self.blocks() {
            return Ok(None);
        }
        let mut buf = [0u8; INDEX_BLOCK_SIZE];
        self.file.read_at(&mut buf, block_offset(idx) as u64)?;

        for pos in 0..ENTRIES_PER_INDEX_BLOCK {
            let off = pos * SLOT_SIZE;
            let slot_seq = LittleEndian::read_u64(&buf[off..off + 8]);
            if slot_seq == seq {
                let msg_offset = LittleEndian::read_i64(&buf[off + 8..off + 16]);
                if msg_offset == 0 {
                    return Ok(None);
                }
                return Ok(Some((pos, Slot { seq, msg_offset })));
            }
        }
        Ok(None)
    }
}
