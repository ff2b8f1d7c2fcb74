use std::collections::HashMap;
use std::sync::RwLock;

use byteorder::{ByteOrder, LittleEndian};

use crate::errdata;
use crate::error::Result;

/// Record frame overhead: u32 length, u8 delete flag, u64 key.
pub(crate) const FRAME_OVERHEAD: usize = 13;

/// Internal key: the user key plus its deleted flag, so a deletion marker
/// and the live record for the same key coexist in one map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct IKey {
    pub del: bool,
    pub key: u64,
}

impl IKey {
    pub fn live(key: u64) -> Self {
        IKey { del: false, key }
    }

    pub fn deleted(key: u64) -> Self {
        IKey { del: true, key }
    }
}

/// A single TimeId's staging block: an append-only byte slab plus a map
/// from internal key to frame offset. The embedded lock guards the slab
/// and map; lifecycle transitions are additionally serialized by the
/// owner's time lock.
pub(crate) struct Block {
    inner: RwLock<BlockInner>,
}

struct BlockInner {
    data: Vec<u8>,
    records: HashMap<IKey, usize>,
    count: i64,
}

impl Block {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BlockInner {
                data: Vec::new(),
                records: HashMap::new(),
                count: 0,
            }),
        }
    }

    /// Appends a framed record and indexes it under `ikey`.
    pub fn put(&self, ikey: IKey, payload: &[u8]) -> Result<()> {
        let mut inner = self.inner.write()?;
        let frame_len = (FRAME_OVERHEAD + payload.len()) as u32;
        let offset = inner.data.len();

        inner.data.extend_from_slice(&frame_len.to_le_bytes());
        inner.data.push(u8::from(ikey.del));
        inner.data.extend_from_slice(&ikey.key.to_le_bytes());
        inner.data.extend_from_slice(payload);

        inner.records.insert(ikey, offset);
        if !ikey.del {
            inner.count += 1;
        }
        Ok(())
    }

    /// Returns the payload of the record stored under `ikey`.
    pub fn get(&self, ikey: IKey) -> Result<Option<Vec<u8>>> {
        let inner = self.inner.read()?;
        let Some(&offset) = inner.records.get(&ikey) else {
            return Ok(None);
        };
        Ok(Some(read_payload(&inner.data, offset)?.to_vec()))
    }

    pub fn contains(&self, ikey: IKey) -> bool {
        self.inner.read().map(|i| i.records.contains_key(&ikey)).unwrap_or(false)
    }

    /// Drops the record stored under `ikey`. The slab keeps the bytes (the
    /// block is short-lived); only the index entry goes away.
    pub fn remove(&self, ikey: IKey) -> Result<bool> {
        let mut inner = self.inner.write()?;
        let removed = inner.records.remove(&ikey).is_some();
        if removed && !ikey.del {
            inner.count -= 1;
        }
        Ok(removed)
    }

    /// Number of live (non-deleted) records.
    pub fn count(&self) -> i64 {
        self.inner.read().map(|i| i.count).unwrap_or(0)
    }

    /// Bytes held by the slab.
    pub fn size(&self) -> usize {
        self.inner.read().map(|i| i.data.len()).unwrap_or(0)
    }

    /// Snapshot of all indexed frames without their length prefix, i.e.
    /// `del_flag | key | payload`, the shape written to the log.
    pub fn frames(&self) -> Result<Vec<Vec<u8>>> {
        let inner = self.inner.read()?;
        let mut frames = Vec::with_capacity(inner.records.len());
        for &offset in inner.records.values() {
            let frame_len = frame_len(&inner.data, offset)?;
            frames.push(inner.data[offset + 4..offset + frame_len].to_vec());
        }
        Ok(frames)
    }

    /// Snapshot of all records as `(ikey, payload)` pairs.
    pub fn entries(&self) -> Result<Vec<(IKey, Vec<u8>)>> {
        let inner = self.inner.read()?;
        let mut entries = Vec::with_capacity(inner.records.len());
        for (&ikey, &offset) in inner.records.iter() {
            entries.push((ikey, read_payload(&inner.data, offset)?.to_vec()));
        }
        Ok(entries)
    }

    /// Snapshot of deletion markers as `(key, payload)` pairs.
    pub fn del_markers(&self) -> Result<Vec<(u64, Vec<u8>)>> {
        let inner = self.inner.read()?;
        let mut markers = Vec::new();
        for (&ikey, &offset) in inner.records.iter() {
            if ikey.del {
                markers.push((ikey.key, read_payload(&inner.data, offset)?.to_vec()));
            }
        }
        Ok(markers)
    }
}

fn frame_len(data: &[u8], offset: usize) -> Result<usize> {
    if offset + 4 > data.len() {
        return Err(errdata!("block frame offset out of range"));
    }
    let len = LittleEndian::read_u32(&data[offset..offset + 4]) as usize;
    if len < FRAME_OVERHEAD || offset + len > data.len() {
        return Err(errdata!("block frame length out of range"));
    }
    Ok(len)
}

fn read_payload(data: &[u8], offset: usize) -> Result<&[u8]> {
    let len = frame_len(data, offset)?;
    Ok(&data[offset + FRAME_OVERHEAD..offset + len])
}
