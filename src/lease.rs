use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A reclaimed index slot: its sequence plus the data-file region its
/// message occupied.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct LeasedSlot {
    pub seq: u64,
    pub msg_offset: i64,
    pub size: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
struct FreeRegion {
    offset: i64,
    size: u32,
}

/// Free-list of reclaimed index slots and data-file regions. Sequences are
/// handed back out under the same topic (so window chains stay valid and
/// the index does not fragment); regions satisfy data allocations before
/// the file extends. Serialized alongside the header.
#[derive(Default, Serialize, Deserialize)]
pub(crate) struct Lease {
    /// topic hash -> reclaimed slots.
    slots: HashMap<u64, Vec<LeasedSlot>>,
    /// Reusable data-file regions, kept sorted by offset.
    regions: Vec<FreeRegion>,
    #[serde(skip)]
    path: PathBuf,
}

impl Lease {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Loads the lease from disk, empty when the file does not exist yet.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut lease = match fs::read(&path) {
            Ok(bytes) if !bytes.is_empty() => bincode::deserialize::<Lease>(&bytes)?,
            _ => Lease::default(),
        };
        lease.path = path;
        Ok(lease)
    }

    /// Persists the lease; called as part of the header write.
    pub fn write(&self) -> Result<()> {
        let bytes = bincode::serialize(self)?;
        fs::write(&self.path, bytes)?;
        Ok(())
    }

    /// Records a reclaimed slot under its topic.
    pub fn free(&mut self, topic_hash: u64, seq: u64, msg_offset: i64, size: u32) {
        self.slots.entry(topic_hash).or_default().push(LeasedSlot {
            seq,
            msg_offset,
            size,
        });
        let pos = self
            .regions
            .partition_point(|r| r.offset < msg_offset);
        self.regions.insert(pos, FreeRegion { offset: msg_offset, size });
    }

    /// Pops a reusable sequence under the same topic, if any.
    pub fn get_slot(&mut self, topic_hash: u64) -> Option<u64> {
        let slots = self.slots.get_mut(&topic_hash)?;
        let slot = slots.pop()?;
        if slots.is_empty() {
            self.slots.remove(&topic_hash);
        }
        Some(slot.seq)
    }

    /// First-fit allocation out of the reclaimed data regions.
    pub fn allocate_region(&mut self, size: u32) -> Option<i64> {
        let pos = self.regions.iter().position(|r| r.size >= size)?;
        let region = self.regions[pos];
        if region.size == size {
            self.regions.remove(pos);
        } else {
            self.regions[pos] = FreeRegion {
                offset: region.offset + i64::from(size),
                size: region.size - size,
            };
        }
        Some(region.offset)
    }

    /// Merges adjacent free regions.
    pub fn defrag(&mut self) {
        if self.regions.len() < 2 {
            return;
        }
        self.regions.sort_unstable_by_key(|r| r.offset);
        let mut merged: Vec<FreeRegion> = Vec::with_capacity(self.regions.len());
        for region in self.regions.drain(..) {
            match merged.last_mut() {
                Some(last) if last.offset + i64::from(last.size) == region.offset => {
                    last.size += region.size;
                }
                _ => merged.push(region),
            }
        }
        self.regions = merged;
    }

    pub fn free_slot_count(&self) -> usize {
        self.slots.values().map(Vec::len).sum()
    }
}
