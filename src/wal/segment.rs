use crate::error::{Error, Result};
use crate::fs::BlockFile;
use crate::wal::header::{Header, LogInfo, LogStatus, HEADER_SIZE, LOG_HEADER_SIZE};

use std::path::Path;

/// One contiguous free region of the log file.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Segment {
    pub offset: i64,
    pub size: u32,
}

/// The three free regions of the segmented log: `[0]` free head, `[1]` the
/// live carve source, `[2]` the retired free area. The regions stay
/// disjoint; their union plus the carved-out live records covers the file
/// past the header.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Segments([Segment; 3]);

impl Segments {
    pub fn new() -> Self {
        let mut segments = [Segment::default(); 3];
        segments[0] = Segment {
            offset: HEADER_SIZE as i64,
            size: 0,
        };
        segments[1] = Segment {
            offset: HEADER_SIZE as i64,
            size: 0,
        };
        Segments(segments)
    }

    pub fn from_parts(parts: [Segment; 3]) -> Self {
        Segments(parts)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.0.iter()
    }

    /// Size of the live carve source.
    pub fn curr_size(&self) -> u32 {
        self.0[1].size
    }

    /// Steps an offset past any free region starting at it. Used by the
    /// recovery scan to find the next live record.
    pub fn recovery_offset(&self, mut offset: i64) -> i64 {
        if offset == self.0[0].offset {
            offset += i64::from(self.0[0].size);
        }
        if offset == self.0[1].offset {
            offset += i64::from(self.0[1].size);
        }
        if offset == self.0[2].offset {
            offset += i64::from(self.0[2].size);
        }
        offset
    }

    /// Reports the size of the free region starting at `offset`, zero when
    /// no region starts there.
    pub fn free_size(&self, offset: i64) -> u32 {
        if offset == self.0[0].offset {
            return self.0[0].size;
        }
        if offset == self.0[1].offset {
            return self.0[1].size;
        }
        if offset == self.0[2].offset {
            return self.0[2].size;
        }
        0
    }

    /// Carves `size` bytes from the head of the live segment. The caller
    /// checks capacity via [`curr_size`](Self::curr_size) first.
    pub fn allocate(&mut self, size: u32) -> i64 {
        let off = self.0[1].offset;
        self.0[1].size -= size;
        self.0[1].offset += i64::from(size);
        off
    }

    /// Returns the freed region to a segment when it is contiguous with
    /// one; otherwise reports false and the caller keeps tracking it.
    pub fn free(&mut self, offset: i64, size: u32) -> bool {
        if self.0[0].offset + i64::from(self.0[0].size) == offset {
            self.0[0].size += size;
            return true;
        }
        if self.0[1].offset + i64::from(self.0[1].size) == offset {
            self.0[1].size += size;
            return true;
        }
        false
    }

    /// Promotes adjacent free ranges: merges the live segment into the
    /// retired area when contiguous, and rotates the free head into the
    /// live position once the head outgrows the target.
    pub fn swap(&mut self, target_size: i64) {
        if self.0[1].size != 0
            && self.0[1].offset + i64::from(self.0[1].size) == self.0[2].offset
        {
            self.0[1].size += self.0[2].size;
            self.0[2].size = 0;
        }
        if target_size < i64::from(self.0[0].size) {
            self.0[2] = self.0[1];
            self.0[1] = self.0[0];
            self.0[0].size = 0;
            tracing::debug!(segments = ?self.0, "log segments swapped");
        }
    }
}

/// The backing log file plus its free-segment accounting.
pub struct LogFile {
    file: BlockFile,
    pub segments: Segments,
    target_size: i64,
}

impl LogFile {
    pub fn open(path: impl AsRef<Path>, target_size: i64) -> Result<Self> {
        let file = BlockFile::open(path)?;
        Ok(Self {
            file,
            segments: Segments::new(),
            target_size,
        })
    }

    pub fn size(&self) -> i64 {
        self.file.size() as i64
    }

    /// Returns an offset able to hold `size` bytes. The file grows until it
    /// reaches its target size; after that, requests are carved from the
    /// reclaimed live segment when it can satisfy them.
    pub fn allocate(&mut self, size: u32) -> Result<i64> {
        if size == 0 {
            return Err(Error::InvalidState(
                "unable to allocate zero bytes".to_string(),
            ));
        }
        if self.target_size > self.size() + i64::from(size) || self.segments.curr_size() < size {
            let off = self.file.extend(u64::from(size))?;
            return Ok(off as i64);
        }
        Ok(self.segments.allocate(size))
    }

    pub fn read_at(&self, buf: &mut [u8], offset: i64) -> Result<()> {
        self.file.read_at(buf, offset as u64)
    }

    pub fn write_at(&self, buf: &[u8], offset: i64) -> Result<()> {
        self.file.write_at(buf, offset as u64)
    }

    pub fn write_log_info(&self, info: &LogInfo) -> Result<()> {
        self.write_at(&info.encode(), info.offset)
    }

    /// Reads the log info header at `offset`; None past the end of the
    /// file or on a torn header.
    pub fn read_log_info(&self, offset: i64) -> Result<Option<LogInfo>> {
        if offset + LOG_HEADER_SIZE as i64 > self.size() {
            return Ok(None);
        }
        let mut buf = [0u8; LOG_HEADER_SIZE];
        self.read_at(&mut buf, offset)?;
        LogInfo::decode(&buf)
    }

    pub fn write_header(&self) -> Result<()> {
        let header = Header::new(self.segments);
        self.write_at(&header.encode(), 0)
    }

    /// Reads and validates the file header, loading the segment table.
    pub fn read_header(&mut self) -> Result<()> {
        let mut buf = [0u8; HEADER_SIZE];
        self.read_at(&mut buf, 0)?;
        let header = Header::decode(&buf)?;
        self.segments = header.segments;
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync()
    }

    /// Truncates the log back to an empty file holding only a fresh header.
    pub fn reset(&mut self) -> Result<()> {
        self.file.truncate(0)?;
        self.segments = Segments::new();
        self.file.extend(HEADER_SIZE as u64)?;
        self.write_header()?;
        self.sync()
    }

    /// Verifies a scanned group header is plausible before trusting it.
    pub fn validate_log_info(&self, info: &LogInfo, offset: i64) -> bool {
        info.offset == offset
            && info.size >= LOG_HEADER_SIZE as u32
            && offset + i64::from(info.size) <= self.size()
            && !(info.status == LogStatus::Written && info.entry_count == 0)
    }
}
