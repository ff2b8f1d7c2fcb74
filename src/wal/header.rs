use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};
use crate::wal::segment::{Segment, Segments};

/// Log file signature.
pub const SIGNATURE: [u8; 7] = [b'u', b'n', b'i', b't', b'd', b'b', 0xFE];

/// Log file format version.
pub const VERSION: u32 = 1;

/// Size of the file header: signature, version and three segments.
pub const HEADER_SIZE: usize = 47;

/// Size of the per-group log info header.
pub const LOG_HEADER_SIZE: usize = 28;

/// Lifecycle status of a log group. Zero never appears on disk for a
/// completed write, so a torn group reads as invalid and is ignored at
/// recovery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum LogStatus {
    Written = 1,
    Applied = 2,
    Released = 3,
}

impl LogStatus {
    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            1 => Some(LogStatus::Written),
            2 => Some(LogStatus::Applied),
            3 => Some(LogStatus::Released),
            _ => None,
        }
    }
}

/// File header of the segmented log.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Header {
    pub signature: [u8; 7],
    pub version: u32,
    pub segments: Segments,
}

impl Header {
    pub fn new(segments: Segments) -> Self {
        Header {
            signature: SIGNATURE,
            version: VERSION,
            segments,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.signature != SIGNATURE {
            return Err(Error::Corrupted("log signature mismatch".to_string()));
        }
        if self.version != VERSION {
            return Err(Error::Corrupted(format!(
                "unsupported log version {}",
                self.version
            )));
        }
        Ok(())
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..7].copy_from_slice(&self.signature);
        (&mut buf[7..11])
            .write_u32::<LittleEndian>(self.version)
            .unwrap();
        let mut off = 11;
        for seg in self.segments.iter() {
            (&mut buf[off..off + 4])
                .write_u32::<LittleEndian>(seg.size)
                .unwrap();
            (&mut buf[off + 4..off + 12])
                .write_i64::<LittleEndian>(seg.offset)
                .unwrap();
            off += 12;
        }
        buf
    }

    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        let mut signature = [0u8; 7];
        signature.copy_from_slice(&buf[0..7]);
        let version = (&buf[7..11]).read_u32::<LittleEndian>()?;

        let mut segments = [Segment::default(); 3];
        let mut off = 11;
        for seg in segments.iter_mut() {
            seg.size = (&buf[off..off + 4]).read_u32::<LittleEndian>()?;
            seg.offset = (&buf[off + 4..off + 12]).read_i64::<LittleEndian>()?;
            off += 12;
        }

        let header = Header {
            signature,
            version,
            segments: Segments::from_parts(segments),
        };
        header.validate()?;
        Ok(header)
    }
}

/// Per-group header: one of these precedes every group of records in the
/// log.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LogInfo {
    pub version: u16,
    pub status: LogStatus,
    pub time_id: i64,
    pub entry_count: u32,
    /// Total group size, header included.
    pub size: u32,
    /// Offset of this header in the file, stored for validation.
    pub offset: i64,
}

impl LogInfo {
    pub fn encode(&self) -> [u8; LOG_HEADER_SIZE] {
        let mut buf = [0u8; LOG_HEADER_SIZE];
        (&mut buf[0..2])
            .write_u16::<LittleEndian>(self.version)
            .unwrap();
        (&mut buf[2..4])
            .write_u16::<LittleEndian>(self.status as u16)
            .unwrap();
        (&mut buf[4..12])
            .write_i64::<LittleEndian>(self.time_id)
            .unwrap();
        (&mut buf[12..16])
            .write_u32::<LittleEndian>(self.entry_count)
            .unwrap();
        (&mut buf[16..20])
            .write_u32::<LittleEndian>(self.size)
            .unwrap();
        (&mut buf[20..28])
            .write_i64::<LittleEndian>(self.offset)
            .unwrap();
        buf
    }

    /// Decodes a log info header. Returns None when the status is not a
    /// valid lifecycle state, which marks a torn or never-completed write.
    pub fn decode(buf: &[u8; LOG_HEADER_SIZE]) -> Result<Option<Self>> {
        let version = (&buf[0..2]).read_u16::<LittleEndian>()?;
        let raw_status = (&buf[2..4]).read_u16::<LittleEndian>()?;
        let time_id = (&buf[4..12]).read_i64::<LittleEndian>()?;
        let entry_count = (&buf[12..16]).read_u32::<LittleEndian>()?;
        let size = (&buf[16..20]).read_u32::<LittleEndian>()?;
        let offset = (&buf[20..28]).read_i64::<LittleEndian>()?;

        let status = match LogStatus::from_u16(raw_status) {
            Some(s) => s,
            None => return Ok(None),
        };

        Ok(Some(LogInfo {
            version,
            status,
            time_id,
            entry_count,
            size,
            offset,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        let header = Header::new(Segments::new());

        let encoded = header.encode();
        assert_eq!(encoded.len(), HEADER_SIZE);
        let decoded = Header::decode(&encoded).expect("decode failed");
        assert_eq!(header, decoded);
    }

    #[test]
    fn test_header_signature_validation() {
        let mut buf = Header::new(Segments::new()).encode();
        buf[0..7].copy_from_slice(b"badsig!");
        assert!(matches!(
            Header::decode(&buf),
            Err(Error::Corrupted(_))
        ));
    }

    #[test]
    fn test_header_version_validation() {
        let mut buf = Header::new(Segments::new()).encode();
        buf[7..11].copy_from_slice(&999u32.to_le_bytes());
        assert!(matches!(
            Header::decode(&buf),
            Err(Error::Corrupted(_))
        ));
    }

    #[test]
    fn test_log_info_round_trip() {
        let info = LogInfo {
            version: 1,
            status: LogStatus::Written,
            time_id: 1_600_000_000_000_000_000,
            entry_count: 42,
            size: 1024,
            offset: 47,
        };
        let encoded = info.encode();
        assert_eq!(encoded.len(), LOG_HEADER_SIZE);
        let decoded = LogInfo::decode(&encoded)
            .expect("decode failed")
            .expect("valid status");
        assert_eq!(info, decoded);
    }

    #[test]
    fn test_log_info_torn_status() {
        let buf = [0u8; LOG_HEADER_SIZE];
        assert_eq!(LogInfo::decode(&buf).expect("decode failed"), None);
    }
}
