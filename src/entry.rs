use byteorder::{ByteOrder, LittleEndian};

use crate::errdata;
use crate::error::Result;
use crate::message::topic::Topic;
use crate::message::Id;

/// Size of the encoded entry header inside a staged cache entry.
pub(crate) const ENTRY_HEADER_SIZE: usize = 26;

/// Header of a staged cache entry:
/// `{seq, topic_size, value_size, expires_at, topic_hash}` followed by the
/// 9-byte ID, the topic bytes (first entry per topic only) and the encoded
/// value. This blob is what the memdb stores and the log replays.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct EntryHeader {
    pub seq: u64,
    pub topic_size: u16,
    pub value_size: u32,
    pub expires_at: u32,
    pub topic_hash: u64,
}

impl EntryHeader {
    pub fn encode(&self) -> [u8; ENTRY_HEADER_SIZE] {
        let mut buf = [0u8; ENTRY_HEADER_SIZE];
        LittleEndian::write_u64(&mut buf[0..8], self.seq);
        LittleEndian::write_u16(&mut buf[8..10], self.topic_size);
        LittleEndian::write_u32(&mut buf[10..14], self.value_size);
        LittleEndian::write_u32(&mut buf[14..18], self.expires_at);
        LittleEndian::write_u64(&mut buf[18..26], self.topic_hash);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < ENTRY_HEADER_SIZE {
            return Err(errdata!("cache entry shorter than its header"));
        }
        Ok(Self {
            seq: LittleEndian::read_u64(&buf[0..8]),
            topic_size: LittleEndian::read_u16(&buf[8..10]),
            value_size: LittleEndian::read_u32(&buf[10..14]),
            expires_at: LittleEndian::read_u32(&buf[14..18]),
            topic_hash: LittleEndian::read_u64(&buf[18..26]),
        })
    }
}

/// A message on its way into the store. Reusable across puts of the same
/// topic: the parsed topic is cached after the first call, so bulk writers
/// pay for parsing once.
#[derive(Clone, Debug, Default)]
pub struct Entry {
    pub topic: Vec<u8>,
    pub payload: Vec<u8>,
    /// Isolation tag; zero selects the master contract.
    pub contract: u32,
    /// Explicit message ID; assigned by the store when absent.
    pub id: Option<Id>,
    /// Unix-second expiry; zero never expires. Usually set through the
    /// topic's `?ttl=` option.
    pub expires_at: u32,
    /// Request encryption for this entry alone.
    pub encryption: bool,

    pub(crate) parsed: Option<Topic>,
    pub(crate) topic_hash: u64,
}

impl Entry {
    pub fn new(topic: impl Into<Vec<u8>>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            ..Default::default()
        }
    }

    /// Swaps the payload, keeping the parsed topic.
    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_contract(mut self, contract: u32) -> Self {
        self.contract = contract;
        self
    }

    pub fn with_id(mut self, id: Id) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_encryption(mut self) -> Self {
        self.encryption = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        let header = EntryHeader {
            seq: 42,
            topic_size: 11,
            value_size: 1024,
            expires_at: 1_700_000_000,
            topic_hash: 0xABCD_EF01_2345_6789,
        };
        let encoded = header.encode();
        assert_eq!(encoded.len(), ENTRY_HEADER_SIZE);
        assert_eq!(EntryHeader::decode(&encoded).expect("decode failed"), header);
    }

    #[test]
    fn test_decode_short_buffer() {
        assert!(matches!(
            EntryHeader::decode(&[0u8; 10]),
            Err(crate::Error::Corrupted(_))
        ));
    }

    #[test]
    fn test_entry_payload_reuse() {
        let entry = Entry::new("teams.alpha", "first").with_payload("second");
        assert_eq!(entry.topic, b"teams.alpha");
        assert_eq!(entry.payload, b"second");
    }
}
