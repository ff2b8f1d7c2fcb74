use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};

use crate::errdata;
use crate::error::Result;
use crate::fs::BlockFile;
use crate::message::topic::MAX_TOPIC_LENGTH;
use crate::message::{Id, ID_SIZE};
use crate::wal::header::SIGNATURE;

/// Message frame header: topic size, value size, expiry.
pub(crate) const MSG_HEADER_SIZE: usize = 10;

/// Maximum size of a value in bytes.
pub(crate) const MAX_VALUE_LENGTH: usize = 1 << 30;

/// Reserved file header; offset zero never hosts a message so an index
/// slot with `msg_offset == 0` is unambiguously empty.
const FILE_HEADER_SIZE: u64 = 47;

/// A message frame read off the data file.
pub(crate) struct Message {
    pub id: Id,
    pub topic: Vec<u8>,
    pub value: Vec<u8>,
    pub expires_at: u32,
}

/// Append-mostly data file of message frames:
/// `{topic_size: u16, value_size: u32, expires_at: u32} id topic value`.
/// Reclaimed regions come back through the lease before the file extends.
pub(crate) struct DataFile {
    file: BlockFile,
}

impl DataFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = BlockFile::open(path)?;
        if file.size() == 0 {
            file.extend(FILE_HEADER_SIZE)?;
            file.write_at(&SIGNATURE, 0)?;
        }
        Ok(Self { file })
    }

    /// Total frame size for a topic/value pair.
    pub fn message_size(topic_len: usize, value_len: usize) -> u32 {
        (MSG_HEADER_SIZE + ID_SIZE + topic_len + value_len) as u32
    }

    /// Writes a message frame at `offset`, or at the end of the file when
    /// no reclaimed offset is supplied. Returns the frame's offset and
    /// size.
    pub fn write_message(
        &self,
        offset: Option<i64>,
        id: &Id,
        topic: &[u8],
        value: &[u8],
        expires_at: u32,
    ) -> Result<(i64, u32)> {
        let size = Self::message_size(topic.len(), value.len());
        let offset = match offset {
            Some(off) => off,
            None => self.file.extend(u64::from(size))? as i64,
        };

        let mut buf = Vec::with_capacity(size as usize);
        buf.extend_from_slice(&(topic.len() as u16).to_le_bytes());
        buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
        buf.extend_from_slice(&expires_at.to_le_bytes());
        buf.extend_from_slice(id.bytes());
        buf.extend_from_slice(topic);
        buf.extend_from_slice(value);
        self.file.write_at(&buf, offset as u64)?;
        Ok((offset, size))
    }

    /// Reads the whole message frame at `offset`.
    pub fn read_message(&self, offset: i64) -> Result<Message> {
        let (topic_size, value_size, expires_at) = self.read_frame_header(offset)?;

        let mut buf = vec![0u8; ID_SIZE + topic_size + value_size];
        self.file
            .read_at(&mut buf, (offset + MSG_HEADER_SIZE as i64) as u64)?;
        let id = Id::from_bytes(&buf[..ID_SIZE])?;
        let topic = buf[ID_SIZE..ID_SIZE + topic_size].to_vec();
        let value = buf[ID_SIZE + topic_size..].to_vec();

        Ok(Message {
            id,
            topic,
            value,
            expires_at,
        })
    }

    /// Reads only the topic bytes of the frame at `offset`.
    pub fn read_topic(&self, offset: i64) -> Result<Vec<u8>> {
        let (topic_size, _, _) = self.read_frame_header(offset)?;
        let mut topic = vec![0u8; topic_size];
        self.file
            .read_at(&mut topic, (offset + (MSG_HEADER_SIZE + ID_SIZE) as i64) as u64)?;
        Ok(topic)
    }

    /// Size of the frame stored at `offset`, for lease accounting.
    pub fn frame_size(&self, offset: i64) -> Result<u32> {
        let (topic_size, value_size, _) = self.read_frame_header(offset)?;
        Ok(Self::message_size(topic_size, value_size))
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync()
    }

    fn read_frame_header(&self, offset: i64) -> Result<(usize, usize, u32)> {
        if offset < FILE_HEADER_SIZE as i64 {
            return Err(errdata!("message offset {offset} inside file header"));
        }
        let mut buf = [0u8; MSG_HEADER_SIZE];
        self.file.read_at(&mut buf, offset as u64)?;
        let topic_size = LittleEndian::read_u16(&buf[0..2]) as usize;
        let value_size = LittleEndian::read_u32(&buf[2..6]) as usize;
        let expires_at = LittleEndian::read_u32(&buf[6..10]);
        if topic_size > MAX_TOPIC_LENGTH || value_size > MAX_VALUE_LENGTH {
            return Err(errdata!("message frame at {offset} out of range"));
        }
        Ok((topic_size, value_size, expires_at))
    }
}
