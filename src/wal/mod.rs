//! Write-ahead log of framed record groups over a segmented file.
//!
//! Every group is keyed by the TimeId of the tiny batch that produced it
//! and moves through `Written -> Applied -> Released`. Space of finished
//! groups returns to the segment table and is carved up again once the file
//! reaches its target size, so a steady-state log stops growing.
//!
//! # Group format
//!
//! ```text
//! +----------------------+
//! | log info (28 bytes)  |  version, status, time_id, entry_count, size, offset
//! +----------------------+
//! | u32 len | record     |  len includes its own 4 bytes
//! +----------------------+
//! | ...                  |
//! +----------------------+
//! ```
//!
//! A torn write is detected because the log info status is only flipped to
//! `Written` after the body is on disk; recovery ignores anything else at
//! the scan frontier.

pub mod header;
pub mod reader;
pub mod segment;

pub use header::{LogInfo, LogStatus, HEADER_SIZE, LOG_HEADER_SIZE};
pub use reader::{GroupReader, Reader};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::error::{Error, Result};
use crate::wal::segment::LogFile;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Log record format version stamped into every group header.
pub const LOG_VERSION: u16 = 1;

pub struct WalOptions {
    pub path: PathBuf,
    /// Size the file grows to before reclaimed segments are reused.
    pub target_size: i64,
    /// Truncate instead of failing when the header is corrupted.
    pub reset: bool,
}

pub struct Wal {
    opts: WalOptions,
    pub(crate) inner: Mutex<WalInner>,
    closed: AtomicBool,
}

pub(crate) struct WalInner {
    pub(crate) log_file: LogFile,
    /// Groups currently occupying file space: written groups plus
    /// applied/released ones whose region has not coalesced yet.
    pub(crate) logs: Vec<LogInfo>,
}

impl Wal {
    /// Opens or creates the log. The boolean is true when written but
    /// unapplied groups exist and the owner must replay them.
    pub fn new(opts: WalOptions) -> Result<(Self, bool)> {
        let mut log_file = LogFile::open(&opts.path, opts.target_size)?;
        let mut logs = Vec::new();

        if log_file.size() == 0 {
            log_file.reset()?;
        } else {
            match log_file.read_header() {
                Ok(()) => {}
                Err(e @ Error::Corrupted(_)) if opts.reset => {
                    tracing::warn!(error = %e, "log header corrupted, resetting");
                    log_file.reset()?;
                }
                Err(e) => return Err(e),
            }

            // Scan groups from the first byte past the header, stepping
            // over free regions; an invalid header marks the tail.
            let mut offset = HEADER_SIZE as i64;
            loop {
                offset = log_file.segments.recovery_offset(offset);
                if offset >= log_file.size() {
                    break;
                }
                match log_file.read_log_info(offset)? {
                    Some(info) if log_file.validate_log_info(&info, offset) => {
                        logs.push(info);
                        offset += i64::from(info.size);
                    }
                    _ => break,
                }
            }
        }

        let need_recovery = logs
            .iter()
            .any(|l| l.status == LogStatus::Written && l.entry_count > 0);
        if need_recovery {
            tracing::info!(
                groups = logs.len(),
                "write ahead log holds unapplied groups"
            );
        }

        Ok((
            Self {
                opts,
                inner: Mutex::new(WalInner { log_file, logs }),
                closed: AtomicBool::new(false),
            },
            need_recovery,
        ))
    }

    /// Starts a buffered writer for one group.
    pub fn writer(&self) -> Result<Writer<'_>> {
        self.ok()?;
        Ok(Writer {
            wal: self,
            buffer: Vec::new(),
            entry_count: 0,
        })
    }

    /// Starts a reader over all written groups.
    pub fn reader(&self) -> Result<Reader<'_>> {
        self.ok()?;
        Ok(Reader::new(self))
    }

    /// Marks the group for `time_id` applied and reclaims whatever space
    /// has become contiguous.
    pub fn signal_log_applied(&self, time_id: i64) -> Result<()> {
        self.ok()?;
        let mut inner = self.inner.lock()?;
        let pos = inner
            .logs
            .iter()
            .position(|l| l.time_id == time_id && l.status == LogStatus::Written)
            .ok_or(Error::EntryDoesNotExist)?;
        inner.logs[pos].status = LogStatus::Applied;
        let info = inner.logs[pos];
        inner.log_file.write_log_info(&info)?;
        Self::release_cycle(&mut inner, self.opts.target_size)?;
        Ok(())
    }

    /// Truncates the log to empty. Used once a recovery replay has been
    /// absorbed into the staging store.
    pub fn reset(&self) -> Result<()> {
        self.ok()?;
        let mut inner = self.inner.lock()?;
        inner.logs.clear();
        inner.log_file.reset()
    }

    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        let inner = self.inner.lock()?;
        inner.log_file.write_header()?;
        inner.log_file.sync()
    }

    pub(crate) fn target_size(&self) -> i64 {
        self.opts.target_size
    }

    fn ok(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        Ok(())
    }

    /// Returns finished groups to the segment table until no more regions
    /// coalesce, then promotes segments and persists the header. Ends every
    /// WAL cycle.
    pub(crate) fn release_cycle(inner: &mut WalInner, target_size: i64) -> Result<()> {
        let mut progress = true;
        while progress {
            progress = false;
            let mut i = 0;
            while i < inner.logs.len() {
                let l = inner.logs[i];
                if l.status != LogStatus::Written
                    && inner.log_file.segments.free(l.offset, l.size)
                {
                    inner.logs.remove(i);
                    progress = true;
                } else {
                    i += 1;
                }
            }
        }
        inner.log_file.segments.swap(target_size);
        inner.log_file.write_header()
    }
}

/// Buffers records for a single group. Nothing touches the file until
/// [`signal_init_write`](Writer::signal_init_write).
pub struct Writer<'a> {
    wal: &'a Wal,
    buffer: Vec<u8>,
    entry_count: u32,
}

impl Writer<'_> {
    /// Copies `data` into the group buffer, length-prefixed. Never blocks
    /// on I/O.
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        let len = (data.len() + 4) as u32;
        self.buffer.write_u32::<LittleEndian>(len)?;
        self.buffer.extend_from_slice(data);
        self.entry_count += 1;
        Ok(())
    }

    /// Durably persists the group under `time_id`: allocates a region,
    /// writes the body, then the header with status `Written`, and syncs.
    /// Completion of this call is the durability signal for every record
    /// appended to the group.
    pub fn signal_init_write(self, time_id: i64) -> Result<()> {
        self.wal.ok()?;
        if self.entry_count == 0 {
            return Ok(());
        }

        let mut inner = self.wal.inner.lock()?;
        let size = (LOG_HEADER_SIZE + self.buffer.len()) as u32;
        let offset = inner.log_file.allocate(size)?;
        inner
            .log_file
            .write_at(&self.buffer, offset + LOG_HEADER_SIZE as i64)?;

        let info = LogInfo {
            version: LOG_VERSION,
            status: LogStatus::Written,
            time_id,
            entry_count: self.entry_count,
            size,
            offset,
        };
        inner.log_file.write_log_info(&info)?;
        inner.log_file.sync()?;
        inner.logs.push(info);
        inner.log_file.write_header()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tmpfs::TempDir;

    fn new_test_wal(dir: &TempDir, reset: bool) -> Result<(Wal, bool)> {
        Wal::new(WalOptions {
            path: dir.path().join("data.log"),
            target_size: 1 << 8,
            reset,
        })
    }

    #[test]
    fn test_empty_log() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let (wal, need_recovery) = new_test_wal(&dir, false).expect("Failed to open wal");
        assert!(!need_recovery);
        wal.close().expect("Failed to close");
    }

    #[test]
    fn test_recovery_flag_after_written_group() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let (wal, need_recovery) = new_test_wal(&dir, false).expect("Failed to open wal");
        assert!(!need_recovery);

        let mut writer = wal.writer().expect("Failed to create writer");
        for i in 0..1000 {
            writer
                .append(format!("msg.{i:2}").as_bytes())
                .expect("Failed to append");
        }
        writer.signal_init_write(1000).expect("Failed to write group");
        wal.close().expect("Failed to close");

        let (wal, need_recovery) = new_test_wal(&dir, false).expect("Failed to reopen wal");
        assert!(need_recovery, "written group must trigger recovery");
        wal.close().expect("Failed to close");
    }

    #[test]
    fn test_round_trip_preserves_payloads_in_order() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let (wal, _) = new_test_wal(&dir, false).expect("Failed to open wal");

        let payloads: Vec<Vec<u8>> = (0..100).map(|i| format!("payload-{i}").into_bytes()).collect();
        let mut writer = wal.writer().expect("Failed to create writer");
        for p in &payloads {
            writer.append(p).expect("Failed to append");
        }
        writer.signal_init_write(7).expect("Failed to write group");
        wal.close().expect("Failed to close");

        let (wal, need_recovery) = new_test_wal(&dir, false).expect("Failed to reopen wal");
        assert!(need_recovery);

        let mut got = Vec::new();
        let mut reader = wal.reader().expect("Failed to create reader");
        reader
            .read(|time_id, group| {
                assert_eq!(time_id, 7);
                while let Some(data) = group.next()? {
                    got.push(data.to_vec());
                }
                Ok(false)
            })
            .expect("Failed to read");
        assert_eq!(got, payloads);
        wal.close().expect("Failed to close");

        // The reader released the group in place.
        let (wal, need_recovery) = new_test_wal(&dir, false).expect("Failed to reopen wal");
        assert!(!need_recovery, "released groups must not trigger recovery");
        wal.close().expect("Failed to close");
    }

    #[test]
    fn test_signal_log_applied_releases_group() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let (wal, _) = new_test_wal(&dir, false).expect("Failed to open wal");

        let mut writer = wal.writer().expect("Failed to create writer");
        writer.append(b"one").expect("Failed to append");
        writer.signal_init_write(42).expect("Failed to write group");

        wal.signal_log_applied(42).expect("Failed to apply");
        wal.close().expect("Failed to close");

        let (wal, need_recovery) = new_test_wal(&dir, false).expect("Failed to reopen wal");
        assert!(!need_recovery, "applied groups must not trigger recovery");
        wal.close().expect("Failed to close");
    }

    #[test]
    fn test_signal_log_applied_unknown_time_id() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let (wal, _) = new_test_wal(&dir, false).expect("Failed to open wal");
        assert!(matches!(
            wal.signal_log_applied(99),
            Err(Error::EntryDoesNotExist)
        ));
        wal.close().expect("Failed to close");
    }

    #[test]
    fn test_multiple_groups_replay_in_time_order() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let (wal, _) = new_test_wal(&dir, false).expect("Failed to open wal");

        for time_id in [3i64, 1, 2] {
            let mut writer = wal.writer().expect("Failed to create writer");
            writer
                .append(format!("group-{time_id}").as_bytes())
                .expect("Failed to append");
            writer
                .signal_init_write(time_id)
                .expect("Failed to write group");
        }
        wal.close().expect("Failed to close");

        let (wal, need_recovery) = new_test_wal(&dir, false).expect("Failed to reopen wal");
        assert!(need_recovery);

        let mut order = Vec::new();
        let mut reader = wal.reader().expect("Failed to create reader");
        reader
            .read(|time_id, group| {
                while group.next()?.is_some() {}
                order.push(time_id);
                Ok(false)
            })
            .expect("Failed to read");
        assert_eq!(order, vec![1, 2, 3]);
        wal.close().expect("Failed to close");
    }

    #[test]
    fn test_reset_truncates() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let (wal, _) = new_test_wal(&dir, false).expect("Failed to open wal");

        let mut writer = wal.writer().expect("Failed to create writer");
        writer.append(b"data").expect("Failed to append");
        writer.signal_init_write(1).expect("Failed to write group");

        wal.reset().expect("Failed to reset");
        wal.close().expect("Failed to close");

        let (wal, need_recovery) = new_test_wal(&dir, false).expect("Failed to reopen wal");
        assert!(!need_recovery);
        wal.close().expect("Failed to close");
    }

    #[test]
    fn test_torn_group_ignored_at_recovery() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let (wal, _) = new_test_wal(&dir, false).expect("Failed to open wal");

        let mut writer = wal.writer().expect("Failed to create writer");
        writer.append(b"durable").expect("Failed to append");
        writer.signal_init_write(5).expect("Failed to write group");

        // Simulate a torn follow-up write: body bytes present, header never
        // flipped to a valid status.
        {
            let inner = wal.inner.lock().unwrap();
            let end = inner.log_file.size();
            inner
                .log_file
                .write_at(&[0u8; 64], end)
                .expect("Failed to scribble");
        }
        wal.close().expect("Failed to close");

        let (wal, need_recovery) = new_test_wal(&dir, false).expect("Failed to reopen wal");
        assert!(need_recovery, "intact group should still be recovered");
        let mut groups = 0;
        let mut reader = wal.reader().expect("Failed to create reader");
        reader
            .read(|_, group| {
                while group.next()?.is_some() {}
                groups += 1;
                Ok(false)
            })
            .expect("Failed to read");
        assert_eq!(groups, 1, "torn group must be invisible");
        wal.close().expect("Failed to close");
    }

    #[test]
    fn test_space_reuse_after_release() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        // Tiny target so the file stops growing immediately.
        let (wal, _) = Wal::new(WalOptions {
            path: dir.path().join("data.log"),
            target_size: 64,
            reset: false,
        })
        .expect("Failed to open wal");

        for round in 0..10i64 {
            let mut writer = wal.writer().expect("Failed to create writer");
            writer.append(&[round as u8; 32]).expect("Failed to append");
            writer
                .signal_init_write(round)
                .expect("Failed to write group");
            wal.signal_log_applied(round).expect("Failed to apply");
        }

        let size = wal.inner.lock().unwrap().log_file.size();
        // Ten groups of ~64 bytes would need ~640 bytes without reuse.
        assert!(
            size < 300,
            "released space should be reused, file is {size} bytes"
        );
        wal.close().expect("Failed to close");
    }

    #[test]
    fn test_closed_wal_rejects_operations() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let (wal, _) = new_test_wal(&dir, false).expect("Failed to open wal");
        wal.close().expect("Failed to close");
        assert!(matches!(wal.writer(), Err(Error::Closed)));
        assert!(matches!(wal.reader(), Err(Error::Closed)));
    }
}
