use crate::db::DbCore;
use crate::entry::Entry;
use crate::error::Result;
use crate::memdb::tiny::TinyBatch;
use crate::memdb::TimeId;
use crate::window::WinEntry;

/// A group of writes committed atomically across topics: either every
/// entry becomes durable under the batch's TimeId, or the TimeId is
/// aborted and nothing survives. Entries are buffered until commit, so a
/// batch whose closure fails never stages anything.
pub struct Batch {
    time_id: TimeId,
    entries: Vec<Entry>,
    contract: u32,
    encryption: bool,
}

impl Batch {
    pub(crate) fn new(time_id: TimeId) -> Self {
        Self {
            time_id,
            entries: Vec::new(),
            contract: 0,
            encryption: false,
        }
    }

    /// Contract applied to every entry of this batch.
    pub fn set_contract(&mut self, contract: u32) {
        self.contract = contract;
    }

    /// Encrypt every entry of this batch.
    pub fn set_encryption(&mut self) {
        self.encryption = true;
    }

    /// Queues a message for the batch.
    pub fn put(&mut self, topic: impl Into<Vec<u8>>, payload: impl Into<Vec<u8>>) {
        self.entries.push(Entry::new(topic.into(), payload.into()));
    }

    /// Queues a prepared entry.
    pub fn put_entry(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stages every entry under the batch TimeId, dispatches the managed
    /// tiny batch and waits for durability. On any failure the TimeId is
    /// aborted and staged state is rolled back.
    pub(crate) async fn commit(mut self, core: &DbCore) -> Result<()> {
        if self.entries.is_empty() {
            core.mem.time_mark().release(self.time_id);
            return Ok(());
        }

        let (tb, done) = TinyBatch::with_signal(self.time_id, true);
        let mut staged: Vec<(u64, u64)> = Vec::new(); // (topic_hash, seq)

        let mut stage_error = None;
        for entry in self.entries.iter_mut() {
            if self.contract != 0 && entry.contract == 0 {
                entry.contract = self.contract;
            }
            entry.encryption |= self.encryption;

            match core.set_entry(entry) {
                Ok((blob, key, _id, topic_hash, seq, expires_at)) => {
                    if let Err(e) = core.mem.put_at(self.time_id, key, &blob) {
                        stage_error = Some(e);
                        break;
                    }
                    core.window
                        .append_pending(topic_hash, WinEntry { seq, expires_at });
                    tb.incount();
                    staged.push((topic_hash, seq));
                }
                Err(e) => {
                    stage_error = Some(e);
                    break;
                }
            }
        }

        if let Some(e) = stage_error {
            self.rollback(core, &staged);
            return Err(e);
        }

        core.mem.commit_managed(tb)?;
        match done.await {
            Ok(Ok(())) => {
                // Managed batches release their own TimeId once durable.
                core.mem.time_mark().release(self.time_id);
                Ok(())
            }
            Ok(Err(e)) => {
                // The commit path aborted the TimeId and discarded the
                // block; undo the window staging.
                for (topic_hash, seq) in &staged {
                    core.window.remove_pending(*topic_hash, *seq);
                }
                core.meter.aborts.inc(1);
                Err(e)
            }
            Err(_) => {
                self.rollback(core, &staged);
                Err(crate::Error::Closed)
            }
        }
    }

    fn rollback(&self, core: &DbCore, staged: &[(u64, u64)]) {
        for (topic_hash, seq) in staged {
            core.window.remove_pending(*topic_hash, *seq);
        }
        let _ = core.mem.discard(self.time_id);
        core.mem.time_mark().abort(self.time_id);
        core.meter.aborts.inc(1);
    }
}
