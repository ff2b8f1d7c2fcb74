use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::memdb::TimeId;

/// Reference-count sentinel for an aborted TimeId.
const ABORTED: i32 = -1;

#[derive(Clone, Copy, Debug)]
struct TimeRecord {
    refs: i32,
    /// UTC nanoseconds of the final unref; only meaningful once released.
    last_unref: i64,
}

/// Process-wide ledger of TimeIds. A TimeId is born with one reference,
/// gains one per interested party, and is released when the count reaches
/// zero; released records linger (so `is_released` keeps answering) until
/// the expirer sweeps them.
pub struct TimeMark {
    durations: Duration,
    last_issued: AtomicI64,
    inner: RwLock<TimeMarkInner>,
}

struct TimeMarkInner {
    records: HashMap<TimeId, TimeRecord>,
    released: HashMap<TimeId, TimeRecord>,
}

pub fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

impl TimeMark {
    pub fn new(expiry_duration: Duration) -> Self {
        Self {
            durations: expiry_duration,
            last_issued: AtomicI64::new(0),
            inner: RwLock::new(TimeMarkInner {
                records: HashMap::new(),
                released: HashMap::new(),
            }),
        }
    }

    /// Issues a fresh monotonically increasing TimeId seeded with one
    /// reference.
    pub fn new_time_id(&self) -> TimeId {
        let now = now_nanos();
        let time_id = self
            .last_issued
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .map(|last| now.max(last + 1))
            .unwrap_or(now);
        self.add(time_id);
        time_id
    }

    /// Adds a reference to `time_id`, reviving it with one reference if it
    /// is unknown.
    pub fn add(&self, time_id: TimeId) {
        let mut inner = self.inner.write().unwrap();
        inner
            .records
            .entry(time_id)
            .and_modify(|r| r.refs += 1)
            .or_insert(TimeRecord {
                refs: 1,
                last_unref: 0,
            });
    }

    /// Drops a reference; at zero the record moves to the released set
    /// stamped with the unref time.
    pub fn release(&self, time_id: TimeId) {
        let mut inner = self.inner.write().unwrap();
        let Some(mut record) = inner.records.remove(&time_id) else {
            return;
        };
        record.refs -= 1;
        if record.refs > 0 {
            inner.records.insert(time_id, record);
        } else {
            record.last_unref = now_nanos();
            inner.released.insert(time_id, record);
        }
    }

    /// Marks `time_id` aborted regardless of its reference count.
    pub fn abort(&self, time_id: TimeId) {
        let mut inner = self.inner.write().unwrap();
        inner.records.remove(&time_id);
        inner.released.insert(
            time_id,
            TimeRecord {
                refs: ABORTED,
                last_unref: now_nanos(),
            },
        );
    }

    pub fn is_released(&self, time_id: TimeId) -> bool {
        let inner = self.inner.read().unwrap();
        inner
            .released
            .get(&time_id)
            .map(|r| r.refs != ABORTED)
            .unwrap_or(false)
    }

    pub fn is_aborted(&self, time_id: TimeId) -> bool {
        let inner = self.inner.read().unwrap();
        inner
            .released
            .get(&time_id)
            .map(|r| r.refs == ABORTED)
            .unwrap_or(false)
    }

    /// Sweeps released records whose last unref is older than the
    /// configured duration. The comparison uses the cached stamp, so the
    /// sweep never reads the clock per record.
    pub fn expire_released(&self) {
        let now = now_nanos();
        let horizon = self.durations.as_nanos() as i64;
        let mut inner = self.inner.write().unwrap();
        inner
            .released
            .retain(|_, r| !(r.last_unref > 0 && r.last_unref + horizon <= now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_time_ids_are_monotonic() {
        let tm = TimeMark::new(Duration::from_secs(60));
        let a = tm.new_time_id();
        let b = tm.new_time_id();
        let c = tm.new_time_id();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_not_released_until_refs_reach_zero() {
        let tm = TimeMark::new(Duration::from_secs(60));
        let tid = tm.new_time_id();
        tm.add(tid); // second reference

        assert!(!tm.is_released(tid));
        tm.release(tid);
        assert!(!tm.is_released(tid), "one reference remains");
        tm.release(tid);
        assert!(tm.is_released(tid));
        // Released stays released until expiry.
        assert!(tm.is_released(tid));
    }

    #[test]
    fn test_abort_overrides_release() {
        let tm = TimeMark::new(Duration::from_secs(60));
        let tid = tm.new_time_id();
        tm.abort(tid);
        assert!(tm.is_aborted(tid));
        assert!(!tm.is_released(tid));
    }

    #[test]
    fn test_release_unknown_time_id_is_noop() {
        let tm = TimeMark::new(Duration::from_secs(60));
        tm.release(12345);
        assert!(!tm.is_released(12345));
    }

    #[test]
    fn test_expirer_sweeps_old_records() {
        let tm = TimeMark::new(Duration::ZERO);
        let tid = tm.new_time_id();
        tm.release(tid);
        assert!(tm.is_released(tid));

        // Zero duration: everything released in the past expires.
        std::thread::sleep(Duration::from_millis(1));
        tm.expire_released();
        assert!(!tm.is_released(tid));
    }

    #[test]
    fn test_expirer_keeps_recent_records() {
        let tm = TimeMark::new(Duration::from_secs(3600));
        let tid = tm.new_time_id();
        tm.release(tid);
        tm.expire_released();
        assert!(tm.is_released(tid));
    }
}
