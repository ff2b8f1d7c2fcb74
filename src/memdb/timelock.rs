use std::sync::RwLock;

use crate::consistent::Consistent;
use crate::memdb::TimeId;

/// Number of lock stripes.
const N_LOCKS: usize = 27;

/// Bank of striped read-write locks keyed by TimeId. Writers to a TimeId's
/// block take the write lock, readers the read lock: a block in flight can
/// not be concurrently mutated and compacted, without any global lock.
pub struct TimeLock {
    stripes: Vec<RwLock<()>>,
    consistent: Consistent,
}

impl TimeLock {
    pub fn new() -> Self {
        Self {
            stripes: (0..N_LOCKS).map(|_| RwLock::new(())).collect(),
            consistent: Consistent::new(N_LOCKS),
        }
    }

    /// Returns the lock stripe for the given TimeId.
    pub fn get(&self, time_id: TimeId) -> &RwLock<()> {
        &self.stripes[self.consistent.find_bucket(time_id as u64)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_time_id_same_stripe() {
        let tl = TimeLock::new();
        let a = tl.get(42) as *const _;
        let b = tl.get(42) as *const _;
        assert_eq!(a, b);
    }

    #[test]
    fn test_read_then_write_does_not_deadlock() {
        let tl = TimeLock::new();
        {
            let _r = tl.get(7).read().unwrap();
        }
        let _w = tl.get(7).write().unwrap();
    }
}
