use crate::hasher::hash64;

/// Number of virtual points placed on the ring per bucket.
const REPLICAS: usize = 20;

/// Consistent-hash ring mapping 64-bit keys onto a fixed set of buckets.
/// Used by the time lock to pick a stripe for a TimeId: the mapping is
/// stable for a given bucket count, so every holder of the same TimeId
/// lands on the same lock.
pub struct Consistent {
    ring: Vec<(u64, usize)>, // (point, bucket) sorted by point
    buckets: usize,
}

impl Consistent {
    pub fn new(buckets: usize) -> Self {
        assert!(buckets > 0, "consistent hash needs at least one bucket");
        let mut ring = Vec::with_capacity(buckets * REPLICAS);
        for bucket in 0..buckets {
            for replica in 0..REPLICAS {
                let point = hash64(format!("{bucket}-{replica}").as_bytes());
                ring.push((point, bucket));
            }
        }
        ring.sort_unstable();
        Self { ring, buckets }
    }

    /// Returns the bucket index for the given key.
    pub fn find_bucket(&self, key: u64) -> usize {
        let point = hash64(&key.to_le_bytes());
        match self.ring.binary_search_by_key(&point, |&(p, _)| p) {
            Ok(i) => self.ring[i].1,
            // Wrap around past the last point.
            Err(i) if i == self.ring.len() => self.ring[0].1,
            Err(i) => self.ring[i].1,
        }
    }

    pub fn buckets(&self) -> usize {
        self.buckets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_mapping() {
        let a = Consistent::new(27);
        let b = Consistent::new(27);
        for key in [0u64, 1, 42, u64::MAX, 1_600_000_000_000_000_000] {
            assert_eq!(a.find_bucket(key), b.find_bucket(key));
        }
    }

    #[test]
    fn test_buckets_in_range() {
        let ring = Consistent::new(27);
        for key in 0..1000u64 {
            assert!(ring.find_bucket(key) < 27);
        }
    }

    #[test]
    fn test_distribution_not_degenerate() {
        let ring = Consistent::new(8);
        let mut seen = std::collections::HashSet::new();
        for key in 0..10_000u64 {
            seen.insert(ring.find_bucket(key));
        }
        // All buckets should receive at least one key out of 10k.
        assert_eq!(seen.len(), 8);
    }
}
