use std::sync::atomic::{AtomicU64, Ordering};

/// Counters over message events. Cheap enough to bump on every operation;
/// read on demand for monitoring and by tests.
#[derive(Debug, Default)]
pub struct Meter {
    pub puts: Counter,
    pub gets: Counter,
    pub dels: Counter,
    pub syncs: Counter,
    pub recovers: Counter,
    pub leased: Counter,
    pub aborts: Counter,
    pub in_bytes: Counter,
    pub out_bytes: Counter,
}

impl Meter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self, delta: u64) {
        self.0.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_increments() {
        let meter = Meter::new();
        meter.puts.inc(1);
        meter.puts.inc(2);
        assert_eq!(meter.puts.get(), 3);
        assert_eq!(meter.gets.get(), 0);
    }
}
