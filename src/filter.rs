use bitvec::prelude::*;

use crate::hasher::hash64;

/// Bits per tracked key. At 10 bits and 7 probes the false positive rate is
/// under 1%.
const BITS_PER_KEY: usize = 10;
const PROBES: usize = 7;

/// Accumulates sequence numbers and produces immutable [`Block`] snapshots.
/// The delete path tests the snapshot before touching the index file, so a
/// miss for a never-written sequence costs no I/O.
pub struct Generator {
    bits: BitVec<u8, Lsb0>,
}

impl Generator {
    pub fn new(expected_keys: usize) -> Self {
        let nbits = (expected_keys * BITS_PER_KEY).max(64);
        Self {
            bits: bitvec![u8, Lsb0; 0; nbits],
        }
    }

    /// Adds a key to the set.
    pub fn append(&mut self, key: u64) {
        let nbits = self.bits.len() as u64;
        let mut h = hash64(&key.to_le_bytes());
        // Double hashing: derive each probe from a rotated base hash.
        let delta = (h >> 33) | (h << 31);
        for _ in 0..PROBES {
            self.bits.set((h % nbits) as usize, true);
            h = h.wrapping_add(delta);
        }
    }

    /// Tests membership directly against the live bit array.
    pub fn test(&self, key: u64) -> bool {
        test_bits(self.bits.as_bitslice(), key)
    }

    /// Snapshots the current bit array into an immutable block.
    pub fn block(&self) -> Block {
        Block {
            bits: self.bits.clone(),
        }
    }
}

/// An immutable point-in-time summary of the generator.
#[derive(Clone)]
pub struct Block {
    bits: BitVec<u8, Lsb0>,
}

impl Block {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            bits: BitVec::from_slice(bytes),
        }
    }

    pub fn test(&self, key: u64) -> bool {
        test_bits(self.bits.as_bitslice(), key)
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.bits.as_raw_slice().to_vec()
    }
}

fn test_bits(bits: &BitSlice<u8, Lsb0>, key: u64) -> bool {
    let nbits = bits.len() as u64;
    if nbits == 0 {
        return false;
    }
    let mut h = hash64(&key.to_le_bytes());
    let delta = (h >> 33) | (h << 31);
    for _ in 0..PROBES {
        if !bits[(h % nbits) as usize] {
            return false;
        }
        h = h.wrapping_add(delta);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_keys_found() {
        let mut gen = Generator::new(1000);
        for seq in 1..=1000u64 {
            gen.append(seq);
        }
        for seq in 1..=1000u64 {
            assert!(gen.test(seq), "seq {seq} should test positive");
        }
    }

    #[test]
    fn test_absent_keys_mostly_rejected() {
        let mut gen = Generator::new(1000);
        for seq in 1..=1000u64 {
            gen.append(seq);
        }
        let false_positives = (100_000..101_000u64).filter(|&s| gen.test(s)).count();
        assert!(
            false_positives < 50,
            "false positive rate too high: {false_positives}/1000"
        );
    }

    #[test]
    fn test_block_snapshot_round_trip() {
        let mut gen = Generator::new(100);
        gen.append(7);
        gen.append(11);

        let block = Block::from_bytes(&gen.block().bytes());
        assert!(block.test(7));
        assert!(block.test(11));
    }

    #[test]
    fn test_empty_generator() {
        let gen = Generator::new(10);
        assert!(!gen.test(1));
    }
}
