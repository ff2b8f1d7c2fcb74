use std::fmt;

use crc::{Algorithm, Crc};

pub const CRC_64_ECMA: Algorithm<u64> = crc::CRC_64_ECMA_182;

/// Streaming 64-bit hasher. Used for topic hashes, which must be stable
/// across runs: CRC-64 depends only on the input bytes, never on process
/// state.
pub struct Hasher {
    digest: u64,
    crc64: Crc<u64>,
}

impl fmt::Debug for Hasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hasher")
            .field("digest", &self.digest)
            .finish()
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    pub fn new() -> Self {
        Self {
            digest: 0,
            crc64: Crc::<u64>::new(&CRC_64_ECMA),
        }
    }

    /// Folds `data` into the running digest.
    pub fn write(&mut self, data: &[u8]) {
        let mut digest = self.crc64.digest();
        digest.update(&self.digest.to_le_bytes());
        digest.update(data);
        self.digest = digest.finalize();
    }

    /// Returns the current digest.
    pub fn finish(&self) -> u64 {
        self.digest
    }

    /// Resets the digest to its initial state.
    pub fn reset(&mut self) {
        self.digest = 0;
    }
}

/// Hashes a single buffer in one shot.
pub fn hash64(data: &[u8]) -> u64 {
    let crc64 = Crc::<u64>::new(&CRC_64_ECMA);
    crc64.checksum(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_across_instances() {
        let mut a = Hasher::new();
        let mut b = Hasher::new();
        a.write(b"teams.alpha.ch1");
        b.write(b"teams.alpha.ch1");
        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn test_order_sensitive() {
        let mut a = Hasher::new();
        a.write(b"alpha");
        a.write(b"beta");

        let mut b = Hasher::new();
        b.write(b"beta");
        b.write(b"alpha");

        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn test_reset() {
        let mut h = Hasher::new();
        h.write(b"teams");
        let first = h.finish();
        h.reset();
        h.write(b"teams");
        assert_eq!(first, h.finish());
    }

    #[test]
    fn test_hash64_matches_known_input() {
        assert_eq!(hash64(b"teams"), hash64(b"teams"));
        assert_ne!(hash64(b"teams"), hash64(b"team"));
    }
}
