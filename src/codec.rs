use crate::error::Result;

/// Byte codec applied to message payloads before they reach the data file.
pub trait Codec: Send + Sync {
    fn encode(&self, data: &[u8]) -> Vec<u8>;
    fn decode(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Snappy block compression, the default payload codec.
pub struct Snappy;

impl Codec for Snappy {
    fn encode(&self, data: &[u8]) -> Vec<u8> {
        snap::raw::Encoder::new()
            .compress_vec(data)
            .unwrap_or_else(|_| data.to_vec())
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(snap::raw::Decoder::new().decompress_vec(data)?)
    }
}

/// AEAD cipher applied to payloads when encryption is requested. The engine
/// ships no cipher of its own; embedders supply one through
/// [`Options::cipher`](crate::config::Options).
pub trait Cipher: Send + Sync {
    /// Seals `plaintext`, returning ciphertext with the MAC appended.
    fn encrypt(&self, plaintext: &[u8]) -> Vec<u8>;
    /// Opens `ciphertext`, verifying the MAC.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}
