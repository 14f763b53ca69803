//! Confidentiality for the radio link.
//!
//! A single pre-shared 128-bit key and AES-128-CTR with an implicit nonce
//! derived from packet identity. This is keystream confidentiality only:
//! integrity lives in the link-layer CRC and authentication is limited to
//! possession of the key.

mod ctr;

pub use ctr::PacketCipher;

use crate::error::{Error, Result};

/// Size of the pre-shared key in bytes.
pub const KEY_SIZE: usize = 16;

/// A 128-bit pre-shared key for the radio link.
#[derive(Clone)]
pub struct PresharedKey([u8; KEY_SIZE]);

impl PresharedKey {
    pub fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse a key from 32 hex characters.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| Error::Config(format!("invalid PSK hex: {e}")))?;
        let bytes: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| Error::Config(format!("PSK must be {KEY_SIZE} bytes")))?;
        Ok(Self(bytes))
    }

    /// Generate a random key (bench and test use).
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for PresharedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.write_str("PresharedKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_parsing_round_trips() {
        let key = PresharedKey::from_hex("000102030405060708090a0b0c0d0e0f").unwrap();
        assert_eq!(
            key.as_bytes(),
            &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]
        );
    }

    #[test]
    fn wrong_length_hex_is_rejected() {
        assert!(PresharedKey::from_hex("0011").is_err());
        assert!(PresharedKey::from_hex("not hex at all").is_err());
    }

    #[test]
    fn debug_does_not_leak_key_material() {
        let key = PresharedKey::new(*b"0123456789abcdef");
        assert_eq!(format!("{key:?}"), "PresharedKey(..)");
    }
}
