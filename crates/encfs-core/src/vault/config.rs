//! The typed `VolumeConfig` data model (SPEC_FULL.md §3).
//!
//! Parsing the `.encfs6.xml` file itself is out of scope for this crate
//! (see SPEC_FULL.md §1); this module defines the struct shape and default
//! values a caller populates from that parse, with `serde` derives so a
//! caller can wire up `serde_xml_rs`/`quick-xml` without this crate taking
//! on that dependency itself.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fs::FilenameAlgorithm;

/// Default PBKDF2-HMAC-SHA1 iteration count reference EncFS uses for new
/// volumes.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 200_000;

/// Default plaintext block size, in bytes.
pub const DEFAULT_BLOCK_SIZE: u32 = 1024;

/// Default volume key size, in bits.
pub const DEFAULT_KEY_SIZE_BITS: u32 = 192;

/// Errors validating a `VolumeConfig`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VolumeConfigError {
    #[error("external_iv_chaining requires chained_name_iv and use_unique_iv")]
    ExternalIvChainingRequiresChaining,

    #[error("volume_key_size_bits must be 128, 192, or 256 (got {0})")]
    UnsupportedKeySize(u32),

    #[error("block_mac_bytes must be 0..=8 (got {0})")]
    BlockMacBytesOutOfRange(u32),

    #[error("block_mac_rand_bytes must be 0..=8 (got {0})")]
    BlockMacRandBytesOutOfRange(u32),

    #[error("encrypted_block_size_bytes must be nonzero")]
    ZeroBlockSize,

    #[error("encrypted_block_size_bytes must be a multiple of 16 (got {0})")]
    BlockSizeNotBlockAligned(u32),

    #[error(
        "encrypted_block_size_bytes ({block_size}) must exceed block_mac_bytes + block_mac_rand_bytes ({overhead})"
    )]
    BlockSizeSmallerThanHeaderOverhead { block_size: u32, overhead: u32 },

    #[error("wrapped_volume_key length ({actual}) does not match wrapped_key_length_bytes ({expected})")]
    WrappedKeyLengthMismatch { expected: u32, actual: usize },

    #[error("salt length ({actual}) does not match salt_length_bytes ({expected})")]
    SaltLengthMismatch { expected: u32, actual: usize },
}

/// The parsed, typed contents of a volume's `.encfs6.xml` configuration.
///
/// This crate does not parse the XML itself (see module docs); it only
/// defines this struct, its defaults, and [`VolumeConfig::validate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeConfig {
    pub filename_algorithm: FilenameAlgorithm,
    pub volume_key_size_bits: u32,
    pub encrypted_block_size_bytes: u32,
    pub use_unique_iv: bool,
    pub chained_name_iv: bool,
    pub external_iv_chaining: bool,
    pub holes_allowed: bool,
    pub block_mac_bytes: u32,
    pub block_mac_rand_bytes: u32,
    pub pbkdf2_iterations: u32,
    #[serde(with = "hex_bytes")]
    pub salt: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub wrapped_volume_key: Vec<u8>,
    pub wrapped_key_length_bytes: u32,
    pub salt_length_bytes: u32,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            filename_algorithm: FilenameAlgorithm::Block,
            volume_key_size_bits: DEFAULT_KEY_SIZE_BITS,
            encrypted_block_size_bytes: DEFAULT_BLOCK_SIZE,
            use_unique_iv: true,
            chained_name_iv: true,
            external_iv_chaining: false,
            holes_allowed: true,
            block_mac_bytes: 0,
            block_mac_rand_bytes: 0,
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
            salt: Vec::new(),
            wrapped_volume_key: Vec::new(),
            wrapped_key_length_bytes: 0,
            salt_length_bytes: 20,
        }
    }
}

impl VolumeConfig {
    /// Check the cross-field invariants called out in SPEC_FULL.md §3.
    ///
    /// This never mutates or coerces an invalid config into a valid one —
    /// callers get a typed error describing exactly which invariant broke.
    pub fn validate(&self) -> Result<(), VolumeConfigError> {
        if self.external_iv_chaining && !(self.chained_name_iv && self.use_unique_iv) {
            return Err(VolumeConfigError::ExternalIvChainingRequiresChaining);
        }
        if !matches!(self.volume_key_size_bits, 128 | 192 | 256) {
            return Err(VolumeConfigError::UnsupportedKeySize(self.volume_key_size_bits));
        }
        if self.block_mac_bytes > 8 {
            return Err(VolumeConfigError::BlockMacBytesOutOfRange(self.block_mac_bytes));
        }
        if self.block_mac_rand_bytes > 8 {
            return Err(VolumeConfigError::BlockMacRandBytesOutOfRange(
                self.block_mac_rand_bytes,
            ));
        }
        if self.encrypted_block_size_bytes == 0 {
            return Err(VolumeConfigError::ZeroBlockSize);
        }
        if self.encrypted_block_size_bytes % 16 != 0 {
            return Err(VolumeConfigError::BlockSizeNotBlockAligned(
                self.encrypted_block_size_bytes,
            ));
        }
        let overhead = self.block_mac_bytes + self.block_mac_rand_bytes;
        if self.encrypted_block_size_bytes <= overhead {
            return Err(VolumeConfigError::BlockSizeSmallerThanHeaderOverhead {
                block_size: self.encrypted_block_size_bytes,
                overhead,
            });
        }
        if !self.wrapped_volume_key.is_empty()
            && self.wrapped_volume_key.len() != self.wrapped_key_length_bytes as usize
        {
            return Err(VolumeConfigError::WrappedKeyLengthMismatch {
                expected: self.wrapped_key_length_bytes,
                actual: self.wrapped_volume_key.len(),
            });
        }
        if !self.salt.is_empty() && self.salt.len() != self.salt_length_bytes as usize {
            return Err(VolumeConfigError::SaltLengthMismatch {
                expected: self.salt_length_bytes,
                actual: self.salt.len(),
            });
        }
        Ok(())
    }

    /// The volume key size in bytes (for `AesKey::from_slice`).
    pub fn volume_key_size_bytes(&self) -> usize {
        (self.volume_key_size_bits / 8) as usize
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        hex::encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let mut config = VolumeConfig::default();
        config.salt = vec![0u8; 20];
        config.wrapped_volume_key = vec![0u8; 0];
        config.wrapped_key_length_bytes = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn external_iv_chaining_requires_chaining() {
        let mut config = VolumeConfig::default();
        config.external_iv_chaining = true;
        config.chained_name_iv = false;
        assert_eq!(
            config.validate(),
            Err(VolumeConfigError::ExternalIvChainingRequiresChaining)
        );
    }

    #[test]
    fn rejects_unsupported_key_size() {
        let mut config = VolumeConfig::default();
        config.volume_key_size_bits = 160;
        assert_eq!(config.validate(), Err(VolumeConfigError::UnsupportedKeySize(160)));
    }

    #[test]
    fn rejects_oversized_mac_bytes() {
        let mut config = VolumeConfig::default();
        config.block_mac_bytes = 9;
        assert_eq!(
            config.validate(),
            Err(VolumeConfigError::BlockMacBytesOutOfRange(9))
        );
    }

    #[test]
    fn rejects_non_block_aligned_block_size() {
        let mut config = VolumeConfig::default();
        config.encrypted_block_size_bytes = 1000;
        assert_eq!(
            config.validate(),
            Err(VolumeConfigError::BlockSizeNotBlockAligned(1000))
        );
    }

    #[test]
    fn rejects_mismatched_wrapped_key_length() {
        let mut config = VolumeConfig::default();
        config.wrapped_volume_key = vec![0u8; 10];
        config.wrapped_key_length_bytes = 20;
        assert_eq!(
            config.validate(),
            Err(VolumeConfigError::WrappedKeyLengthMismatch {
                expected: 20,
                actual: 10
            })
        );
    }

    #[test]
    fn volume_key_size_bytes_matches_bits() {
        let config = VolumeConfig {
            volume_key_size_bits: 256,
            ..VolumeConfig::default()
        };
        assert_eq!(config.volume_key_size_bytes(), 32);
    }
}
