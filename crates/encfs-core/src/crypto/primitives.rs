//! Low-level primitives: AES key handling, PBKDF2-HMAC-SHA1, and the two
//! byte-transform helpers (`shuffle`/`unshuffle`/`flip_bytes`) the stream
//! codec layers on top of plain AES-CFB.

use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;
use zeroize::Zeroizing;

/// An AES key of one of the three sizes EncFS volumes support.
///
/// Carrying the key as an owned, zeroizing buffer (rather than a cached
/// cipher object) is what lets every codec in this crate construct a fresh
/// cipher per operation instead of holding one mutable cipher alive across
/// calls (see the REDESIGN FLAGS notes on mutable cipher objects).
#[derive(Clone)]
pub enum AesKey {
    Aes128(Zeroizing<[u8; 16]>),
    Aes192(Zeroizing<[u8; 24]>),
    Aes256(Zeroizing<[u8; 32]>),
}

impl AesKey {
    /// Build an `AesKey` from a raw key of 16, 24, or 32 bytes.
    ///
    /// # Panics
    ///
    /// Panics if `key` is not exactly one of the three supported lengths.
    /// Callers are expected to have validated `volume_key_size_bits`
    /// against `VolumeConfig` before reaching this point.
    pub fn from_slice(key: &[u8]) -> Self {
        match key.len() {
            16 => AesKey::Aes128(Zeroizing::new(key.try_into().unwrap())),
            24 => AesKey::Aes192(Zeroizing::new(key.try_into().unwrap())),
            32 => AesKey::Aes256(Zeroizing::new(key.try_into().unwrap())),
            other => panic!("unsupported AES key length: {other} bytes"),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            AesKey::Aes128(k) => k.as_slice(),
            AesKey::Aes192(k) => k.as_slice(),
            AesKey::Aes256(k) => k.as_slice(),
        }
    }

    pub fn bits(&self) -> u32 {
        match self {
            AesKey::Aes128(_) => 128,
            AesKey::Aes192(_) => 192,
            AesKey::Aes256(_) => 256,
        }
    }
}

/// Derive `output_len` bytes of key material via PBKDF2-HMAC-SHA1.
///
/// This is the sole key-stretching function EncFS volumes use: both the
/// volume-key-unwrap key encryption key (C9) and (when a caller wants to
/// cache the expensive part of unlocking) any KDF-output caching layer
/// built on top of this crate go through here.
pub fn pbkdf2_hmac_sha1(password: &[u8], salt: &[u8], iterations: u32, output_len: usize) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(vec![0u8; output_len]);
    pbkdf2_hmac::<Sha1>(password, salt, iterations, &mut out);
    out
}

/// XOR-chain a buffer in place: `b[i] ^= b[i-1]` for `i` in `1..len`, using
/// each step's *output* as the next step's input. `b[0]` is left untouched.
/// This cannot be parallelized across the buffer (matches reference
/// EncFS's chained construction for its stream cipher mode) and is its own
/// algorithmic inverse when run with [`unshuffle`].
pub fn shuffle(data: &mut [u8]) {
    for i in 1..data.len() {
        data[i] ^= data[i - 1];
    }
}

/// Inverse of [`shuffle`]: walks the buffer back to front so each `b[i-1]`
/// is still the shuffled (pre-recovery) value when it's used.
pub fn unshuffle(data: &mut [u8]) {
    for i in (1..data.len()).rev() {
        data[i] ^= data[i - 1];
    }
}

/// Segmented byte-order reversal: reverses each 64-byte segment of the
/// buffer in place (the final, possibly-short segment is reversed too).
/// Its own inverse.
pub fn flip_bytes(data: &mut [u8]) {
    for segment in data.chunks_mut(64) {
        segment.reverse();
    }
}
