//! IV derivation: turning the volume's base IV plus a numeric seed into the
//! per-file and per-block IVs every other codec in this crate consumes.

use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Size of an AES block / derived IV, in bytes.
pub const IV_SIZE: usize = 16;

/// Derive a 16-byte IV from a base IV (the volume IV, or the pass-IV during
/// key unwrap) and a numeric seed.
///
/// `seed` must be 4 or 8 bytes. The HMAC input is `base_iv || reverse(seed)`,
/// zero-padded to 8 bytes when `seed` is only 4 long; the output is the
/// first 16 bytes of `HMAC-SHA1(mac_key, that concatenation)`.
///
/// # Panics
///
/// Panics if `seed.len()` is neither 4 nor 8.
pub fn derive_iv(mac_key: &[u8], base_iv: &[u8; IV_SIZE], seed: &[u8]) -> [u8; IV_SIZE] {
    let mut concat = Vec::with_capacity(IV_SIZE + 8);
    concat.extend_from_slice(base_iv);
    match seed.len() {
        4 => {
            concat.extend(seed.iter().rev());
            concat.extend_from_slice(&[0u8; 4]);
        }
        8 => concat.extend(seed.iter().rev()),
        other => panic!("iv seed must be 4 or 8 bytes, got {other}"),
    }

    let mut mac = HmacSha1::new_from_slice(mac_key).expect("HMAC accepts keys of any length");
    mac.update(&concat);
    let digest = mac.finalize().into_bytes();

    let mut iv = [0u8; IV_SIZE];
    iv.copy_from_slice(&digest[..IV_SIZE]);
    iv
}

/// Increment a big-endian seed by one, wrapping modulo `2^(8*seed.len())`.
/// `seed` must be 4 or 8 bytes; the result is the same length.
pub fn seed_plus_one(seed: &[u8]) -> Vec<u8> {
    let width = seed.len();
    debug_assert!(width == 4 || width == 8, "iv seed must be 4 or 8 bytes");
    let mut value: u64 = 0;
    for &b in seed {
        value = (value << 8) | u64::from(b);
    }
    let value = value.wrapping_add(1);
    value.to_be_bytes()[8 - width..].to_vec()
}

/// Derive the 8-byte content IV seed for `block_index` of a file, given
/// that file's 8-byte base IV: `big_endian_u64(block_index) XOR file_iv`.
pub fn block_iv_seed(file_iv: &[u8; 8], block_index: u32) -> [u8; 8] {
    let idx_bytes = u64::from(block_index).to_be_bytes();
    let mut out = [0u8; 8];
    for i in 0..8 {
        out[i] = idx_bytes[i] ^ file_iv[i];
    }
    out
}
