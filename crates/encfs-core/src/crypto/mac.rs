//! Truncated-HMAC-SHA1 MACs with chained-IV threading.
//!
//! EncFS never uses a raw HMAC digest directly; everything goes through a
//! fold that compresses the 20-byte HMAC-SHA1 output down to 8, 4, or 2
//! bytes (`mac64`/`mac32`/`mac16`), and every call site has the option of
//! threading a "chain" value from one MAC computation into the next so a
//! sequence of MACs (across path components, or across blocks in a file)
//! becomes sensitive to everything that came before it in the sequence.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use thiserror::Error;

type HmacSha1 = Hmac<Sha1>;

/// Errors from MAC verification.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MacError {
    /// The computed MAC did not match the MAC carried in the ciphertext.
    #[error("MAC checksum mismatch")]
    ChecksumMismatch,
}

/// The chain value produced by a MAC computation, to be threaded into the
/// next one in a chained sequence.
///
/// Represented as an explicit return value (per the REDESIGN FLAGS on
/// mutable-argument MAC chaining) rather than an in-out parameter: callers
/// that want to chain simply feed `ChainState::as_bytes()` from one call
/// into the `chain_iv` parameter of the next.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ChainState(Option<[u8; 8]>);

impl ChainState {
    /// The "no chaining in progress" state: an empty slice, which `mac64`
    /// and friends treat as "don't mix in a chain prefix" rather than
    /// indexing into zero bytes.
    pub fn none() -> Self {
        ChainState(None)
    }

    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        ChainState(Some(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.0 {
            Some(b) => b.as_slice(),
            None => &[],
        }
    }

    pub fn is_chaining(&self) -> bool {
        self.0.is_some()
    }
}

fn hmac_sha1_20(key: &[u8], data: &[u8], chain_iv: &[u8]) -> [u8; 20] {
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    if !chain_iv.is_empty() {
        // The chain bytes are mixed in *after* the data and in reverse
        // byte order — an exact quirk of reference EncFS's construction.
        for byte in chain_iv.iter().rev() {
            mac.update(std::slice::from_ref(byte));
        }
    }
    mac.finalize().into_bytes().into()
}

/// Fold a 20-byte HMAC-SHA1 digest down to 8 bytes.
///
/// Iterates only 19 of the 20 digest bytes (index 19, the last one, is
/// dropped rather than folded in) — this is an exact quirk of reference
/// EncFS's wire format and must be preserved byte-for-byte for
/// compatibility (see SPEC_FULL.md Open Question (a)).
fn fold_to_8(digest: &[u8; 20]) -> [u8; 8] {
    let mut folded = [0u8; 8];
    for (i, byte) in digest.iter().take(19).enumerate() {
        folded[i % 8] ^= byte;
    }
    folded
}

/// 64-bit truncated MAC, keyed with the volume key.
///
/// `chain_iv` is either empty (no chaining: the digest is computed over
/// `data` alone) or an 8-byte value from a prior `mac64`/`mac32`/`mac16`
/// call's [`ChainState`] (the digest is computed over `data || reverse(chain_iv)`).
/// Returns the 64-bit value and the [`ChainState`] a subsequent call in the
/// same chain should use.
pub fn mac64(key: &[u8], data: &[u8], chain_iv: &[u8]) -> (u64, ChainState) {
    let digest = hmac_sha1_20(key, data, chain_iv);
    let folded = fold_to_8(&digest);
    (u64::from_be_bytes(folded), ChainState::from_bytes(folded))
}

/// 32-bit truncated MAC: XOR-folds the high and low halves of [`mac64`].
pub fn mac32(key: &[u8], data: &[u8], chain_iv: &[u8]) -> (u32, ChainState) {
    let (mac64_value, chain) = mac64(key, data, chain_iv);
    let value = ((mac64_value >> 32) ^ mac64_value) as u32;
    (value, chain)
}

/// 16-bit truncated MAC: XOR-folds the high and low halves of [`mac32`].
pub fn mac16(key: &[u8], data: &[u8], chain_iv: &[u8]) -> (u16, ChainState) {
    let (mac32_value, chain) = mac32(key, data, chain_iv);
    let value = ((mac32_value >> 16) ^ mac32_value) as u16;
    (value, chain)
}
