//! C5: single-pass AES-CBC block codec.
//!
//! No padding is applied here — the caller pads plaintext to a multiple of
//! the AES block size (16 bytes) before calling [`block_encrypt`], and
//! strips any padding after [`block_decrypt`]. This mirrors reference
//! EncFS's block cipher mode, which is a bare CBC pass with padding
//! handled one layer up (in the filename codec's PKCS-style scheme, or by
//! the file codec's block-size-aligned buffering).
//!
//! The IV itself is never passed in directly: callers supply `base_iv` (the
//! volume IV) and an `iv_seed` (C3), and this module derives the concrete
//! 16-byte CBC IV via [`derive_iv`], matching the stream codec's use of the
//! same derivation for its two CFB rounds.

use aes::{Aes128, Aes192, Aes256};
use cbc::{Decryptor, Encryptor};
use cipher::block_padding::NoPadding;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use generic_array::GenericArray;

use super::iv::{derive_iv, IV_SIZE};
use super::primitives::AesKey;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Encrypt `data` with AES-CBC under an IV derived from `base_iv` and
/// `iv_seed`. `data.len()` must be a multiple of [`BLOCK_SIZE`].
///
/// # Panics
///
/// Panics if `data.len()` is not a multiple of 16 — callers own padding,
/// and an unpadded call here is a programming error, not a runtime
/// condition to recover from.
pub fn block_encrypt(key: &AesKey, base_iv: &[u8; IV_SIZE], iv_seed: &[u8], data: &[u8]) -> Vec<u8> {
    assert!(
        data.len() % BLOCK_SIZE == 0,
        "block_encrypt requires caller-padded input (got {} bytes)",
        data.len()
    );
    let iv = derive_iv(key.as_bytes(), base_iv, iv_seed);
    let mut buf = data.to_vec();
    let key_bytes = key.as_bytes();
    let iv_ga = GenericArray::from_slice(&iv);
    let out_len = match key {
        AesKey::Aes128(_) => Encryptor::<Aes128>::new(GenericArray::from_slice(key_bytes), iv_ga)
            .encrypt_padded_mut::<NoPadding>(&mut buf, data.len())
            .expect("exact-multiple-of-block-size input cannot fail NoPadding encrypt")
            .len(),
        AesKey::Aes192(_) => Encryptor::<Aes192>::new(GenericArray::from_slice(key_bytes), iv_ga)
            .encrypt_padded_mut::<NoPadding>(&mut buf, data.len())
            .expect("exact-multiple-of-block-size input cannot fail NoPadding encrypt")
            .len(),
        AesKey::Aes256(_) => Encryptor::<Aes256>::new(GenericArray::from_slice(key_bytes), iv_ga)
            .encrypt_padded_mut::<NoPadding>(&mut buf, data.len())
            .expect("exact-multiple-of-block-size input cannot fail NoPadding encrypt")
            .len(),
    };
    buf.truncate(out_len);
    buf
}

/// Decrypt `data` with AES-CBC under an IV derived the same way as
/// [`block_encrypt`]. `data.len()` must be a multiple of [`BLOCK_SIZE`].
/// Returns the plaintext, still caller-padded (this layer does not know or
/// care about any higher-level padding scheme).
///
/// # Panics
///
/// Panics if `data.len()` is not a multiple of 16.
pub fn block_decrypt(key: &AesKey, base_iv: &[u8; IV_SIZE], iv_seed: &[u8], data: &[u8]) -> Vec<u8> {
    assert!(
        data.len() % BLOCK_SIZE == 0,
        "block_decrypt requires block-aligned ciphertext (got {} bytes)",
        data.len()
    );
    let iv = derive_iv(key.as_bytes(), base_iv, iv_seed);
    let mut buf = data.to_vec();
    let key_bytes = key.as_bytes();
    let iv_ga = GenericArray::from_slice(&iv);
    let out_len = match key {
        AesKey::Aes128(_) => Decryptor::<Aes128>::new(GenericArray::from_slice(key_bytes), iv_ga)
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .expect("block-aligned ciphertext cannot fail NoPadding decrypt")
            .len(),
        AesKey::Aes192(_) => Decryptor::<Aes192>::new(GenericArray::from_slice(key_bytes), iv_ga)
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .expect("block-aligned ciphertext cannot fail NoPadding decrypt")
            .len(),
        AesKey::Aes256(_) => Decryptor::<Aes256>::new(GenericArray::from_slice(key_bytes), iv_ga)
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .expect("block-aligned ciphertext cannot fail NoPadding decrypt")
            .len(),
    };
    buf.truncate(out_len);
    buf
}
