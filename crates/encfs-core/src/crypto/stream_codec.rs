//! C4: the two-round AES-CFB stream codec used for filenames (stream
//! algorithm), the tail block of file content, and the volume-key-unwrap
//! step (C9).
//!
//! Reference EncFS's "stream" mode is not plain AES-CFB: it interleaves a
//! [`shuffle`]/[`flip_bytes`] pass around two rounds of CFB keystream
//! application, with each round's 16-byte IV derived independently from
//! `base_iv` (the volume IV, or the pass-IV during key unwrap) and a
//! caller-supplied 4- or 8-byte `iv_seed` (C3). Encrypt order:
//!
//! ```text
//! shuffle -> CFB-encrypt(derive_iv(seed)) -> flip_bytes -> shuffle -> CFB-encrypt(derive_iv(seed+1))
//! ```
//!
//! Decrypt is the exact mirror, with each step replaced by its inverse and
//! run in reverse order.

use aes::{Aes128, Aes192, Aes256};
use cfb_mode::{Decryptor, Encryptor};
use cipher::{AsyncStreamCipher, KeyIvInit};
use generic_array::GenericArray;

use super::iv::{derive_iv, seed_plus_one, IV_SIZE};
use super::primitives::{flip_bytes, shuffle, unshuffle, AesKey};

fn cfb_encrypt_in_place(key: &AesKey, iv: &[u8; IV_SIZE], buf: &mut [u8]) {
    let key_bytes = key.as_bytes();
    let iv_ga = GenericArray::from_slice(iv);
    match key {
        AesKey::Aes128(_) => Encryptor::<Aes128>::new(GenericArray::from_slice(key_bytes), iv_ga).encrypt(buf),
        AesKey::Aes192(_) => Encryptor::<Aes192>::new(GenericArray::from_slice(key_bytes), iv_ga).encrypt(buf),
        AesKey::Aes256(_) => Encryptor::<Aes256>::new(GenericArray::from_slice(key_bytes), iv_ga).encrypt(buf),
    }
}

fn cfb_decrypt_in_place(key: &AesKey, iv: &[u8; IV_SIZE], buf: &mut [u8]) {
    let key_bytes = key.as_bytes();
    let iv_ga = GenericArray::from_slice(iv);
    match key {
        AesKey::Aes128(_) => Decryptor::<Aes128>::new(GenericArray::from_slice(key_bytes), iv_ga).decrypt(buf),
        AesKey::Aes192(_) => Decryptor::<Aes192>::new(GenericArray::from_slice(key_bytes), iv_ga).decrypt(buf),
        AesKey::Aes256(_) => Decryptor::<Aes256>::new(GenericArray::from_slice(key_bytes), iv_ga).decrypt(buf),
    }
}

/// Encrypt `data` with the two-round stream codec. Works on data of any
/// length (CFB is a self-synchronizing stream mode; no padding needed).
/// `key`'s raw bytes double as the HMAC key for [`derive_iv`], matching
/// reference EncFS's single shared volume-key context.
pub fn stream_encrypt(key: &AesKey, base_iv: &[u8; IV_SIZE], iv_seed: &[u8], data: &[u8]) -> Vec<u8> {
    let mut buf = data.to_vec();

    shuffle(&mut buf);
    let iv1 = derive_iv(key.as_bytes(), base_iv, iv_seed);
    cfb_encrypt_in_place(key, &iv1, &mut buf);
    flip_bytes(&mut buf);
    shuffle(&mut buf);
    let seed2 = seed_plus_one(iv_seed);
    let iv2 = derive_iv(key.as_bytes(), base_iv, &seed2);
    cfb_encrypt_in_place(key, &iv2, &mut buf);

    buf
}

/// Inverse of [`stream_encrypt`].
pub fn stream_decrypt(key: &AesKey, base_iv: &[u8; IV_SIZE], iv_seed: &[u8], data: &[u8]) -> Vec<u8> {
    let mut buf = data.to_vec();

    let seed2 = seed_plus_one(iv_seed);
    let iv2 = derive_iv(key.as_bytes(), base_iv, &seed2);
    cfb_decrypt_in_place(key, &iv2, &mut buf);
    unshuffle(&mut buf);
    flip_bytes(&mut buf);
    let iv1 = derive_iv(key.as_bytes(), base_iv, iv_seed);
    cfb_decrypt_in_place(key, &iv1, &mut buf);
    unshuffle(&mut buf);

    buf
}
