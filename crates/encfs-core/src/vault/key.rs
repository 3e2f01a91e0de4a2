//! C9: volume key unwrap/wrap.
//!
//! Unwraps the `(volume_key, volume_iv)` pair from a password-protected
//! `VolumeConfig`, and wraps a freshly generated pair for volume creation.
//! Both directions share one stream-cipher pass (C4) keyed by a
//! PBKDF2-HMAC-SHA1-derived `(pass_key, pass_iv)` pair; the password itself
//! never touches the volume's actual key material except through that KDF.

use rand::RngCore;
use thiserror::Error;
use tracing::instrument;
use zeroize::Zeroizing;

use crate::crypto::primitives::{pbkdf2_hmac_sha1, AesKey};
use crate::crypto::{mac32, stream_codec};

/// Errors unwrapping a volume key from a `VolumeConfig`.
#[derive(Error, Debug)]
pub enum KeyUnwrapError {
    /// The recovered key material's checksum did not match the `iv_seed`
    /// carried in the wrapped blob. Reference EncFS cannot distinguish a
    /// wrong password from a corrupt config here — both produce this same
    /// error.
    #[error("wrong password or corrupt volume configuration")]
    ChecksumMismatch,

    /// `wrapped_volume_key` was too short to contain an IV seed, key, and
    /// IV of the expected sizes.
    #[error("wrapped volume key is too short ({actual} bytes, need at least {minimum})")]
    WrappedKeyTooShort { actual: usize, minimum: usize },
}

/// The recovered secret state of an unlocked volume.
pub struct VolumeKeyMaterial {
    pub volume_key: AesKey,
    pub volume_iv: [u8; 16],
}

const IV_SEED_LEN: usize = 4;

fn derive_pass_key_iv(password: &[u8], salt: &[u8], iterations: u32, key_size_bytes: usize) -> (AesKey, [u8; 16]) {
    let derived: Zeroizing<Vec<u8>> = pbkdf2_hmac_sha1(password, salt, iterations, key_size_bytes + 16);
    let pass_key = AesKey::from_slice(&derived[..key_size_bytes]);
    let mut pass_iv = [0u8; 16];
    pass_iv.copy_from_slice(&derived[key_size_bytes..key_size_bytes + 16]);
    (pass_key, pass_iv)
}

/// Unwrap `(volume_key, volume_iv)` from a volume's wrapped key blob.
///
/// `wrapped_volume_key` is `iv_seed(4 bytes) || ciphertext`, where the
/// ciphertext stream-decrypts (keyed by `pass_key`/`pass_iv`, seeded by
/// `iv_seed`) to `volume_key || volume_iv`. The `iv_seed` itself doubles as
/// the checksum: it must equal `mac32(pass_key, volume_key || volume_iv)`.
#[instrument(skip(password, salt, wrapped_volume_key))]
pub fn unwrap_volume_key(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    key_size_bytes: usize,
    wrapped_volume_key: &[u8],
) -> Result<VolumeKeyMaterial, KeyUnwrapError> {
    let minimum = IV_SEED_LEN + key_size_bytes + 16;
    if wrapped_volume_key.len() < minimum {
        return Err(KeyUnwrapError::WrappedKeyTooShort {
            actual: wrapped_volume_key.len(),
            minimum,
        });
    }

    let (pass_key, pass_iv) = derive_pass_key_iv(password, salt, iterations, key_size_bytes);
    let iv_seed = &wrapped_volume_key[..IV_SEED_LEN];
    let ciphertext = &wrapped_volume_key[IV_SEED_LEN..];
    let plaintext = stream_codec::stream_decrypt(&pass_key, &pass_iv, iv_seed, ciphertext);

    let volume_key_bytes = &plaintext[..key_size_bytes];
    let volume_iv_bytes = &plaintext[key_size_bytes..key_size_bytes + 16];

    let (checksum, _) = mac32(pass_key.as_bytes(), &plaintext, &[]);
    if checksum.to_be_bytes() != iv_seed {
        return Err(KeyUnwrapError::ChecksumMismatch);
    }

    let volume_key = AesKey::from_slice(volume_key_bytes);
    let mut volume_iv = [0u8; 16];
    volume_iv.copy_from_slice(volume_iv_bytes);

    Ok(VolumeKeyMaterial { volume_key, volume_iv })
}

/// Generate a fresh `(volume_key, volume_iv)` pair and wrap it for a new
/// volume, returning the wrapped blob and the salt used to derive the
/// wrapping key.
#[instrument(skip(password, rng))]
pub fn wrap_new_volume_key(
    password: &[u8],
    iterations: u32,
    key_size_bytes: usize,
    salt_len: usize,
    rng: &mut dyn RngCore,
) -> (Vec<u8>, Vec<u8>, VolumeKeyMaterial) {
    let mut salt = vec![0u8; salt_len];
    rng.fill_bytes(&mut salt);

    let mut volume_key_bytes = vec![0u8; key_size_bytes];
    rng.fill_bytes(&mut volume_key_bytes);
    let mut volume_iv = [0u8; 16];
    rng.fill_bytes(&mut volume_iv);

    let mut plaintext = Vec::with_capacity(key_size_bytes + 16);
    plaintext.extend_from_slice(&volume_key_bytes);
    plaintext.extend_from_slice(&volume_iv);

    let (pass_key, pass_iv) = derive_pass_key_iv(password, &salt, iterations, key_size_bytes);
    let (checksum, _) = mac32(pass_key.as_bytes(), &plaintext, &[]);
    let iv_seed = checksum.to_be_bytes();

    let ciphertext = stream_codec::stream_encrypt(&pass_key, &pass_iv, &iv_seed, &plaintext);

    let mut wrapped = Vec::with_capacity(IV_SEED_LEN + ciphertext.len());
    wrapped.extend_from_slice(&iv_seed);
    wrapped.extend_from_slice(&ciphertext);

    let volume_key = AesKey::from_slice(&volume_key_bytes);
    (wrapped, salt, VolumeKeyMaterial { volume_key, volume_iv })
}
