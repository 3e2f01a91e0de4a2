//! C7: the filename codec.
//!
//! Dispatches on [`FilenameAlgorithm`] — a tagged variant rather than an
//! inheritance hierarchy, per the REDESIGN FLAGS in SPEC_FULL.md. The wire
//! format for `Stream`/`Block` is `mac16(name) prefix || ciphertext`,
//! custom-base64 encoded (C6); `Null` passes the name through unencrypted.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::iv::IV_SIZE;
use crate::crypto::{
    base64_decode, base64_encode, block_codec, mac16, stream_codec, ChainState,
};
use crate::crypto::primitives::AesKey;

const BLOCK_SIZE: usize = 16;
const MAC_PREFIX_LEN: usize = 2;

/// Which of reference EncFS's three filename encryption strategies a
/// volume uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilenameAlgorithm {
    /// Filenames are stored in plaintext.
    Null,
    /// Stream-cipher-coded filenames (C4).
    Stream,
    /// Block-cipher-coded filenames, padded to the AES block size (C5).
    Block,
}

/// Ambient context for a filename codec error.
#[derive(Debug, Clone, Default)]
pub struct NameContext {
    pub name: Option<String>,
    pub operation: Option<&'static str>,
}

impl NameContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_operation(mut self, operation: &'static str) -> Self {
        self.operation = Some(operation);
        self
    }
}

impl std::fmt::Display for NameContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(op) = self.operation {
            parts.push(op.to_string());
        }
        if let Some(ref name) = self.name {
            parts.push(format!("name {name:?}"));
        }
        if parts.is_empty() {
            write!(f, "(no context)")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Errors from encoding or decoding a filename.
#[derive(Error, Debug)]
pub enum NameError {
    /// The filename's MAC did not match on decode — either the wrong key,
    /// the wrong chain context (e.g. wrong parent directory), or tampered
    /// ciphertext.
    #[error("filename checksum mismatch for {context}")]
    ChecksumMismatch { context: NameContext },

    /// The base64 payload did not decode to a structurally valid wire
    /// format (too short to contain a MAC prefix, or bad padding in block
    /// mode).
    #[error("malformed encrypted filename for {context}")]
    Malformed { context: NameContext },

    /// The base64 alphabet rejected a character in the ciphertext name.
    #[error("invalid base64 in encrypted filename for {context}: {source}")]
    InvalidBase64 {
        #[source]
        source: crate::crypto::base64::Base64Error,
        context: NameContext,
    },

    /// An empty name was passed to the codec; EncFS names are always at
    /// least one plaintext byte.
    #[error("empty filename is not valid for {context}")]
    EmptyName { context: NameContext },
}

/// Assemble the 8-byte IV seed a filename's cipher pass uses: the MAC bytes
/// land at positions 6 and 7 of an otherwise-zero buffer, which is then
/// XORed with `chain_iv` (empty chain = XOR with zero = no-op).
fn file_iv_seed(chain_iv: &[u8], mac: u16) -> [u8; 8] {
    let mut seed = [0u8; 8];
    let mac_bytes = mac.to_be_bytes();
    seed[6] = mac_bytes[0];
    seed[7] = mac_bytes[1];
    for (slot, byte) in seed.iter_mut().zip(chain_iv.iter()) {
        *slot ^= *byte;
    }
    seed
}

fn pkcs_pad(data: &[u8]) -> Vec<u8> {
    let pad_len = BLOCK_SIZE - (data.len() % BLOCK_SIZE);
    let mut out = Vec::with_capacity(data.len() + pad_len);
    out.extend_from_slice(data);
    out.extend(std::iter::repeat_n(pad_len as u8, pad_len));
    out
}

fn pkcs_unpad(data: &[u8], context: &NameContext) -> Result<Vec<u8>, NameError> {
    let pad_len = match data.last() {
        Some(&b) => b as usize,
        None => {
            return Err(NameError::Malformed {
                context: context.clone(),
            })
        }
    };
    if pad_len == 0 || pad_len > data.len() {
        return Err(NameError::Malformed {
            context: context.clone(),
        });
    }
    let pad_start = data.len() - pad_len;
    if data[pad_start..].iter().any(|&b| usize::from(b) != pad_len) {
        return Err(NameError::Malformed {
            context: context.clone(),
        });
    }
    Ok(data[..pad_start].to_vec())
}

/// Encrypt a single plaintext path component.
///
/// `volume_iv` is the volume's base IV (fed into the stream/block codec's
/// IV derivation). `chain_iv` is the running chain state from
/// [`crate::crypto::mac::ChainState`] (empty for an unchained volume or the
/// first component of a chain). Returns the ciphertext name (custom-base64
/// encoded) and the chain state the next path component's encoding should
/// use.
pub fn encrypt_filename(
    name: &str,
    key: &AesKey,
    volume_iv: &[u8; IV_SIZE],
    chain_iv: &[u8],
    algorithm: FilenameAlgorithm,
) -> Result<(String, ChainState), NameError> {
    let context = NameContext::new().with_name(name).with_operation("encrypt_filename");
    if name.is_empty() {
        return Err(NameError::EmptyName { context });
    }

    if algorithm == FilenameAlgorithm::Null {
        return Ok((name.to_string(), ChainState::none()));
    }

    let name_bytes = name.as_bytes();
    let padded = match algorithm {
        FilenameAlgorithm::Block => pkcs_pad(name_bytes),
        FilenameAlgorithm::Stream => name_bytes.to_vec(),
        FilenameAlgorithm::Null => unreachable!("handled above"),
    };

    let (mac, chain) = mac16(key.as_bytes(), &padded, chain_iv);
    let seed = file_iv_seed(chain_iv, mac);

    let ciphertext = match algorithm {
        FilenameAlgorithm::Stream => stream_codec::stream_encrypt(key, volume_iv, &seed, &padded),
        FilenameAlgorithm::Block => block_codec::block_encrypt(key, volume_iv, &seed, &padded),
        FilenameAlgorithm::Null => unreachable!("handled above"),
    };

    let mut wire = Vec::with_capacity(MAC_PREFIX_LEN + ciphertext.len());
    wire.extend_from_slice(&mac.to_be_bytes());
    wire.extend_from_slice(&ciphertext);

    Ok((base64_encode(&wire), chain))
}

/// Decrypt a single ciphertext path component produced by [`encrypt_filename`].
pub fn decrypt_filename(
    encoded: &str,
    key: &AesKey,
    volume_iv: &[u8; IV_SIZE],
    chain_iv: &[u8],
    algorithm: FilenameAlgorithm,
) -> Result<(String, ChainState), NameError> {
    let context = NameContext::new().with_name(encoded).with_operation("decrypt_filename");

    if algorithm == FilenameAlgorithm::Null {
        if encoded.is_empty() {
            return Err(NameError::EmptyName { context });
        }
        return Ok((encoded.to_string(), ChainState::none()));
    }

    let wire = base64_decode(encoded).map_err(|source| NameError::InvalidBase64 {
        source,
        context: context.clone(),
    })?;
    if wire.len() < MAC_PREFIX_LEN {
        return Err(NameError::Malformed { context });
    }
    let mac_prefix = u16::from_be_bytes([wire[0], wire[1]]);
    let ciphertext = &wire[MAC_PREFIX_LEN..];
    let seed = file_iv_seed(chain_iv, mac_prefix);

    let padded = match algorithm {
        FilenameAlgorithm::Stream => stream_codec::stream_decrypt(key, volume_iv, &seed, ciphertext),
        FilenameAlgorithm::Block => {
            if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
                return Err(NameError::Malformed { context });
            }
            block_codec::block_decrypt(key, volume_iv, &seed, ciphertext)
        }
        FilenameAlgorithm::Null => unreachable!("handled above"),
    };

    let (recomputed_mac, chain) = mac16(key.as_bytes(), &padded, chain_iv);
    if recomputed_mac != mac_prefix {
        return Err(NameError::ChecksumMismatch { context });
    }

    let plaintext_bytes = match algorithm {
        FilenameAlgorithm::Block => pkcs_unpad(&padded, &context)?,
        FilenameAlgorithm::Stream => padded,
        FilenameAlgorithm::Null => unreachable!("handled above"),
    };

    let name = String::from_utf8(plaintext_bytes).map_err(|_| NameError::Malformed { context })?;
    Ok((name, chain))
}
