//! C10/C11: the file content codec.
//!
//! Content is encrypted block-at-a-time, independent of the filename codec
//! in [`super::name`] but built on the same primitives: every full block is
//! encrypted with the block codec (C5), the final, possibly-short block of
//! a file is always encrypted with the stream codec (C4) regardless of the
//! volume's primary mode, and each block's IV is derived from the file's
//! own 8-byte IV XORed with the block index (C3).
//!
//! The optional per-block header (`block_mac_bytes` MAC bytes followed by
//! `block_mac_rand_bytes` random bytes) is not a separate unencrypted
//! prefix: it is prepended to the plaintext data and the whole thing — the
//! header and the payload together — goes through a single cipher pass.
//! Decryption reverses this: decrypt the whole wire block, then split the
//! header back off and verify the MAC against the data that follows it.
//!
//! Hole handling: when `holes_allowed` is set and a full block's plaintext
//! is entirely zero, the block is written to the backing store as a
//! literal all-zero buffer of the normal wire size — no header, no cipher
//! pass. On read, a full block whose on-disk bytes are entirely zero is
//! recognised without attempting to decrypt it and yields a zero plaintext
//! block of the expected length; the block cipher is never invoked for it.

use std::io::{self, Read, Write};

use rand::RngCore;
use thiserror::Error;
use tracing::{instrument, trace};

use crate::crypto::iv::{block_iv_seed, IV_SIZE};
use crate::crypto::primitives::AesKey;
use crate::crypto::{block_codec, mac64, stream_codec};

/// 8-byte per-file IV header, present iff `use_unique_iv`.
pub const FILE_HEADER_LEN: usize = 8;

/// The subset of `VolumeConfig` the file codec needs, decoupled from the
/// `vault` module so `fs` has no dependency on it.
#[derive(Debug, Clone)]
pub struct FileCodecConfig {
    /// On-disk size of a full block, header included.
    pub ciphertext_block_size: u32,
    pub use_unique_iv: bool,
    pub holes_allowed: bool,
    pub block_mac_bytes: u32,
    pub block_mac_rand_bytes: u32,
    /// The volume's base IV, fed into every block's IV derivation.
    pub volume_iv: [u8; IV_SIZE],
    /// Whether a file's per-file IV header is seeded from its path's
    /// chained-name-IV chain state rather than from zero.
    pub external_iv_chaining: bool,
}

impl FileCodecConfig {
    fn header_overhead(&self) -> u32 {
        self.block_mac_bytes + self.block_mac_rand_bytes
    }

    /// Plaintext bytes carried by one full on-disk block.
    fn plaintext_chunk_size(&self) -> usize {
        (self.ciphertext_block_size - self.header_overhead()) as usize
    }
}

/// Ambient context for a file codec error.
#[derive(Debug, Clone, Default)]
pub struct FileContext {
    pub path: Option<String>,
    pub block_index: Option<u32>,
}

impl FileContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_block(mut self, block_index: u32) -> Self {
        self.block_index = Some(block_index);
        self
    }
}

impl std::fmt::Display for FileContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(ref path) = self.path {
            parts.push(format!("file {path:?}"));
        }
        if let Some(block) = self.block_index {
            parts.push(format!("block {block}"));
        }
        if parts.is_empty() {
            write!(f, "(no context)")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Errors decrypting file content.
#[derive(Error, Debug)]
pub enum FileDecryptionError {
    #[error("truncated file header for {context}")]
    TruncatedHeader { context: FileContext },

    #[error("truncated block for {context}")]
    TruncatedBlock { context: FileContext },

    #[error("block checksum mismatch for {context}")]
    ChecksumMismatch { context: FileContext },

    #[error("I/O error reading {context}: {source}")]
    Io {
        #[source]
        source: io::Error,
        context: FileContext,
    },
}

/// Errors encrypting file content.
#[derive(Error, Debug)]
pub enum FileEncryptionError {
    #[error("I/O error writing {context}: {source}")]
    Io {
        #[source]
        source: io::Error,
        context: FileContext,
    },
}

impl From<FileDecryptionError> for io::Error {
    fn from(err: FileDecryptionError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, err.to_string())
    }
}

impl From<FileEncryptionError> for io::Error {
    fn from(err: FileEncryptionError) -> Self {
        io::Error::new(io::ErrorKind::Other, err.to_string())
    }
}

/// Last `width` bytes of `mac64(key, data)`, reversed — the exact quirk
/// reference EncFS uses for a block's MAC header, both when writing it and
/// when comparing against it on read.
fn mac_trailer_reversed(key: &AesKey, data: &[u8], width: usize) -> Vec<u8> {
    let (mac, _) = mac64(key.as_bytes(), data, &[]);
    let full = mac.to_be_bytes();
    full[8 - width..].iter().rev().copied().collect()
}

fn encrypt_one_block(
    key: &AesKey,
    config: &FileCodecConfig,
    iv_seed: &[u8; 8],
    plaintext: &[u8],
    is_tail: bool,
    rng: &mut dyn RngCore,
) -> Vec<u8> {
    let mac_len = config.block_mac_bytes as usize;
    let rand_len = config.block_mac_rand_bytes as usize;
    let header_len = mac_len + rand_len;

    let is_hole = config.holes_allowed && !is_tail && plaintext.iter().all(|&b| b == 0);
    if is_hole {
        return vec![0u8; header_len + plaintext.len()];
    }

    let mut buf = vec![0u8; header_len + plaintext.len()];
    rng.fill_bytes(&mut buf[mac_len..header_len]);
    buf[header_len..].copy_from_slice(plaintext);
    if mac_len > 0 {
        let trailer = mac_trailer_reversed(key, &buf[header_len..], mac_len);
        buf[..mac_len].copy_from_slice(&trailer);
    }

    if is_tail {
        stream_codec::stream_encrypt(key, &config.volume_iv, iv_seed, &buf)
    } else {
        block_codec::block_encrypt(key, &config.volume_iv, iv_seed, &buf)
    }
}

fn decrypt_one_block(
    key: &AesKey,
    config: &FileCodecConfig,
    iv_seed: &[u8; 8],
    wire: &[u8],
    is_tail: bool,
    context: &FileContext,
) -> Result<Vec<u8>, FileDecryptionError> {
    let mac_len = config.block_mac_bytes as usize;
    let rand_len = config.block_mac_rand_bytes as usize;
    let header_len = mac_len + rand_len;

    if !is_tail && config.holes_allowed && wire.iter().all(|&b| b == 0) {
        let data_len = wire.len().saturating_sub(header_len);
        return Ok(vec![0u8; data_len]);
    }

    let buf = if is_tail {
        stream_codec::stream_decrypt(key, &config.volume_iv, iv_seed, wire)
    } else {
        if wire.len() % block_codec::BLOCK_SIZE != 0 {
            return Err(FileDecryptionError::TruncatedBlock {
                context: context.clone(),
            });
        }
        block_codec::block_decrypt(key, &config.volume_iv, iv_seed, wire)
    };

    if buf.len() < header_len {
        return Err(FileDecryptionError::TruncatedBlock {
            context: context.clone(),
        });
    }
    let data = &buf[header_len..];

    if mac_len > 0 {
        let expected = mac_trailer_reversed(key, data, mac_len);
        if expected != buf[..mac_len] {
            return Err(FileDecryptionError::ChecksumMismatch {
                context: context.clone(),
            });
        }
    }

    Ok(data.to_vec())
}

/// Worst-case (no holes materialized) ciphertext size for `plaintext_len`
/// bytes under `config`. A real encode is exactly this size whether or not
/// holes are present — holes change what's on disk, not how much.
pub fn ciphertext_size(plaintext_len: u64, config: &FileCodecConfig) -> u64 {
    let header = if config.use_unique_iv {
        FILE_HEADER_LEN as u64
    } else {
        0
    };
    if plaintext_len == 0 {
        return header;
    }
    let chunk = config.plaintext_chunk_size() as u64;
    let overhead = u64::from(config.header_overhead());
    let wire_block = u64::from(config.ciphertext_block_size);
    let full_blocks = plaintext_len / chunk;
    let remainder = plaintext_len % chunk;
    let mut total = header + full_blocks * wire_block;
    if remainder > 0 {
        total += remainder + overhead;
    }
    total
}

/// Inverse of [`ciphertext_size`].
pub fn plaintext_size(ciphertext_len: u64, config: &FileCodecConfig) -> u64 {
    let header = if config.use_unique_iv {
        FILE_HEADER_LEN as u64
    } else {
        0
    };
    let body = ciphertext_len.saturating_sub(header);
    if body == 0 {
        return 0;
    }
    let chunk = config.plaintext_chunk_size() as u64;
    let overhead = u64::from(config.header_overhead());
    let wire_block = u64::from(config.ciphertext_block_size);
    let full_blocks = body / wire_block;
    let remainder = body % wire_block;
    let mut total = full_blocks * chunk;
    if remainder > 0 {
        total += remainder - overhead;
    }
    total
}

/// Reads ciphertext from an inner `Read` and yields decrypted plaintext
/// through the standard [`Read`] trait, one block at a time.
pub struct FileInputStream<R: Read> {
    reader: R,
    key: AesKey,
    config: FileCodecConfig,
    file_iv: [u8; 8],
    block_index: u32,
    pending: Vec<u8>,
    pending_pos: usize,
    finished: bool,
    context: FileContext,
}

impl<R: Read> FileInputStream<R> {
    /// Open a file input stream, decrypting the per-file header (if
    /// present) to recover `file_iv`. `chain_iv` is the path's chained-name
    /// IV chain state, used to seed the header decryption when
    /// `external_iv_chaining` is set.
    #[instrument(skip(reader, key, config))]
    pub fn new(
        mut reader: R,
        key: AesKey,
        config: FileCodecConfig,
        chain_iv: [u8; 8],
        context: FileContext,
    ) -> Result<Self, FileDecryptionError> {
        let init_iv_seed = if config.external_iv_chaining { chain_iv } else { [0u8; 8] };

        let file_iv = if config.use_unique_iv {
            let mut header = [0u8; FILE_HEADER_LEN];
            reader
                .read_exact(&mut header)
                .map_err(|_| FileDecryptionError::TruncatedHeader {
                    context: context.clone(),
                })?;
            let decrypted = stream_codec::stream_decrypt(&key, &config.volume_iv, &init_iv_seed, &header);
            let mut iv = [0u8; 8];
            iv.copy_from_slice(&decrypted);
            iv
        } else {
            [0u8; 8]
        };

        trace!(use_unique_iv = config.use_unique_iv, "opened file input stream");

        Ok(Self {
            reader,
            key,
            config,
            file_iv,
            block_index: 0,
            pending: Vec::new(),
            pending_pos: 0,
            finished: false,
            context,
        })
    }

    fn fill_next_block(&mut self) -> io::Result<bool> {
        if self.finished {
            return Ok(false);
        }
        let wire_len = self.config.ciphertext_block_size as usize;

        let mut wire = vec![0u8; wire_len];
        let read = read_up_to(&mut self.reader, &mut wire)?;
        if read == 0 {
            self.finished = true;
            return Ok(false);
        }
        let is_tail = read < wire_len;
        wire.truncate(read);

        let iv_seed = block_iv_seed(&self.file_iv, self.block_index);
        let context = self.context.clone().with_block(self.block_index);
        let plaintext = decrypt_one_block(&self.key, &self.config, &iv_seed, &wire, is_tail, &context)?;

        self.pending = plaintext;
        self.pending_pos = 0;
        self.block_index = self.block_index.wrapping_add(1);
        if is_tail {
            self.finished = true;
        }
        Ok(true)
    }
}

fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..])? {
            0 => break,
            n => total += n,
        }
    }
    Ok(total)
}

impl<R: Read> Read for FileInputStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending_pos >= self.pending.len() && !self.fill_next_block()? {
            return Ok(0);
        }
        let available = &self.pending[self.pending_pos..];
        let to_copy = available.len().min(buf.len());
        buf[..to_copy].copy_from_slice(&available[..to_copy]);
        self.pending_pos += to_copy;
        Ok(to_copy)
    }
}

/// Encrypts plaintext written through the standard [`Write`] trait and
/// emits ciphertext to an inner `Write`, one block at a time.
pub struct FileOutputStream<W: Write, Rng: RngCore> {
    writer: W,
    key: AesKey,
    config: FileCodecConfig,
    file_iv: [u8; 8],
    block_index: u32,
    buffer: Vec<u8>,
    rng: Rng,
    context: FileContext,
}

impl<W: Write, Rng: RngCore> FileOutputStream<W, Rng> {
    /// Open a file output stream, generating a fresh random `file_iv` (via
    /// `rng`) and writing its encrypted header (if `use_unique_iv`).
    /// `chain_iv` is the path's chained-name IV chain state, used to seed
    /// the header encryption when `external_iv_chaining` is set.
    #[instrument(skip(writer, key, config, rng))]
    pub fn new(
        mut writer: W,
        key: AesKey,
        config: FileCodecConfig,
        mut rng: Rng,
        chain_iv: [u8; 8],
        context: FileContext,
    ) -> Result<Self, FileEncryptionError> {
        let init_iv_seed = if config.external_iv_chaining { chain_iv } else { [0u8; 8] };

        let mut file_iv = [0u8; 8];
        if config.use_unique_iv {
            rng.fill_bytes(&mut file_iv);
            let header_cipher = stream_codec::stream_encrypt(&key, &config.volume_iv, &init_iv_seed, &file_iv);
            writer
                .write_all(&header_cipher)
                .map_err(|source| FileEncryptionError::Io {
                    source,
                    context: context.clone(),
                })?;
        }

        Ok(Self {
            writer,
            key,
            config,
            file_iv,
            block_index: 0,
            buffer: Vec::new(),
            rng,
            context,
        })
    }

    fn flush_full_blocks(&mut self) -> io::Result<()> {
        let chunk = self.config.plaintext_chunk_size();
        while self.buffer.len() >= chunk {
            let block: Vec<u8> = self.buffer.drain(..chunk).collect();
            self.emit_block(&block, false)?;
        }
        Ok(())
    }

    fn emit_block(&mut self, plaintext: &[u8], is_tail: bool) -> io::Result<()> {
        let iv_seed = block_iv_seed(&self.file_iv, self.block_index);
        let wire = encrypt_one_block(&self.key, &self.config, &iv_seed, plaintext, is_tail, &mut self.rng);
        self.writer
            .write_all(&wire)
            .map_err(|source| FileEncryptionError::Io {
                source,
                context: self.context.clone().with_block(self.block_index),
            })?;
        self.block_index = self.block_index.wrapping_add(1);
        Ok(())
    }

    /// Flush any buffered partial final block and finish the stream,
    /// returning the inner writer.
    #[instrument(skip(self))]
    pub fn finish(mut self) -> Result<W, FileEncryptionError> {
        if !self.buffer.is_empty() {
            let tail: Vec<u8> = std::mem::take(&mut self.buffer);
            self.emit_block(&tail, true)
                .map_err(|source| FileEncryptionError::Io {
                    source,
                    context: self.context.clone(),
                })?;
        } else if self.block_index == 0 {
            // Zero-length plaintext: no blocks, header (if any) already
            // written by `new`.
            trace!("finishing zero-length file output stream");
        }
        Ok(self.writer)
    }
}

impl<W: Write, Rng: RngCore> Write for FileOutputStream<W, Rng> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        self.flush_full_blocks()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
