//! Crate-wide error taxonomy.
//!
//! Every fallible entry point in this crate returns [`EncFsError`]. The
//! lower-level modules (`crypto`, `fs`, `vault`) define their own narrower
//! error enums internally but convert into `EncFsError` at the module
//! boundary, so callers only ever deal with one type.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by any `encfs-core` operation.
#[derive(Error, Debug)]
pub enum EncFsError {
    /// The volume configuration is internally inconsistent (e.g.
    /// `external_iv_chaining` set without `chained_name_iv`).
    #[error("invalid volume configuration: {0}")]
    InvalidConfig(String),

    /// The volume uses a feature or format version this crate does not
    /// implement (e.g. a pre-v6 `.encfs*` config).
    #[error("unsupported volume format: {0}")]
    Unsupported(String),

    /// The supplied password did not unwrap the volume key. Reference
    /// EncFS cannot distinguish a wrong password from a corrupt key file
    /// (both manifest as a checksum mismatch), so neither can this crate.
    #[error("incorrect password or corrupt volume key")]
    InvalidPassword,

    /// Ciphertext failed to decode into valid plaintext: a MAC mismatch,
    /// a truncated block, or a structurally invalid header.
    #[error("corrupt data: {0}")]
    CorruptData(String),

    /// A filename's MAC did not match during decode. A subclass of
    /// `CorruptData` specific to the filename codec: recoverable (skip
    /// the entry) in `list()`, fatal in `file()`/`open_read`/`open_write`.
    #[error("checksum mismatch decoding filename at {path}")]
    ChecksumMismatch {
        /// Ciphertext path where the mismatch was found.
        path: String,
    },

    /// The requested path does not exist in the volume.
    #[error("not found: {0}")]
    NotFound(String),

    /// The backing store reported an I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EncFsError {
    /// Build a [`EncFsError::ChecksumMismatch`] for the given ciphertext
    /// path.
    pub fn checksum_mismatch(path: impl Into<String>) -> Self {
        EncFsError::ChecksumMismatch { path: path.into() }
    }
}

/// Ambient context attached to an error for richer diagnostics, following
/// the same `with_*` builder + `Display` pattern used throughout this
/// crate's lower-level error types.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    pub path: Option<PathBuf>,
    pub block_number: Option<u64>,
    pub operation: Option<&'static str>,
}

impl OpContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_block(mut self, block_number: u64) -> Self {
        self.block_number = Some(block_number);
        self
    }

    pub fn with_operation(mut self, operation: &'static str) -> Self {
        self.operation = Some(operation);
        self
    }
}

impl fmt::Display for OpContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(op) = self.operation {
            parts.push(op.to_string());
        }
        if let Some(ref path) = self.path {
            parts.push(format!("at {:?}", path.display()));
        }
        if let Some(block) = self.block_number {
            parts.push(format!("block {block}"));
        }
        if parts.is_empty() {
            write!(f, "(no context)")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

// Re-export the narrower error types so callers that want detail beyond
// the flattened `EncFsError` can match on them directly.
pub use crate::crypto::mac::MacError;
pub use crate::fs::file::{FileDecryptionError, FileEncryptionError};
pub use crate::fs::name::NameError;
pub use crate::vault::key::KeyUnwrapError;
