//! The `BackingStore` contract (SPEC_FULL.md §5).
//!
//! `encfs-core` never touches a filesystem, network socket, or any other
//! storage medium directly; every `Volume` is generic over a caller-supplied
//! `BackingStore` implementation. All paths crossing this boundary are
//! ciphertext, custom-base64 encoded (C6), and `/`-rooted.

use std::io::{Read, Write};

use crate::error::EncFsError;

/// Metadata about a single backing-store entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub is_dir: bool,
    pub len: u64,
}

/// The storage abstraction a `Volume` is generic over.
///
/// Implementations back this with a local filesystem, an in-memory map (for
/// tests), a network store, or anything else that can satisfy these
/// operations. `encfs-core` assumes single-threaded, serialized access to
/// one `BackingStore` per `Volume` (see SPEC_FULL.md §4).
pub trait BackingStore {
    fn is_dir(&self, path: &str) -> Result<bool, EncFsError>;
    fn exists(&self, path: &str) -> Result<bool, EncFsError>;
    fn stat(&self, path: &str) -> Result<Metadata, EncFsError>;
    fn list(&self, path: &str) -> Result<Vec<String>, EncFsError>;
    fn mkdir(&self, path: &str) -> Result<(), EncFsError>;
    fn mkdirs(&self, path: &str) -> Result<(), EncFsError>;
    fn delete(&self, path: &str) -> Result<(), EncFsError>;
    fn move_entry(&self, from: &str, to: &str) -> Result<(), EncFsError>;
    fn copy_entry(&self, from: &str, to: &str) -> Result<(), EncFsError>;
    fn create_file(&self, path: &str) -> Result<Box<dyn Write>, EncFsError>;
    fn open_read(&self, path: &str) -> Result<Box<dyn Read>, EncFsError>;
    fn open_write(&self, path: &str) -> Result<Box<dyn Write>, EncFsError>;
    fn root_path(&self) -> &str;
}
