//! C12: `Volume`, the public entry point composing C1–C11 behind a small
//! CRUD-ish API over a caller-supplied [`BackingStore`].

use rand::RngCore;
use tracing::{instrument, warn};

use crate::crypto::iv::IV_SIZE;
use crate::crypto::primitives::AesKey;
use crate::crypto::ChainState;
use crate::error::EncFsError;
use crate::fs::file::{FileCodecConfig, FileInputStream, FileOutputStream};
use crate::fs::name;
use crate::fs::path;
use crate::vault::backing_store::BackingStore;
use crate::vault::config::VolumeConfig;
use crate::vault::key;

/// Either a raw password (the volume's PBKDF2 step runs fresh) or an
/// already-derived key (letting a caller cache the expensive KDF step
/// across repeated opens of the same volume).
pub enum PasswordOrKey {
    Password(String),
    DerivedKey { volume_key: AesKey, volume_iv: [u8; IV_SIZE] },
}

/// Plaintext-facing metadata about a single volume entry.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: String,
    pub encrypted_path: String,
    pub is_dir: bool,
    pub plaintext_len: Option<u64>,
}

/// A single decoded entry returned by [`Volume::list`].
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

pub struct Volume<B: BackingStore> {
    volume_key: AesKey,
    volume_iv: [u8; IV_SIZE],
    config: VolumeConfig,
    backing_store: B,
}

impl<B: BackingStore> Volume<B> {
    /// Open an existing volume, recovering `volume_key`/`volume_iv` from
    /// `credential` against `config`.
    #[instrument(skip(backing_store, config, credential))]
    pub fn open(backing_store: B, config: VolumeConfig, credential: PasswordOrKey) -> Result<Self, EncFsError> {
        config
            .validate()
            .map_err(|err| EncFsError::InvalidConfig(err.to_string()))?;

        let (volume_key, volume_iv) = match credential {
            PasswordOrKey::Password(password) => {
                let material = key::unwrap_volume_key(
                    password.as_bytes(),
                    &config.salt,
                    config.pbkdf2_iterations,
                    config.volume_key_size_bytes(),
                    &config.wrapped_volume_key,
                )
                .map_err(|_| EncFsError::InvalidPassword)?;
                (material.volume_key, material.volume_iv)
            }
            PasswordOrKey::DerivedKey { volume_key, volume_iv } => (volume_key, volume_iv),
        };

        Ok(Self {
            volume_key,
            volume_iv,
            config,
            backing_store,
        })
    }

    /// Create a new volume: generate a fresh volume key, wrap it under
    /// `password`, and populate `config`'s key-material fields.
    #[instrument(skip(backing_store, config, password, rng))]
    pub fn create(
        backing_store: B,
        mut config: VolumeConfig,
        password: &str,
        rng: &mut dyn RngCore,
    ) -> Result<Self, EncFsError> {
        let key_size_bytes = config.volume_key_size_bytes();
        let salt_len = if config.salt_length_bytes > 0 {
            config.salt_length_bytes as usize
        } else {
            20
        };

        let (wrapped, salt, material) =
            key::wrap_new_volume_key(password.as_bytes(), config.pbkdf2_iterations, key_size_bytes, salt_len, rng);

        config.salt = salt;
        config.salt_length_bytes = config.salt.len() as u32;
        config.wrapped_volume_key = wrapped;
        config.wrapped_key_length_bytes = config.wrapped_volume_key.len() as u32;
        config
            .validate()
            .map_err(|err| EncFsError::InvalidConfig(err.to_string()))?;

        if !backing_store.exists("/")? {
            backing_store.mkdirs("/")?;
        }

        Ok(Self {
            volume_key: material.volume_key,
            volume_iv: material.volume_iv,
            config,
            backing_store,
        })
    }

    fn file_codec_config(&self) -> FileCodecConfig {
        FileCodecConfig {
            ciphertext_block_size: self.config.encrypted_block_size_bytes,
            use_unique_iv: self.config.use_unique_iv,
            holes_allowed: self.config.holes_allowed,
            block_mac_bytes: self.config.block_mac_bytes,
            block_mac_rand_bytes: self.config.block_mac_rand_bytes,
            volume_iv: self.volume_iv,
            external_iv_chaining: self.config.external_iv_chaining,
        }
    }

    fn encode_path(&self, plaintext_path: &str) -> Result<String, EncFsError> {
        path::encode_path(
            plaintext_path,
            &self.volume_key,
            &self.volume_iv,
            self.config.filename_algorithm,
            self.config.chained_name_iv,
        )
        .map_err(|err| EncFsError::CorruptData(err.to_string()))
    }

    #[allow(dead_code)]
    fn decode_path(&self, encrypted_path: &str) -> Result<String, EncFsError> {
        path::decode_path(
            encrypted_path,
            &self.volume_key,
            &self.volume_iv,
            self.config.filename_algorithm,
            self.config.chained_name_iv,
        )
        .map_err(|_| EncFsError::checksum_mismatch(encrypted_path))
    }

    /// Chain state a file directly inside `parent_dir` should use for its
    /// header IV when `external_iv_chaining` is set.
    fn chain_iv_for_parent(&self, parent_dir: &str) -> Result<[u8; 8], EncFsError> {
        if !self.config.external_iv_chaining {
            return Ok([0u8; 8]);
        }
        let chain = path::chain_state_for_dir(
            parent_dir,
            &self.volume_key,
            &self.volume_iv,
            self.config.filename_algorithm,
            self.config.chained_name_iv,
        )
        .map_err(|err| EncFsError::CorruptData(err.to_string()))?;
        Ok(chain_bytes(&chain))
    }

    fn encode_root_relative(&self, plaintext_path: &str) -> Result<String, EncFsError> {
        if plaintext_path.is_empty() || plaintext_path == "/" {
            Ok("/".to_string())
        } else {
            self.encode_path(plaintext_path)
        }
    }

    /// Look up a single plaintext path's metadata.
    pub fn file(&self, plaintext_path: &str) -> Result<FileInfo, EncFsError> {
        let encrypted = self.encode_root_relative(plaintext_path)?;
        if !self.backing_store.exists(&encrypted)? {
            return Err(EncFsError::NotFound(plaintext_path.to_string()));
        }
        let meta = self.backing_store.stat(&encrypted)?;
        let plaintext_len = if meta.is_dir {
            None
        } else {
            Some(crate::fs::file::plaintext_size(meta.len, &self.file_codec_config()))
        };

        Ok(FileInfo {
            path: plaintext_path.to_string(),
            encrypted_path: encrypted,
            is_dir: meta.is_dir,
            plaintext_len,
        })
    }

    /// List the plaintext-decoded contents of `dir`. Entries whose
    /// ciphertext name fails to decrypt are skipped with a `tracing::warn!`
    /// rather than aborting the whole listing (SPEC_FULL.md §7).
    pub fn list(&self, dir: &str) -> Result<Vec<DirEntry>, EncFsError> {
        let encrypted_dir = self.encode_root_relative(dir)?;
        let chain = path::chain_state_for_dir(
            dir,
            &self.volume_key,
            &self.volume_iv,
            self.config.filename_algorithm,
            self.config.chained_name_iv,
        )
        .map_err(|err| EncFsError::CorruptData(err.to_string()))?;
        let chain_iv = if self.config.chained_name_iv {
            chain.as_bytes()
        } else {
            &[][..]
        };

        let mut entries = Vec::new();
        for encrypted_name in self.backing_store.list(&encrypted_dir)? {
            match name::decrypt_filename(
                &encrypted_name,
                &self.volume_key,
                &self.volume_iv,
                chain_iv,
                self.config.filename_algorithm,
            ) {
                Ok((plain_name, _)) => {
                    let child_path = format!("{}/{encrypted_name}", encrypted_dir.trim_end_matches('/'));
                    let is_dir = self.backing_store.is_dir(&child_path).unwrap_or(false);
                    entries.push(DirEntry {
                        name: plain_name,
                        is_dir,
                    });
                }
                Err(err) => {
                    warn!(entry = %encrypted_name, error = %err, "skipping undecryptable directory entry");
                }
            }
        }
        Ok(entries)
    }

    pub fn make_dir(&self, plaintext_path: &str) -> Result<bool, EncFsError> {
        let encrypted = self.encode_path(plaintext_path)?;
        self.backing_store.mkdir(&encrypted)?;
        Ok(true)
    }

    pub fn make_dirs(&self, plaintext_path: &str) -> Result<bool, EncFsError> {
        let encrypted = self.encode_path(plaintext_path)?;
        self.backing_store.mkdirs(&encrypted)?;
        Ok(true)
    }

    /// Delete `plaintext_path`. `recursive` is required to remove a
    /// non-empty directory; a non-recursive delete of a non-empty directory
    /// fails with `Unsupported` rather than silently orphaning children.
    pub fn delete(&self, plaintext_path: &str, recursive: bool) -> Result<bool, EncFsError> {
        let encrypted = self.encode_path(plaintext_path)?;
        if self.backing_store.is_dir(&encrypted).unwrap_or(false) {
            let children = self.list(plaintext_path)?;
            if !children.is_empty() {
                if !recursive {
                    return Err(EncFsError::Unsupported(format!(
                        "{plaintext_path} is not empty; pass recursive=true to delete its contents"
                    )));
                }
                for child in children {
                    let child_path = join_path(plaintext_path, &child.name);
                    self.delete(&child_path, true)?;
                }
            }
        }
        self.backing_store.delete(&encrypted)?;
        Ok(true)
    }

    /// Copy `from` to `to`. Directories are copied recursively whenever
    /// `chained_name_iv` or `external_iv_chaining` is set (descendant
    /// ciphertext names and, under `external_iv_chaining`, file content
    /// itself depend on the cleartext path); otherwise a flat backing-store
    /// copy suffices (SPEC_FULL.md §6, C12 move/copy semantics).
    pub fn copy(&self, from: &str, to: &str) -> Result<bool, EncFsError> {
        self.copy_or_move(from, to, false)
    }

    /// Rename/move `from` to `to`, with the same recursive-rewrite strategy
    /// as [`Volume::copy`].
    pub fn move_entry(&self, from: &str, to: &str) -> Result<bool, EncFsError> {
        self.copy_or_move(from, to, true)
    }

    fn copy_or_move(&self, from: &str, to: &str, is_move: bool) -> Result<bool, EncFsError> {
        let encrypted_from = self.encode_path(from)?;
        let encrypted_to = self.encode_path(to)?;
        let needs_name_rewrite = self.config.chained_name_iv || self.config.external_iv_chaining;
        let is_dir = self.backing_store.is_dir(&encrypted_from)?;

        if is_dir {
            if needs_name_rewrite {
                self.backing_store.mkdirs(&encrypted_to)?;
                for child in self.list(from)? {
                    let child_from = join_path(from, &child.name);
                    let child_to = join_path(to, &child.name);
                    self.copy_or_move(&child_from, &child_to, is_move)?;
                }
                if is_move {
                    self.backing_store.delete(&encrypted_from)?;
                }
            } else if is_move {
                self.backing_store.move_entry(&encrypted_from, &encrypted_to)?;
            } else {
                self.backing_store.copy_entry(&encrypted_from, &encrypted_to)?;
            }
            return Ok(true);
        }

        if self.config.external_iv_chaining {
            // Content's file IV is seeded from the path's chain state, so a
            // copy to a new parent must decrypt-then-re-encrypt rather than
            // move ciphertext bytes verbatim.
            self.reencrypt_file(from, to)?;
            if is_move {
                self.backing_store.delete(&encrypted_from)?;
            }
        } else if is_move {
            self.backing_store.move_entry(&encrypted_from, &encrypted_to)?;
        } else {
            self.backing_store.copy_entry(&encrypted_from, &encrypted_to)?;
        }
        Ok(true)
    }

    fn reencrypt_file(&self, from: &str, to: &str) -> Result<(), EncFsError> {
        let mut reader = self.open_read(from)?;
        let mut writer = self.open_write(to, rand::rng())?;
        std::io::copy(&mut reader, &mut writer)?;
        writer.finish().map_err(|err| EncFsError::CorruptData(err.to_string()))?;
        Ok(())
    }

    /// Open a plaintext read stream for `plaintext_path`.
    pub fn open_read(&self, plaintext_path: &str) -> Result<FileInputStream<Box<dyn std::io::Read>>, EncFsError> {
        let encrypted = self.encode_path(plaintext_path)?;
        let reader = self.backing_store.open_read(&encrypted)?;
        let chain_iv = self.chain_iv_for_parent(parent_dir(plaintext_path))?;
        FileInputStream::new(
            reader,
            self.volume_key.clone(),
            self.file_codec_config(),
            chain_iv,
            crate::fs::file::FileContext::new().with_path(plaintext_path.to_string()),
        )
        .map_err(|err| EncFsError::CorruptData(err.to_string()))
    }

    /// Open a plaintext write stream for `plaintext_path`, creating the
    /// ciphertext entry. Callers must call
    /// [`FileOutputStream::finish`] to flush the final (possibly short)
    /// block.
    pub fn open_write<Rng: RngCore>(
        &self,
        plaintext_path: &str,
        rng: Rng,
    ) -> Result<FileOutputStream<Box<dyn std::io::Write>, Rng>, EncFsError> {
        let encrypted = self.encode_path(plaintext_path)?;
        let writer = self.backing_store.create_file(&encrypted)?;
        let chain_iv = self.chain_iv_for_parent(parent_dir(plaintext_path))?;
        FileOutputStream::new(
            writer,
            self.volume_key.clone(),
            self.file_codec_config(),
            rng,
            chain_iv,
            crate::fs::file::FileContext::new().with_path(plaintext_path.to_string()),
        )
        .map_err(|err| EncFsError::CorruptData(err.to_string()))
    }

    /// Plaintext size of an existing file, without opening a read stream.
    pub fn plaintext_size(&self, plaintext_path: &str) -> Result<u64, EncFsError> {
        let info = self.file(plaintext_path)?;
        info.plaintext_len
            .ok_or_else(|| EncFsError::InvalidConfig(format!("{plaintext_path} is a directory")))
    }

    /// Worst-case ciphertext size for a file of `plaintext_size` bytes
    /// under this volume's configuration.
    pub fn ciphertext_size(&self, plaintext_size: u64) -> u64 {
        crate::fs::file::ciphertext_size(plaintext_size, &self.file_codec_config())
    }
}

/// `ChainState`'s 8 chain bytes, or all-zero when not chaining.
fn chain_bytes(chain: &ChainState) -> [u8; 8] {
    let mut out = [0u8; 8];
    let bytes = chain.as_bytes();
    out[..bytes.len()].copy_from_slice(bytes);
    out
}

/// The plaintext parent directory of `path` ("" for a top-level entry).
fn parent_dir(path: &str) -> &str {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[..idx],
        None => "",
    }
}

/// Join a plaintext directory and a single child name into a plaintext path.
fn join_path(dir: &str, child: &str) -> String {
    if dir.is_empty() || dir == "/" {
        child.to_string()
    } else {
        format!("{}/{child}", dir.trim_end_matches('/'))
    }
}
