//! End-to-end coverage of [`encfs_core::vault::Volume`] against an
//! in-memory [`BackingStore`], exercising SPEC_FULL.md §8's testable
//! properties and concrete scenarios (S1, S5, S6, S7).

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read, Write};
use std::rc::Rc;

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use encfs_core::vault::{BackingStore, Metadata, PasswordOrKey, Volume, VolumeConfig};
use encfs_core::EncFsError;

#[derive(Clone, Default)]
struct MemoryStore {
    files: Rc<RefCell<HashMap<String, Vec<u8>>>>,
    dirs: Rc<RefCell<HashSet<String>>>,
}

struct SharedWriter {
    path: String,
    files: Rc<RefCell<HashMap<String, Vec<u8>>>>,
}

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.files.borrow_mut().entry(self.path.clone()).or_default().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl MemoryStore {
    /// True if some file or explicit directory lives strictly under `path`,
    /// i.e. `path` is an implicit directory (never `mkdir`'d, but a prefix
    /// of some other entry) — the common case for a path a caller writes a
    /// file into without first creating its parent.
    fn has_descendant(&self, path: &str) -> bool {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        self.files.borrow().keys().chain(self.dirs.borrow().iter()).any(|p| p.starts_with(&prefix))
    }
}

impl BackingStore for MemoryStore {
    fn is_dir(&self, path: &str) -> Result<bool, EncFsError> {
        Ok(path == "/" || self.dirs.borrow().contains(path) || self.has_descendant(path))
    }

    fn exists(&self, path: &str) -> Result<bool, EncFsError> {
        Ok(path == "/"
            || self.files.borrow().contains_key(path)
            || self.dirs.borrow().contains(path)
            || self.has_descendant(path))
    }

    fn stat(&self, path: &str) -> Result<Metadata, EncFsError> {
        if let Some(data) = self.files.borrow().get(path) {
            Ok(Metadata {
                is_dir: false,
                len: data.len() as u64,
            })
        } else {
            Ok(Metadata { is_dir: true, len: 0 })
        }
    }

    fn list(&self, path: &str) -> Result<Vec<String>, EncFsError> {
        let prefix = if path == "/" { String::new() } else { format!("{path}/") };
        let mut names: Vec<String> = self
            .files
            .borrow()
            .keys()
            .chain(self.dirs.borrow().iter())
            .filter_map(|full| {
                full.strip_prefix(&prefix)
                    .filter(|rest| !rest.is_empty() && !rest.contains('/'))
                    .map(ToString::to_string)
            })
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn mkdir(&self, path: &str) -> Result<(), EncFsError> {
        self.dirs.borrow_mut().insert(path.to_string());
        Ok(())
    }

    fn mkdirs(&self, path: &str) -> Result<(), EncFsError> {
        self.mkdir(path)
    }

    fn delete(&self, path: &str) -> Result<(), EncFsError> {
        self.files.borrow_mut().remove(path);
        self.dirs.borrow_mut().remove(path);
        Ok(())
    }

    fn move_entry(&self, from: &str, to: &str) -> Result<(), EncFsError> {
        if let Some(data) = self.files.borrow_mut().remove(from) {
            self.files.borrow_mut().insert(to.to_string(), data);
        }
        Ok(())
    }

    fn copy_entry(&self, from: &str, to: &str) -> Result<(), EncFsError> {
        if let Some(data) = self.files.borrow().get(from).cloned() {
            self.files.borrow_mut().insert(to.to_string(), data);
        }
        Ok(())
    }

    fn create_file(&self, path: &str) -> Result<Box<dyn Write>, EncFsError> {
        self.files.borrow_mut().insert(path.to_string(), Vec::new());
        Ok(Box::new(SharedWriter {
            path: path.to_string(),
            files: Rc::clone(&self.files),
        }))
    }

    fn open_read(&self, path: &str) -> Result<Box<dyn Read>, EncFsError> {
        let data = self.files.borrow().get(path).cloned().unwrap_or_default();
        Ok(Box::new(Cursor::new(data)))
    }

    fn open_write(&self, path: &str) -> Result<Box<dyn Write>, EncFsError> {
        self.create_file(path)
    }

    fn root_path(&self) -> &str {
        "/"
    }
}

fn config_s1() -> VolumeConfig {
    VolumeConfig {
        volume_key_size_bits: 192,
        encrypted_block_size_bytes: 1024,
        use_unique_iv: true,
        chained_name_iv: true,
        external_iv_chaining: false,
        holes_allowed: false,
        block_mac_bytes: 0,
        block_mac_rand_bytes: 0,
        pbkdf2_iterations: 5000,
        filename_algorithm: encfs_core::fs::FilenameAlgorithm::Block,
        ..VolumeConfig::default()
    }
}

/// Create a volume and hand back a second handle onto the same backing
/// store (the `Rc<RefCell<_>>` fields make this a shared-state clone, not
/// an independent copy) so tests can inspect on-disk bytes directly.
fn create_volume(config: VolumeConfig, password: &str, seed: u64) -> (Volume<MemoryStore>, MemoryStore) {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let store = MemoryStore::default();
    let handle = store.clone();
    let volume = Volume::create(store, config, password, &mut rng).unwrap();
    (volume, handle)
}

#[test]
fn s1_wrong_password_is_rejected_against_persisted_config() {
    let mut rng = ChaCha20Rng::seed_from_u64(1);
    let mut config = config_s1();
    let (wrapped, salt, material) = encfs_core::vault::wrap_new_volume_key(
        b"encfs",
        config.pbkdf2_iterations,
        config.volume_key_size_bytes(),
        20,
        &mut rng,
    );
    config.salt = salt;
    config.salt_length_bytes = config.salt.len() as u32;
    config.wrapped_volume_key = wrapped;
    config.wrapped_key_length_bytes = config.wrapped_volume_key.len() as u32;

    assert_eq!(material.volume_key.bits(), 192);

    let opened = Volume::open(MemoryStore::default(), config.clone(), PasswordOrKey::Password("encfs".to_string()));
    assert!(opened.is_ok());

    let rejected = Volume::open(MemoryStore::default(), config, PasswordOrKey::Password("wrong".to_string()));
    assert!(matches!(rejected, Err(EncFsError::InvalidPassword)));
}

#[test]
fn wrong_password_against_freshly_created_config_is_rejected() {
    let mut rng = ChaCha20Rng::seed_from_u64(2);
    let mut config = config_s1();
    let (wrapped, salt, _material) = encfs_core::vault::wrap_new_volume_key(
        b"encfs",
        config.pbkdf2_iterations,
        config.volume_key_size_bytes(),
        20,
        &mut rng,
    );
    config.salt = salt;
    config.salt_length_bytes = config.salt.len() as u32;
    config.wrapped_volume_key = wrapped;
    config.wrapped_key_length_bytes = config.wrapped_volume_key.len() as u32;

    let opened = Volume::open(MemoryStore::default(), config.clone(), PasswordOrKey::Password("encfs".to_string()));
    assert!(opened.is_ok());

    let rejected = Volume::open(MemoryStore::default(), config, PasswordOrKey::Password("wrong".to_string()));
    assert!(matches!(rejected, Err(EncFsError::InvalidPassword)));
}

#[test]
fn file_round_trips_through_volume() {
    let (volume, _store) = create_volume(config_s1(), "encfs", 3);
    let rng = ChaCha20Rng::seed_from_u64(30);
    let plaintext = b"the quick brown fox jumps over the lazy dog".to_vec();

    let mut writer = volume.open_write("docs/note.txt", rng).unwrap();
    writer.write_all(&plaintext).unwrap();
    writer.finish().unwrap();

    let mut reader = volume.open_read("docs/note.txt").unwrap();
    let mut decrypted = Vec::new();
    reader.read_to_end(&mut decrypted).unwrap();
    assert_eq!(decrypted, plaintext);
}

#[test]
fn s7_path_fan_out_is_independently_decodable() {
    let (volume, _store) = create_volume(config_s1(), "encfs", 4);
    let rng = ChaCha20Rng::seed_from_u64(40);

    let mut writer = volume.open_write("foo/bar/baz.txt", rng).unwrap();
    writer.write_all(b"payload").unwrap();
    writer.finish().unwrap();

    let info = volume.file("foo/bar/baz.txt").unwrap();
    assert_eq!(info.encrypted_path.matches('/').count(), 2);
    assert!(!info.is_dir);
}

#[test]
fn s6_hole_blocks_are_stored_as_literal_zero_and_round_trip() {
    let config = VolumeConfig {
        holes_allowed: true,
        encrypted_block_size_bytes: 1024,
        ..config_s1()
    };
    let (volume, store) = create_volume(config, "encfs", 6);
    let rng = ChaCha20Rng::seed_from_u64(60);

    let mut plaintext = vec![0u8; 2048];
    plaintext.extend(vec![0x99u8; 16]);

    let mut writer = volume.open_write("sparse.bin", rng).unwrap();
    writer.write_all(&plaintext).unwrap();
    writer.finish().unwrap();

    let info = volume.file("sparse.bin").unwrap();
    let on_disk = store.files.borrow().get(&info.encrypted_path).cloned().unwrap();

    // header(8) + 2 full hole blocks (1024 each, literal zero) + tail
    // (16 bytes of data, no header overhead since block_mac_bytes=0).
    assert_eq!(on_disk.len(), 8 + 1024 + 1024 + 16);
    assert_eq!(on_disk.len() as u64, volume.ciphertext_size(plaintext.len() as u64));
    assert!(on_disk[8..8 + 2048].iter().all(|&b| b == 0));

    let mut reader = volume.open_read("sparse.bin").unwrap();
    let mut decrypted = Vec::new();
    reader.read_to_end(&mut decrypted).unwrap();
    assert_eq!(decrypted, plaintext);
}

#[test]
fn s5_block_mac_and_rand_overhead_size_arithmetic() {
    let config = VolumeConfig {
        block_mac_bytes: 8,
        block_mac_rand_bytes: 8,
        encrypted_block_size_bytes: 1024,
        use_unique_iv: true,
        holes_allowed: false,
        ..config_s1()
    };
    let (volume, _store) = create_volume(config, "encfs", 5);

    // One full on-disk block (1024 bytes, of which 1008 are data) and one
    // short block (992 data + 16 header = 1008 bytes); total raw
    // = 8 (file header) + 1024 + 1008 = 2040.
    let plaintext_len = 2000u64;
    assert_eq!(volume.ciphertext_size(plaintext_len), 2040);
}

#[test]
fn move_directory_recursively_rewrites_descendant_names_under_chained_iv() {
    let (volume, _store) = create_volume(config_s1(), "encfs", 9);
    let rng = ChaCha20Rng::seed_from_u64(90);

    let mut writer = volume.open_write("proj/notes/todo.txt", rng).unwrap();
    writer.write_all(b"buy milk").unwrap();
    writer.finish().unwrap();

    assert!(volume.move_entry("proj", "archive").unwrap());

    assert!(volume.file("proj").is_err());
    let mut reader = volume.open_read("archive/notes/todo.txt").unwrap();
    let mut decrypted = Vec::new();
    reader.read_to_end(&mut decrypted).unwrap();
    assert_eq!(decrypted, b"buy milk");
}

#[test]
fn copy_directory_recursively_leaves_source_intact() {
    let (volume, _store) = create_volume(config_s1(), "encfs", 10);
    let rng = ChaCha20Rng::seed_from_u64(100);

    let mut writer = volume.open_write("src/a.txt", rng).unwrap();
    writer.write_all(b"hello").unwrap();
    writer.finish().unwrap();

    assert!(volume.copy("src", "dst").unwrap());

    let mut src_reader = volume.open_read("src/a.txt").unwrap();
    let mut src_bytes = Vec::new();
    src_reader.read_to_end(&mut src_bytes).unwrap();
    assert_eq!(src_bytes, b"hello");

    let mut dst_reader = volume.open_read("dst/a.txt").unwrap();
    let mut dst_bytes = Vec::new();
    dst_reader.read_to_end(&mut dst_bytes).unwrap();
    assert_eq!(dst_bytes, b"hello");
}

#[test]
fn delete_non_empty_directory_requires_recursive_flag() {
    let (volume, _store) = create_volume(config_s1(), "encfs", 11);
    let rng = ChaCha20Rng::seed_from_u64(110);

    let mut writer = volume.open_write("keep/file.txt", rng).unwrap();
    writer.write_all(b"data").unwrap();
    writer.finish().unwrap();

    assert!(volume.delete("keep", false).is_err());
    assert!(volume.delete("keep", true).unwrap());
    assert!(volume.file("keep/file.txt").is_err());
}

#[test]
fn corrupted_block_surfaces_as_corrupt_data() {
    let config = VolumeConfig {
        block_mac_bytes: 8,
        block_mac_rand_bytes: 8,
        ..config_s1()
    };
    let (volume, store) = create_volume(config, "encfs", 8);
    let rng = ChaCha20Rng::seed_from_u64(80);

    let mut writer = volume.open_write("tamper.bin", rng).unwrap();
    writer.write_all(&vec![0x44u8; 32]).unwrap();
    writer.finish().unwrap();

    let encrypted_path = volume.file("tamper.bin").unwrap().encrypted_path;
    {
        let mut files = store.files.borrow_mut();
        let data = files.get_mut(&encrypted_path).unwrap();
        let last = data.len() - 1;
        data[last] ^= 0xFF;
    }

    let mut reader = volume.open_read("tamper.bin").unwrap();
    let mut decrypted = Vec::new();
    let result = reader.read_to_end(&mut decrypted);
    assert!(result.is_err());
}
