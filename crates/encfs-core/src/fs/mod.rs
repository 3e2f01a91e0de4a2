//! Filename, path, and file-content codecs built on top of `crypto`.

pub mod file;
pub mod name;
pub mod path;

pub use file::{
    ciphertext_size, plaintext_size, FileInputStream, FileOutputStream,
};
pub use name::{decrypt_filename, encrypt_filename, FilenameAlgorithm, NameError};
pub use path::{decode_path, encode_path, PathError};
