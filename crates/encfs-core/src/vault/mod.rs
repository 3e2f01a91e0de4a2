//! The volume layer: typed configuration (C9's companion data model),
//! volume key unwrap/wrap (C9), the `BackingStore` contract (§5), and
//! `Volume` itself (C12), composing the `fs`/`crypto` layers below it.

pub mod backing_store;
pub mod config;
pub mod key;
pub mod volume;

pub use backing_store::{BackingStore, Metadata};
pub use config::{VolumeConfig, VolumeConfigError};
pub use key::{unwrap_volume_key, wrap_new_volume_key, KeyUnwrapError, VolumeKeyMaterial};
pub use volume::{DirEntry, FileInfo, PasswordOrKey, Volume};
