//! Cryptographic primitives underlying the EncFS wire format.
//!
//! Layered bottom-up: [`primitives`] wraps the raw RustCrypto ciphers and
//! byte transforms; [`mac`] builds the truncated-HMAC checksums EncFS calls
//! "chained IV MACs"; [`iv`] derives per-file/per-block IVs from those
//! MACs; [`stream_codec`] and [`block_codec`] are the two content/filename
//! encodings built on top; [`base64`] is EncFS's own base64 dialect used to
//! make ciphertext filenames filesystem-safe.
//!
//! None of these types are safe to share across threads while in use — see
//! the crate-level concurrency notes in `vault::Volume`. Every function
//! here is a pure function of its explicit arguments; there is no shared
//! mutable cipher state to race on.

pub mod base64;
pub mod block_codec;
pub mod iv;
pub mod mac;
pub mod primitives;
pub mod stream_codec;

pub use base64::{decode as base64_decode, encode as base64_encode};
pub use block_codec::{block_decrypt, block_encrypt};
pub use iv::{block_iv_seed, derive_iv, seed_plus_one, IV_SIZE};
pub use mac::{ChainState, mac16, mac32, mac64};
pub use primitives::{flip_bytes, shuffle, unshuffle};
pub use stream_codec::{stream_decrypt, stream_encrypt};
