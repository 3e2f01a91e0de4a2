//! C8: the path codec.
//!
//! A plaintext path is `/`-separated components, each independently run
//! through [`crate::fs::name`]'s filename codec. When the volume uses
//! chained IVs (Open Question (b) in SPEC_FULL.md), the [`ChainState`]
//! produced by encoding one component feeds into encoding the next, so a
//! ciphertext name's wire bytes depend on every ancestor directory name —
//! reference EncFS's defense against an attacker rearranging ciphertext
//! directories undetected.

use thiserror::Error;

use crate::crypto::iv::IV_SIZE;
use crate::crypto::ChainState;
use crate::crypto::primitives::AesKey;
use crate::fs::name::{self, FilenameAlgorithm, NameError};

/// Errors from encoding or decoding a whole path.
#[derive(Error, Debug)]
pub enum PathError {
    /// A path component failed to encode or decode.
    #[error("path component {index} failed: {source}")]
    Component {
        index: usize,
        #[source]
        source: NameError,
    },

    /// The path was empty, `/`-rooted with nothing after it, or contained
    /// an empty component (e.g. a doubled `/`).
    #[error("invalid path structure: {reason}")]
    InvalidStructure { reason: &'static str },
}

/// Split `path` into its `/`-separated components, reporting separately
/// whether it was `/`-rooted — callers re-prefix the output with `/` when
/// it was, so a rooted plaintext path always encodes to a rooted
/// ciphertext path and vice versa (spec.md §4.8, §6).
fn split_components(path: &str) -> Result<(bool, Vec<&str>), PathError> {
    let has_leading_slash = path.starts_with('/');
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return Err(PathError::InvalidStructure {
            reason: "path has no components",
        });
    }
    let components: Vec<&str> = trimmed.split('/').collect();
    if components.iter().any(|c| c.is_empty()) {
        return Err(PathError::InvalidStructure {
            reason: "path contains an empty component",
        });
    }
    Ok((has_leading_slash, components))
}

/// Encode a full plaintext path into its ciphertext form, one path
/// component at a time.
///
/// `chained` selects whether each component's [`ChainState`] feeds the
/// next (reference EncFS's "chained IV" directory mode) or every
/// component is encoded independently against an empty chain.
pub fn encode_path(
    path: &str,
    key: &AesKey,
    volume_iv: &[u8; IV_SIZE],
    algorithm: FilenameAlgorithm,
    chained: bool,
) -> Result<String, PathError> {
    let (rooted, components) = split_components(path)?;
    let mut chain = ChainState::none();
    let mut encoded_components = Vec::with_capacity(components.len());

    for (index, component) in components.iter().enumerate() {
        let chain_iv = if chained { chain.as_bytes() } else { &[] };
        let (encoded, next_chain) = name::encrypt_filename(component, key, volume_iv, chain_iv, algorithm)
            .map_err(|source| PathError::Component { index, source })?;
        encoded_components.push(encoded);
        if chained {
            chain = next_chain;
        }
    }

    let joined = encoded_components.join("/");
    Ok(if rooted { format!("/{joined}") } else { joined })
}

/// Decode a full ciphertext path back into its plaintext form.
///
/// `chained` must match the value [`encode_path`] was called with; a
/// mismatch surfaces as a checksum failure on the second component
/// onward (the first component's chain state is the same either way).
pub fn decode_path(
    path: &str,
    key: &AesKey,
    volume_iv: &[u8; IV_SIZE],
    algorithm: FilenameAlgorithm,
    chained: bool,
) -> Result<String, PathError> {
    let (rooted, components) = split_components(path)?;
    let mut chain = ChainState::none();
    let mut decoded_components = Vec::with_capacity(components.len());

    for (index, component) in components.iter().enumerate() {
        let chain_iv = if chained { chain.as_bytes() } else { &[] };
        let (decoded, next_chain) = name::decrypt_filename(component, key, volume_iv, chain_iv, algorithm)
            .map_err(|source| PathError::Component { index, source })?;
        decoded_components.push(decoded);
        if chained {
            chain = next_chain;
        }
    }

    let joined = decoded_components.join("/");
    Ok(if rooted { format!("/{joined}") } else { joined })
}

/// Compute the chain state produced by encoding `dir` as a sequence of
/// path components, without producing any ciphertext — used by callers
/// (the `Volume` type) that need the correct chain context to encode or
/// decode a *child* of `dir` one component at a time (e.g. directory
/// listing, where each entry name arrives already ciphertext and only
/// needs the parent's chain, not a full path re-encode).
///
/// The root directory (`""` or `"/"`) always has the empty chain state.
pub fn chain_state_for_dir(
    dir: &str,
    key: &AesKey,
    volume_iv: &[u8; IV_SIZE],
    algorithm: FilenameAlgorithm,
    chained: bool,
) -> Result<ChainState, PathError> {
    if dir.is_empty() || dir == "/" {
        return Ok(ChainState::none());
    }
    let (_, components) = split_components(dir)?;
    let mut chain = ChainState::none();
    for (index, component) in components.iter().enumerate() {
        let chain_iv = if chained { chain.as_bytes() } else { &[] };
        let (_, next_chain) = name::encrypt_filename(component, key, volume_iv, chain_iv, algorithm)
            .map_err(|source| PathError::Component { index, source })?;
        if chained {
            chain = next_chain;
        }
    }
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> AesKey {
        AesKey::from_slice(&[0x77u8; 32])
    }

    fn volume_iv() -> [u8; IV_SIZE] {
        [0x42u8; IV_SIZE]
    }

    #[test]
    fn unchained_roundtrips() {
        let key = key();
        let encoded = encode_path("docs/reports/q3.txt", &key, &volume_iv(), FilenameAlgorithm::Stream, false).unwrap();
        let decoded = decode_path(&encoded, &key, &volume_iv(), FilenameAlgorithm::Stream, false).unwrap();
        assert_eq!(decoded, "docs/reports/q3.txt");
    }

    #[test]
    fn chained_roundtrips() {
        let key = key();
        let encoded = encode_path("a/b/c/d.txt", &key, &volume_iv(), FilenameAlgorithm::Block, true).unwrap();
        let decoded = decode_path(&encoded, &key, &volume_iv(), FilenameAlgorithm::Block, true).unwrap();
        assert_eq!(decoded, "a/b/c/d.txt");
    }

    #[test]
    fn chained_encoding_differs_from_unchained() {
        let key = key();
        let chained = encode_path("docs/report.txt", &key, &volume_iv(), FilenameAlgorithm::Stream, true).unwrap();
        let unchained = encode_path("docs/report.txt", &key, &volume_iv(), FilenameAlgorithm::Stream, false).unwrap();
        // first component is identical (empty chain either way); second differs.
        let chained_parts: Vec<&str> = chained.split('/').collect();
        let unchained_parts: Vec<&str> = unchained.split('/').collect();
        assert_eq!(chained_parts[0], unchained_parts[0]);
        assert_ne!(chained_parts[1], unchained_parts[1]);
    }

    #[test]
    fn reordered_directories_fail_to_decode_when_chained() {
        let key = key();
        // Encode two sibling files under different parents, then try to
        // decode one's leaf name under the other's parent ciphertext —
        // simulating an attacker splicing directories together.
        let encoded_a = encode_path("alpha/shared.txt", &key, &volume_iv(), FilenameAlgorithm::Stream, true).unwrap();
        let encoded_b = encode_path("beta/shared.txt", &key, &volume_iv(), FilenameAlgorithm::Stream, true).unwrap();
        let alpha_parent = encoded_a.split('/').next().unwrap();
        let beta_leaf = encoded_b.split('/').nth(1).unwrap();
        let spliced = format!("{alpha_parent}/{beta_leaf}");
        let result = decode_path(&spliced, &key, &volume_iv(), FilenameAlgorithm::Stream, true);
        assert!(result.is_err());
    }

    #[test]
    fn leading_slash_is_preserved_through_encode_and_decode() {
        let key = key();
        let encoded = encode_path("/solo.txt", &key, &volume_iv(), FilenameAlgorithm::Null, false).unwrap();
        assert_eq!(encoded, "/solo.txt");
        let decoded = decode_path(&encoded, &key, &volume_iv(), FilenameAlgorithm::Null, false).unwrap();
        assert_eq!(decoded, "/solo.txt");
    }

    #[test]
    fn empty_path_rejected() {
        let key = key();
        let result = encode_path("", &key, &volume_iv(), FilenameAlgorithm::Null, false);
        assert!(matches!(result, Err(PathError::InvalidStructure { .. })));
        let result = encode_path("/", &key, &volume_iv(), FilenameAlgorithm::Null, false);
        assert!(matches!(result, Err(PathError::InvalidStructure { .. })));
    }

    #[test]
    fn chain_state_for_dir_matches_encode_path_prefix() {
        let key = key();
        let full = encode_path("alpha/beta/gamma.txt", &key, &volume_iv(), FilenameAlgorithm::Stream, true).unwrap();
        let parent_chain =
            chain_state_for_dir("alpha/beta", &key, &volume_iv(), FilenameAlgorithm::Stream, true).unwrap();
        let leaf_cipher = full.split('/').nth(2).unwrap();
        let (decoded_leaf, _) = name::decrypt_filename(
            leaf_cipher,
            &key,
            &volume_iv(),
            parent_chain.as_bytes(),
            FilenameAlgorithm::Stream,
        )
        .unwrap();
        assert_eq!(decoded_leaf, "gamma.txt");
    }

    #[test]
    fn chain_state_for_root_is_empty() {
        let key = key();
        assert_eq!(
            chain_state_for_dir("", &key, &volume_iv(), FilenameAlgorithm::Stream, true).unwrap(),
            ChainState::none()
        );
        assert_eq!(
            chain_state_for_dir("/", &key, &volume_iv(), FilenameAlgorithm::Stream, true).unwrap(),
            ChainState::none()
        );
    }

    #[test]
    fn doubled_slash_rejected() {
        let key = key();
        let result = encode_path("a//b", &key, &volume_iv(), FilenameAlgorithm::Null, false);
        assert!(matches!(result, Err(PathError::InvalidStructure { .. })));
    }
}
