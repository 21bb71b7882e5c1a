//! Reversible mapping between paths and opaque hashes.
//!
//! A hash is `<storage id>_<payload>`, where the payload is the URL-safe,
//! unpadded base64 of the path relative to the volume root (`a/b.txt`), or of
//! the absolute path for nodes outside the root (symlink targets). Relative
//! payloads never start with `/`, so the two forms cannot collide.
//!
//! This is obfuscation, not secrecy: anyone who can guess paths can compute
//! hashes. Containment is enforced by the access policy, not here.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Separator between the storage id and the encoded path.
pub const HASH_SEPARATOR: char = '_';

/// Check that a storage id can prefix hashes unambiguously.
pub fn is_valid_storage_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Storage id a hash claims to belong to, if it has the right shape.
pub fn storage_id_of(hash: &str) -> Option<&str> {
    hash.split_once(HASH_SEPARATOR)
        .map(|(id, _)| id)
        .filter(|id| is_valid_storage_id(id))
}

/// Path codec bound to one storage id and root.
#[derive(Debug, Clone)]
pub struct PathCodec {
    id: String,
    root: PathBuf,
}

impl PathCodec {
    /// Create a codec for the volume `id` rooted at `root`.
    pub fn new(id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            root: root.into(),
        }
    }

    /// The storage id prefixing every hash.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Encode a path into a hash.
    pub fn encode(&self, path: &Path) -> String {
        let text = match path.strip_prefix(&self.root) {
            Ok(rel) => rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => path.to_string_lossy().into_owned(),
        };
        format!(
            "{}{}{}",
            self.id,
            HASH_SEPARATOR,
            URL_SAFE_NO_PAD.encode(text.as_bytes())
        )
    }

    /// Decode a hash minted by this codec.
    ///
    /// Returns `None` for hashes of other volumes and for malformed input.
    /// The returned path may not exist and may lie outside the root.
    pub fn decode(&self, hash: &str) -> Option<PathBuf> {
        let payload = hash
            .strip_prefix(self.id.as_str())?
            .strip_prefix(HASH_SEPARATOR)?;
        let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
        let text = String::from_utf8(bytes).ok()?;
        if text.contains('\0') {
            return None;
        }

        if text.is_empty() {
            Some(self.root.clone())
        } else if text.starts_with('/') {
            Some(PathBuf::from(text))
        } else {
            Some(self.root.join(text))
        }
    }
}
