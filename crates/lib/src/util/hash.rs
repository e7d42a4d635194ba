//! SHA-256 helpers for layer digests.
//!
//! Layer digests travel as `sha256:<hex>` strings in image and cache
//! metadata; [`ContentHash`] holds the hex part.

use std::io::{self, Read};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const DIGEST_PREFIX: &str = "sha256:";

/// A full 64-character SHA256 hash.
///
/// # Format
///
/// The hash is a lowercase hexadecimal string (64 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
  /// The `sha256:<hex>` form used in image metadata.
  pub fn digest(&self) -> String {
    format!("{}{}", DIGEST_PREFIX, self.0)
  }

  /// Whether `digest` names this hash, with or without the `sha256:` prefix.
  pub fn matches(&self, digest: &str) -> bool {
    digest.strip_prefix(DIGEST_PREFIX).unwrap_or(digest) == self.0
  }
}

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Hash everything `reader` yields.
pub fn hash_reader(mut reader: impl Read) -> io::Result<ContentHash> {
  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = reader.read(&mut buffer)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(ContentHash(format!("{:x}", hasher.finalize())))
}

/// Hash arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(format!("{:x}", hasher.finalize()))
}
