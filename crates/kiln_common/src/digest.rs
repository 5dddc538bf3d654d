//! Content digests for cache addressing.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 256-bit BLAKE3 content digest.
///
/// Two byte sequences with the same `ContentDigest` are assumed to be
/// identical. Transformed units are cached under the digest of their raw
/// input bytes rather than their name, so renamed-but-identical inputs share
/// a single cache entry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    /// Computes the digest of a byte slice.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the URL-safe, unpadded base64 form of the digest.
    ///
    /// This is the canonical on-disk key: cache entries are stored in a flat
    /// directory of files named by this encoding.
    pub fn encoded(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}
