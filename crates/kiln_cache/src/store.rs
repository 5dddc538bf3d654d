//! Flat-directory content-addressed storage.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use kiln_common::ContentDigest;

use crate::error::CacheError;

/// Prefix for in-progress temp files inside the store directory.
const TMP_PREFIX: &str = ".tmp-";

/// Monotonic counter used to keep temp file names unique within a process.
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Content-addressed store of transformed unit bytes.
///
/// Entries live in a single flat directory. The file name is the URL-safe
/// base64 encoding of the digest and the file contents are the transformed
/// payload verbatim. Entries outlive the process and are looked up before
/// any transformation is re-executed.
///
/// The store has no awareness of unit names and performs no eviction.
pub struct DigestStore {
    /// Root directory holding all entries.
    root: PathBuf,
}

impl DigestStore {
    /// Creates a store rooted at the given directory.
    ///
    /// The directory is created lazily on the first write, so constructing a
    /// store never touches the filesystem.
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Returns the on-disk path for an entry.
    pub fn entry_path(&self, digest: &ContentDigest) -> PathBuf {
        self.root.join(digest.encoded())
    }

    /// Looks up the bytes stored under a digest.
    ///
    /// Returns `None` on a miss. Reads are fail-safe: an unreadable entry is
    /// treated as a miss rather than an error.
    pub fn get(&self, digest: &ContentDigest) -> Option<Vec<u8>> {
        std::fs::read(self.entry_path(digest)).ok()
    }

    /// Stores bytes under a digest.
    ///
    /// The payload is written to a unique temp file and renamed over the
    /// final name, so concurrent readers never observe torn content and two
    /// writers racing on the same digest resolve last-writer-wins. That is
    /// acceptable here: equal digests imply equal logical input, and the
    /// transform output is deterministic, so both writers carry identical
    /// bytes.
    pub fn put(&self, digest: &ContentDigest, bytes: &[u8]) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.root).map_err(|e| CacheError::Io {
            path: self.root.clone(),
            source: e,
        })?;

        let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp = self.root.join(format!(
            "{TMP_PREFIX}{}-{}-{seq}",
            digest.encoded(),
            std::process::id()
        ));
        std::fs::write(&tmp, bytes).map_err(|e| CacheError::Io {
            path: tmp.clone(),
            source: e,
        })?;

        let dest = self.entry_path(digest);
        std::fs::rename(&tmp, &dest).map_err(|e| {
            // Leave no stray temp file behind on a failed rename.
            let _ = std::fs::remove_file(&tmp);
            CacheError::Io {
                path: dest.clone(),
                source: e,
            }
        })
    }

    /// Returns the number of completed entries in the store.
    ///
    /// In-progress temp files are not counted. A missing root directory
    /// counts as an empty store.
    pub fn len(&self) -> usize {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return 0;
        };
        entries
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_str()
                    .is_some_and(|n| !n.starts_with(TMP_PREFIX))
            })
            .count()
    }

    /// Returns `true` if the store holds no completed entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
