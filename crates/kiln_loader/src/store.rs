//! Two-tier storage of raw unit bytes.
//!
//! Units come from two provenances: *synthesized* units held only in memory,
//! published incrementally by the build collaborator, and *discovered* units
//! backed by files under configured root directories, indexed once at
//! construction. Synthesized entries shadow discovered ones of the same name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use kiln_common::UnitName;
use walkdir::WalkDir;

use crate::error::MaterializeError;

/// Where a raw unit's bytes came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    /// Published directly into memory by the build collaborator.
    Synthesized,
    /// Read from a file discovered under a configured root.
    Discovered(PathBuf),
}

/// The byte sequence for a unit before any rewrite pass has run.
#[derive(Debug, Clone)]
pub struct RawUnit {
    /// The raw bytes.
    pub bytes: Arc<[u8]>,
    /// The tier the bytes were resolved from.
    pub provenance: Provenance,
}

/// Resolves unit names to raw bytes from the synthesized and discovered tiers.
pub struct UnitStore {
    /// In-memory units; shadow discovered units of the same name.
    synthesized: DashMap<UnitName, Arc<[u8]>>,

    /// Normalized relative path → absolute file paths in root order.
    ///
    /// Built once at construction; only [`UnitStore::merge_entries`] appends
    /// to it afterwards, under the write lock, so readers never observe a
    /// partially inserted entry.
    discovered: RwLock<HashMap<String, Vec<PathBuf>>>,

    /// File extension identifying unit files (without the leading dot).
    unit_extension: String,
}

impl UnitStore {
    /// Creates a store by indexing the given root directories.
    ///
    /// Every file under each root is recorded under its `/`-separated
    /// relative path, units and plain resources alike. Unreadable directory
    /// entries are skipped. The first root providing a path wins for unit
    /// resolution; later locations are retained for resource enumeration.
    pub fn new(roots: &[PathBuf], unit_extension: &str) -> Self {
        let mut discovered = HashMap::new();
        for root in roots {
            merge_into(&mut discovered, Self::scan_root(root));
        }
        Self {
            synthesized: DashMap::new(),
            discovered: RwLock::new(discovered),
            unit_extension: unit_extension.to_string(),
        }
    }

    /// Walks a single root, returning its normalized index.
    ///
    /// Paths are keyed platform-independently: components are joined with
    /// `/` regardless of the native separator.
    pub fn scan_root(root: &Path) -> HashMap<String, Vec<PathBuf>> {
        let mut entries: HashMap<String, Vec<PathBuf>> = HashMap::new();
        for entry in WalkDir::new(root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            let Ok(rel) = entry.path().strip_prefix(root) else {
                continue;
            };
            let key = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            entries
                .entry(key)
                .or_default()
                .push(entry.path().to_path_buf());
        }
        entries
    }

    /// Appends additional discovered entries, e.g. from late-merged roots.
    ///
    /// Existing locations keep priority; new ones are appended after them.
    pub fn merge_entries(&self, entries: HashMap<String, Vec<PathBuf>>) {
        let mut discovered = self.discovered.write().expect("discovered index poisoned");
        merge_into(&mut discovered, entries);
    }

    /// Publishes a synthesized unit, shadowing any discovered unit of the
    /// same name.
    pub fn insert_synthesized(&self, name: UnitName, bytes: Arc<[u8]>) {
        self.synthesized.insert(name, bytes);
    }

    /// Resolves a unit name to its raw bytes.
    ///
    /// Returns `Ok(None)` when the name is unknown in both tiers — a
    /// negative lookup, not a failure. An I/O error reading a discovered
    /// unit's file is a genuine failure and carries the offending path.
    pub fn raw_bytes_for(&self, name: &UnitName) -> Result<Option<RawUnit>, MaterializeError> {
        if let Some(bytes) = self.synthesized.get(name) {
            return Ok(Some(RawUnit {
                bytes: Arc::clone(&bytes),
                provenance: Provenance::Synthesized,
            }));
        }

        let rel = name.to_rel_path(&self.unit_extension);
        let path = {
            let discovered = self.discovered.read().expect("discovered index poisoned");
            discovered.get(&rel).and_then(|paths| paths.first().cloned())
        };
        let Some(path) = path else {
            return Ok(None);
        };

        let bytes = std::fs::read(&path).map_err(|e| MaterializeError::Io {
            path: path.clone(),
            source: Arc::new(e),
        })?;
        Ok(Some(RawUnit {
            bytes: bytes.into(),
            provenance: Provenance::Discovered(path),
        }))
    }

    /// Returns `true` if the name resolves in either tier.
    pub fn contains(&self, name: &UnitName) -> bool {
        self.is_synthesized(name) || self.is_discovered(name)
    }

    /// Returns `true` if a synthesized unit exists for the name.
    pub fn is_synthesized(&self, name: &UnitName) -> bool {
        self.synthesized.contains_key(name)
    }

    /// Returns `true` if a discovered unit file exists for the name.
    pub fn is_discovered(&self, name: &UnitName) -> bool {
        let rel = name.to_rel_path(&self.unit_extension);
        self.discovered
            .read()
            .expect("discovered index poisoned")
            .contains_key(&rel)
    }

    /// Returns all discovered locations for a resource path, in root order.
    pub fn discovered_locations(&self, rel_path: &str) -> Vec<PathBuf> {
        self.discovered
            .read()
            .expect("discovered index poisoned")
            .get(rel_path)
            .cloned()
            .unwrap_or_default()
    }

    /// The configured unit file extension.
    pub fn unit_extension(&self) -> &str {
        &self.unit_extension
    }
}

/// Extends `target` with `extra`, appending locations after existing ones.
fn merge_into(
    target: &mut HashMap<String, Vec<PathBuf>>,
    extra: HashMap<String, Vec<PathBuf>>,
) {
    for (key, paths) in extra {
        target.entry(key).or_default().extend(paths);
    }
}
