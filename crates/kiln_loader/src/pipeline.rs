//! Per-unit rewrite passes with content-addressed memoization.

use std::sync::Arc;

use dashmap::DashMap;
use kiln_cache::DigestStore;
use kiln_common::{ContentDigest, UnitName};
use tracing::{debug, warn};

use crate::error::MaterializeError;

/// A single byte-level rewrite applied to a unit's raw bytes.
///
/// Passes registered for a unit are applied in registration order, each
/// receiving the previous pass's output. Passes must be pure functions of
/// their input bytes: the transformed result is cached under the digest of
/// the *raw* input, so a pass that consulted outside state could poison the
/// cache for every identically-sized input.
pub trait RewritePass: Send + Sync {
    /// A stable, human-readable pass name used in error reports.
    fn name(&self) -> &str;

    /// Rewrites the unit's bytes.
    fn rewrite(
        &self,
        unit: &UnitName,
        bytes: Vec<u8>,
    ) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Ordered, per-unit-name rewrite passes over a digest-keyed cache.
pub struct RewritePipeline {
    /// Registered passes per unit name, in registration order.
    passes: DashMap<UnitName, Vec<Arc<dyn RewritePass>>>,

    /// Persistent cache of transformed output, keyed by raw-input digest.
    cache: DigestStore,
}

impl RewritePipeline {
    /// Creates a pipeline over the given digest store.
    pub fn new(cache: DigestStore) -> Self {
        Self {
            passes: DashMap::new(),
            cache,
        }
    }

    /// Registers a pass for a unit name, after any already registered.
    pub fn register(&self, name: UnitName, pass: Arc<dyn RewritePass>) {
        self.passes.entry(name).or_default().push(pass);
    }

    /// Returns `true` if at least one pass is registered for the name.
    pub fn has_passes_for(&self, name: &UnitName) -> bool {
        self.passes.get(name).is_some_and(|p| !p.is_empty())
    }

    /// Runs the registered passes for a unit over its raw bytes.
    ///
    /// With no registered passes this is an untransformed passthrough and
    /// never touches the cache. Otherwise the raw bytes are digested first:
    /// a cache hit skips the passes entirely, including across process
    /// restarts and across names with byte-identical input. A cache
    /// write-back failure is logged and absorbed — the computed bytes are
    /// returned regardless.
    pub fn apply(&self, name: &UnitName, raw: &[u8]) -> Result<Vec<u8>, MaterializeError> {
        // Clone the pass list out so no map shard lock is held while passes run.
        let passes: Vec<Arc<dyn RewritePass>> = match self.passes.get(name) {
            Some(passes) if !passes.is_empty() => passes.value().clone(),
            _ => return Ok(raw.to_vec()),
        };

        let digest = ContentDigest::from_bytes(raw);
        if let Some(cached) = self.cache.get(&digest) {
            debug!(unit = %name, %digest, "transformed unit served from cache");
            return Ok(cached);
        }

        let mut bytes = raw.to_vec();
        for pass in &passes {
            bytes = pass
                .rewrite(name, bytes)
                .map_err(|e| MaterializeError::Rewrite {
                    unit: name.clone(),
                    pass: pass.name().to_string(),
                    reason: e.to_string(),
                })?;
        }

        if let Err(e) = self.cache.put(&digest, &bytes) {
            warn!(unit = %name, %digest, error = %e, "cache write failed, keeping in-memory result");
        }
        Ok(bytes)
    }

    /// The underlying digest store.
    pub fn cache(&self) -> &DigestStore {
        &self.cache
    }
}
