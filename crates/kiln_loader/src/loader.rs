//! Namespace routing and the public loading facade.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use kiln_cache::DigestStore;
use kiln_common::UnitName;
use tracing::{debug, warn};

use crate::config::LoaderConfig;
use crate::delegate::DelegateResolver;
use crate::error::MaterializeError;
use crate::materialize::Materializer;
use crate::pipeline::{RewritePass, RewritePipeline};
use crate::store::UnitStore;

/// Which namespace a unit name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// The loader produces this unit itself, through materialization.
    Owned,
    /// The name is handed to the injected delegate resolver.
    Delegate,
}

/// The unit loader: routes names between the owned and delegate namespaces,
/// materializes owned units exactly once each, and overlays synthesized,
/// directory-backed, and delegate resources.
pub struct UnitLoader {
    store: Arc<UnitStore>,
    pipeline: Arc<RewritePipeline>,
    materializer: Materializer,
    delegate: Arc<dyn DelegateResolver>,

    /// Names explicitly excluded from the owned namespace.
    ///
    /// Membership is sticky: once a name is routed to the delegate it stays
    /// there, even if an owned unit of the same name is published later.
    framework: DashSet<UnitName>,

    /// Synthesized resources, consulted before any directory-backed tier.
    resources: DashMap<String, Arc<[u8]>>,

    debug_dir: Option<PathBuf>,
}

impl UnitLoader {
    /// Builds a loader from its configuration, indexing the configured
    /// roots once.
    pub fn new(config: LoaderConfig, delegate: Arc<dyn DelegateResolver>) -> Self {
        let store = Arc::new(UnitStore::new(&config.roots, &config.unit_extension));
        let pipeline = Arc::new(RewritePipeline::new(DigestStore::new(&config.cache_dir)));
        let materializer = Materializer::new(Arc::clone(&store), Arc::clone(&pipeline));
        Self {
            store,
            pipeline,
            materializer,
            delegate,
            framework: DashSet::new(),
            resources: DashMap::new(),
            debug_dir: config.debug_dir,
        }
    }

    /// Classifies a unit name as owned or delegated.
    ///
    /// A name is owned if it is already synthesized, or if it is not
    /// framework-excluded and a discovered unit file exists for it. The
    /// check is a single snapshot pass over the maps; it is race-safe
    /// against concurrent publications but not linearizable across them.
    pub fn resolve_unit(&self, name: &UnitName) -> Route {
        if self.store.is_synthesized(name) {
            return Route::Owned;
        }
        if !self.framework.contains(name) && self.store.is_discovered(name) {
            return Route::Owned;
        }
        Route::Delegate
    }

    /// Resolves a unit name to loadable bytes.
    ///
    /// Owned names go through single-flight materialization; all concurrent
    /// callers for a name observe one outcome. Delegated names are answered
    /// by the injected resolver, and `Ok(None)` means the name was found
    /// nowhere — a negative result the caller may route elsewhere.
    pub fn load_unit(&self, name: &UnitName) -> Result<Option<Arc<[u8]>>, MaterializeError> {
        match self.resolve_unit(name) {
            Route::Owned => self.materializer.materialize(name).map(Some),
            Route::Delegate => Ok(self.delegate.resolve_unit(name)),
        }
    }

    /// Registers a rewrite pass for a unit name.
    ///
    /// Calling this after the name's materialization has completed has no
    /// effect on it: the memoized result stands.
    pub fn register_pass(&self, name: UnitName, pass: Arc<dyn RewritePass>) {
        self.pipeline.register(name, pass);
    }

    /// Publishes a synthesized unit from the build collaborator.
    ///
    /// Owned units enter the synthesized tier (shadowing any discovered unit
    /// of the same name). Non-owned units are framework-excluded instead:
    /// permanently routed to the delegate, with their bytes still mirrored
    /// to the debug directory, when one is configured, for inspection and
    /// interop. The exclusion is sticky, so an owned publication of an
    /// already-excluded name is dropped.
    pub fn publish_unit(&self, owned: bool, name: UnitName, bytes: Vec<u8>) {
        let bytes: Arc<[u8]> = bytes.into();
        self.write_debug_copy(&name, &bytes);
        if !owned {
            debug!(unit = %name, "excluding unit from owned namespace");
            self.framework.insert(name);
        } else if self.framework.contains(&name) {
            debug!(unit = %name, "ignoring owned publication of excluded unit");
        } else {
            self.store.insert_synthesized(name, bytes);
        }
    }

    /// Publishes a synthesized resource, consulted as the highest-priority
    /// tier of resource lookup.
    pub fn publish_resource(&self, path: &str, bytes: Vec<u8>) {
        self.resources
            .insert(sanitize_resource_path(path), bytes.into());
    }

    /// Conditionally indexes additional discovered roots.
    ///
    /// A root is merged only if at least one registered rewrite pass targets
    /// a unit name found under it; otherwise the root is dropped unindexed,
    /// so archives no pass cares about are never held.
    pub fn merge_additional_roots(&self, roots: &[PathBuf]) {
        for root in roots {
            let entries = UnitStore::scan_root(root);
            let targeted = entries
                .keys()
                .filter_map(|rel| UnitName::from_rel_path(rel, self.store.unit_extension()))
                .any(|name| self.pipeline.has_passes_for(&name));
            if targeted {
                debug!(root = %root.display(), units = entries.len(), "merging discovered root");
                self.store.merge_entries(entries);
            } else {
                debug!(root = %root.display(), "skipping root, no registered pass targets it");
            }
        }
    }

    /// Returns the first matching resource for a path.
    ///
    /// Priority order: synthesized resource, first discovered file by root
    /// order, delegate. An unreadable discovered file is skipped rather than
    /// surfaced, matching resource-stream semantics.
    pub fn resource(&self, path: &str) -> Option<Arc<[u8]>> {
        let path = sanitize_resource_path(path);
        if let Some(bytes) = self.resources.get(&path) {
            return Some(Arc::clone(&bytes));
        }
        for location in self.store.discovered_locations(&path) {
            match std::fs::read(&location) {
                Ok(bytes) => return Some(bytes.into()),
                Err(e) => {
                    debug!(path = %location.display(), error = %e, "skipping unreadable resource");
                }
            }
        }
        self.delegate.resource(&path)
    }

    /// Returns all matching resources for a path.
    ///
    /// Synthesized first, then every discovered match in root order, then
    /// the delegate's matches. Duplicates are preserved: a resource present
    /// in several tiers appears once per tier, mirroring layered-classpath
    /// enumeration.
    pub fn resources(&self, path: &str) -> Vec<Arc<[u8]>> {
        let path = sanitize_resource_path(path);
        let mut matches = Vec::new();
        if let Some(bytes) = self.resources.get(&path) {
            matches.push(Arc::clone(&bytes));
        }
        for location in self.store.discovered_locations(&path) {
            match std::fs::read(&location) {
                Ok(bytes) => matches.push(bytes.into()),
                Err(e) => {
                    debug!(path = %location.display(), error = %e, "skipping unreadable resource");
                }
            }
        }
        matches.extend(self.delegate.resources(&path));
        matches
    }

    /// The underlying unit store.
    pub fn store(&self) -> &UnitStore {
        &self.store
    }

    /// The digest cache backing the rewrite pipeline.
    pub fn cache(&self) -> &DigestStore {
        self.pipeline.cache()
    }

    /// Mirrors published unit bytes into the debug directory, if configured.
    fn write_debug_copy(&self, name: &UnitName, bytes: &[u8]) {
        let Some(dir) = &self.debug_dir else {
            return;
        };
        let path = dir.join(format!("{}.{}", name.as_str(), self.store.unit_extension()));
        let result = std::fs::create_dir_all(dir).and_then(|()| std::fs::write(&path, bytes));
        if let Err(e) = result {
            warn!(unit = %name, path = %path.display(), error = %e, "failed to write debug copy");
        }
    }
}

/// Normalizes a resource path: backslashes become `/`, leading and trailing
/// separators are stripped.
fn sanitize_resource_path(path: &str) -> String {
    path.replace('\\', "/").trim_matches('/').to_string()
}
