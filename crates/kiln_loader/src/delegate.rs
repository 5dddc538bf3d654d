//! Fallback resolution for units outside the owned namespace.

use std::sync::Arc;

use kiln_common::UnitName;

/// Resolver consulted for names and resources the loader does not own.
///
/// Modeling the fallback as an injected trait object keeps the loader core
/// free of host-environment coupling; the host supplies whatever "parent"
/// lookup it has. All methods are negative-result based: a delegate that
/// cannot resolve something returns `None`/empty rather than an error.
pub trait DelegateResolver: Send + Sync {
    /// Resolves a unit name to loadable bytes, if the delegate has it.
    fn resolve_unit(&self, name: &UnitName) -> Option<Arc<[u8]>>;

    /// Returns the first matching resource for a sanitized path.
    fn resource(&self, path: &str) -> Option<Arc<[u8]>>;

    /// Returns all matching resources for a sanitized path.
    fn resources(&self, path: &str) -> Vec<Arc<[u8]>>;
}

/// A delegate with nothing to offer; the default for standalone loaders.
pub struct NoDelegate;

impl DelegateResolver for NoDelegate {
    fn resolve_unit(&self, _name: &UnitName) -> Option<Arc<[u8]>> {
        None
    }

    fn resource(&self, _path: &str) -> Option<Arc<[u8]>> {
        None
    }

    fn resources(&self, _path: &str) -> Vec<Arc<[u8]>> {
        Vec::new()
    }
}
