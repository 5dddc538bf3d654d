//! Dotted hierarchical unit names.

use std::fmt;
use std::sync::Arc;

/// The name of a code unit, e.g. `"pkg.sub.Widget"`.
///
/// Names are dotted hierarchical identifiers, immutable once assigned, and
/// the unique key across the whole materialization pipeline. Cloning is
/// cheap (an `Arc<str>` bump).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitName(Arc<str>);

impl UnitName {
    /// Creates a unit name from a dotted identifier.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Returns the dotted name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Converts the name to its canonical relative path form.
    ///
    /// Dots become `/` separators and the unit extension is appended:
    /// `"pkg.Widget"` with extension `"unit"` becomes `"pkg/Widget.unit"`.
    /// The result is always `/`-separated regardless of platform, so it can
    /// be used directly as a discovered-index key.
    pub fn to_rel_path(&self, ext: &str) -> String {
        format!("{}.{ext}", self.0.replace('.', "/"))
    }

    /// Recovers a unit name from a canonical relative path.
    ///
    /// Returns `None` if the path does not carry the expected extension.
    /// The path must already be `/`-separated (see [`Self::to_rel_path`]).
    pub fn from_rel_path(rel_path: &str, ext: &str) -> Option<Self> {
        let stem = rel_path
            .strip_suffix(ext)
            .and_then(|s| s.strip_suffix('.'))?;
        if stem.is_empty() {
            return None;
        }
        Some(Self::new(stem.replace('/', ".")))
    }
}

impl From<&str> for UnitName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for UnitName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for UnitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for UnitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnitName({})", self.0)
    }
}
