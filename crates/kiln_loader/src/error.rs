//! Error types for unit materialization and loader configuration.

use std::path::PathBuf;
use std::sync::Arc;

use kiln_common::UnitName;

/// Errors produced while materializing a unit.
///
/// A missing unit is not represented here: "not found" is a negative lookup
/// result that lets the loader fall through to the delegate resolver, not a
/// failure. Materialization failures are memoized per name, so this type is
/// `Clone` and every concurrent waiter for a name receives the identical
/// error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MaterializeError {
    /// Reading a discovered unit's bytes from disk failed.
    #[error("failed to read unit bytes at {path}: {source}")]
    Io {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying I/O error, shared across all waiters.
        source: Arc<std::io::Error>,
    },

    /// A rewrite pass failed; terminal for the unit.
    #[error("rewrite pass '{pass}' failed for unit {unit}: {reason}")]
    Rewrite {
        /// The unit being rewritten.
        unit: UnitName,
        /// The name of the failing pass.
        pass: String,
        /// Description of the failure.
        reason: String,
    },

    /// A unit routed as owned had no raw bytes by materialization time.
    ///
    /// Ownership is checked before materialization and owned units are never
    /// removed, so this indicates a broken internal contract rather than an
    /// ordinary negative lookup.
    #[error("owned unit {unit} has no raw bytes")]
    Missing {
        /// The unit that vanished.
        unit: UnitName,
    },
}

/// Errors that can occur when loading or validating a loader configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An I/O error occurred while reading the configuration file.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML content could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    /// A configuration value failed validation.
    #[error("validation error: {0}")]
    Validation(String),
}
