//! Loader configuration loading and validation.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Default file extension for discovered unit files.
fn default_unit_extension() -> String {
    "unit".to_string()
}

/// Construction-time configuration for a [`crate::UnitLoader`].
///
/// Replaces ambient flags with an explicit struct: the debug mirror
/// directory in particular is scoped to the loader instance rather than
/// being a process-wide switch.
#[derive(Debug, Clone, Deserialize)]
pub struct LoaderConfig {
    /// Root directories indexed at construction for discovered units and
    /// resources. Order matters: the first root providing a name wins.
    #[serde(default)]
    pub roots: Vec<PathBuf>,

    /// Directory for the content-addressed cache of transformed units.
    pub cache_dir: PathBuf,

    /// Optional directory that mirrors synthesized units as individually
    /// named files for inspection.
    #[serde(default)]
    pub debug_dir: Option<PathBuf>,

    /// File extension identifying unit files under the roots.
    #[serde(default = "default_unit_extension")]
    pub unit_extension: String,
}

impl LoaderConfig {
    /// Creates a configuration with the given cache directory and defaults
    /// for everything else.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            roots: Vec::new(),
            cache_dir: cache_dir.into(),
            debug_dir: None,
            unit_extension: default_unit_extension(),
        }
    }

    /// Adds a discovered root directory.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots.push(root.into());
        self
    }

    /// Sets the debug mirror directory.
    pub fn with_debug_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.debug_dir = Some(dir.into());
        self
    }
}

/// Loads and validates a `kiln.toml` configuration from a project directory.
pub fn load_config(project_dir: &Path) -> Result<LoaderConfig, ConfigError> {
    let config_path = project_dir.join("kiln.toml");
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates a loader configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<LoaderConfig, ConfigError> {
    let config: LoaderConfig =
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that configuration values are usable.
fn validate_config(config: &LoaderConfig) -> Result<(), ConfigError> {
    if config.cache_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "cache_dir must not be empty".to_string(),
        ));
    }
    if config.unit_extension.is_empty() || config.unit_extension.contains('.') {
        return Err(ConfigError::Validation(
            "unit_extension must be a bare extension without dots".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let toml = r#"
cache_dir = ".kiln/cache"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.cache_dir, PathBuf::from(".kiln/cache"));
        assert!(config.roots.is_empty());
        assert!(config.debug_dir.is_none());
        assert_eq!(config.unit_extension, "unit");
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
roots = ["build/units", "vendor/units"]
cache_dir = ".kiln/cache"
debug_dir = ".kiln/debug"
unit_extension = "kbc"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.roots.len(), 2);
        assert_eq!(config.roots[0], PathBuf::from("build/units"));
        assert_eq!(config.debug_dir, Some(PathBuf::from(".kiln/debug")));
        assert_eq!(config.unit_extension, "kbc");
    }

    #[test]
    fn empty_cache_dir_rejected() {
        let toml = r#"
cache_dir = ""
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn dotted_extension_rejected() {
        let toml = r#"
cache_dir = ".kiln/cache"
unit_extension = ".unit"
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let err = load_config_from_str("cache_dir = [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_from_project_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("kiln.toml"), "cache_dir = \"c\"\n").unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("c"));
    }

    #[test]
    fn builder_helpers() {
        let config = LoaderConfig::new("cache")
            .with_root("roots/a")
            .with_debug_dir("debug");
        assert_eq!(config.roots, vec![PathBuf::from("roots/a")]);
        assert_eq!(config.debug_dir, Some(PathBuf::from("debug")));
    }
}
