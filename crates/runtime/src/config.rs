//! Configuration loading from a TOML file.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use storage::CompositionPolicy;

/// Engine configuration.
///
/// ```toml
/// database = "grants.db"
/// composition = "any"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// SQLite database holding grants and entity tables.
    /// An in-memory database is used when absent.
    #[serde(default)]
    pub database: Option<PathBuf>,

    /// How bound positions of nested permission instances combine.
    #[serde(default)]
    pub composition: CompositionPolicy,
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self> {
        toml::from_str(toml).map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = EngineConfig::parse(
            r#"
            database = "grants.db"
            composition = "any"
            "#,
        )
        .unwrap();
        assert_eq!(config.database, Some(PathBuf::from("grants.db")));
        assert_eq!(config.composition, CompositionPolicy::Any);
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::parse("").unwrap();
        assert_eq!(config.database, None);
        assert_eq!(config.composition, CompositionPolicy::All);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            EngineConfig::parse("composition = \"most\""),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            EngineConfig::parse("databse = \"typo.db\""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            EngineConfig::load("/nonexistent/engine.toml"),
            Err(Error::Io(_))
        ));
    }
}
