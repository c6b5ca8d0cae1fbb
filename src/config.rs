//! On-disk configuration (§10.4).
//!
//! spec.md does not define a configuration file; every field here is a
//! tunable a production deployment needs but the core algorithm does not
//! dictate. Missing file or missing section both fall back to defaults,
//! matching the teacher's `ManifoldConfig::load` shape.

use std::path::Path;

use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SakDbConfig {
    /// Namespace branch defaults.
    pub namespace: NamespaceConfig,
    /// Sync engine remote list.
    pub sync: SyncConfig,
    /// Fallback commit signature.
    pub signature: SignatureConfig,
}

impl Default for SakDbConfig {
    fn default() -> Self {
        Self { namespace: NamespaceConfig::default(), sync: SyncConfig::default(), signature: SignatureConfig::default() }
    }
}

/// `[namespace]` section.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct NamespaceConfig {
    /// Default namespace branch name (§3 Branch layout).
    pub branch: String,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self { branch: "master".to_owned() }
    }
}

/// `[sync]` section.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Remote names touched by `SyncEngine::sync` (§4.7).
    pub remotes: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { remotes: vec!["origin".to_owned()] }
    }
}

/// `[signature]` section.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SignatureConfig {
    /// Commit author/committer name. Empty defers to the repository's
    /// configured default (§6).
    pub name: String,
    /// Commit author/committer email. Empty defers to the repository's
    /// configured default.
    pub email: String,
}

impl SakDbConfig {
    /// Load configuration from `path`, falling back to defaults if the file
    /// does not exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read, or if its
    /// contents are not valid TOML matching this schema.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(toml::from_str(&contents)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }
}

/// Errors from [`SakDbConfig::load`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// The file's contents did not parse as valid configuration.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = SakDbConfig::load(Path::new("/nonexistent/sakdb.toml")).unwrap();
        assert_eq!(cfg, SakDbConfig::default());
    }

    #[test]
    fn parses_partial_sections() {
        let cfg: SakDbConfig = toml::from_str("[namespace]\nbranch = \"main\"\n").unwrap();
        assert_eq!(cfg.namespace.branch, "main");
        assert_eq!(cfg.sync.remotes, vec!["origin".to_owned()]);
    }
}
