//! Configuration loading and validation.

pub mod dsn;
mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Variable naming the DuckDB database file.
pub const DUCKDB_PATH_VAR: &str = "DUCKDB_PATH";

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Self::from_yaml_with_lookup(yaml, |key| std::env::var(key).ok())
    }

    /// Parse YAML, normalizing the target host when `lookup` reports the managed network.
    pub fn from_yaml_with_lookup<F>(yaml: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: Config = serde_yaml::from_str(yaml)?;
        if dsn::is_managed_network(&lookup) {
            config.target.url = dsn::normalize_db_url(&config.target.url);
        }
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// The target URL is resolved and, on the managed network, host-normalized.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = lookup(DUCKDB_PATH_VAR)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DUCKDB_PATH));

        let config = Config {
            source: SourceConfig { path },
            target: TargetConfig {
                url: dsn::normalized_target_url(&lookup),
                ..TargetConfig::default()
            },
            etl: EtlConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// SHA256 fingerprint of the configuration, recorded on run reports.
    pub fn hash(&self) -> String {
        let yaml = serde_yaml::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl SourceConfig {
    /// Identifier written to `etl_log.source_db`.
    pub fn source_label(&self) -> String {
        self.path.display().to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            target: TargetConfig::default(),
            etl: EtlConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_yaml_applies_defaults() {
        let config = Config::from_yaml("target:\n  url: postgresql://db.example.com/x\n").unwrap();
        assert_eq!(config.source.path, PathBuf::from(DEFAULT_DUCKDB_PATH));
        assert_eq!(config.target.ssl_mode, "disable");
        assert_eq!(config.etl.batch_size, DEFAULT_BATCH_SIZE);
        assert!(config.etl.verify_after_load);
    }

    #[test]
    fn test_from_yaml_rejects_zero_batch() {
        let err = Config::from_yaml("etl:\n  batch_size: 0\n").unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_from_yaml_normalizes_host_on_managed_network() {
        let yaml = "target:\n  url: postgresql://u:p@stafferfi-postgres:5432/ecfr\n";

        let local = Config::from_yaml_with_lookup(yaml, |_| None).unwrap();
        assert_eq!(local.target.url, "postgresql://u:p@stafferfi-postgres:5432/ecfr");

        let managed = Config::from_yaml_with_lookup(yaml, |key| match key {
            "FLY_APP_NAME" => Some("stafferfi".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(
            managed.target.url,
            "postgresql://u:p@stafferfi-postgres.internal:5432/ecfr"
        );
    }

    #[test]
    fn test_from_lookup_reads_duckdb_path() {
        let config = Config::from_lookup(|key| match key {
            "DUCKDB_PATH" => Some("/data/lake.duckdb".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.source.path, PathBuf::from("/data/lake.duckdb"));
        assert_eq!(config.target.url, DEFAULT_TARGET_URL);
    }

    #[test]
    fn test_hash_is_stable() {
        let a = Config::default();
        let b = Config::default();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash().len(), 64);
    }
}
