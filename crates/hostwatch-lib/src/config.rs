//! Configuration shared by the agent and the CLI
//!
//! Values come from built-in defaults, an optional file named by
//! `HOSTWATCH_CONFIG`, and `HOSTWATCH_*` environment variables, in
//! increasing order of precedence.

use crate::detector::{DetectorParams, DEFAULT_MAX_SAMPLES};
use crate::store::{validate_table_name, DEFAULT_TABLE_NAME};
use crate::training::TrainingConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an optional configuration file
pub const CONFIG_FILE_ENV: &str = "HOSTWATCH_CONFIG";

/// Host monitor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HostwatchConfig {
    /// Label attached to log events
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// SQLite database file
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Sample table name
    #[serde(default = "default_table_name")]
    pub table_name: String,

    /// Model bundle file
    #[serde(default = "default_bundle_path")]
    pub bundle_path: PathBuf,

    /// Sampling interval in seconds
    #[serde(default = "default_sample_interval")]
    pub sample_interval_secs: u64,

    /// Mount point whose disk usage is sampled
    #[serde(default = "default_disk_path")]
    pub disk_path: PathBuf,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_contamination")]
    pub contamination: f64,

    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,

    #[serde(default = "default_random_seed")]
    pub random_seed: u64,

    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
}

fn default_node_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/hostwatch.db")
}

fn default_table_name() -> String {
    DEFAULT_TABLE_NAME.to_string()
}

fn default_bundle_path() -> PathBuf {
    PathBuf::from("data/model_bundle.json")
}

fn default_sample_interval() -> u64 {
    10
}

fn default_disk_path() -> PathBuf {
    PathBuf::from("/")
}

fn default_api_port() -> u16 {
    8080
}

fn default_contamination() -> f64 {
    0.05
}

fn default_n_estimators() -> usize {
    100
}

fn default_random_seed() -> u64 {
    42
}

fn default_max_samples() -> usize {
    DEFAULT_MAX_SAMPLES
}

impl Default for HostwatchConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            db_path: default_db_path(),
            table_name: default_table_name(),
            bundle_path: default_bundle_path(),
            sample_interval_secs: default_sample_interval(),
            disk_path: default_disk_path(),
            api_port: default_api_port(),
            contamination: default_contamination(),
            n_estimators: default_n_estimators(),
            random_seed: default_random_seed(),
            max_samples: default_max_samples(),
        }
    }
}

impl HostwatchConfig {
    /// Load configuration from environment and config file
    pub fn load() -> Result<Self> {
        let file = std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from);
        Self::load_from(file.as_deref())
    }

    /// Load configuration with an explicit optional file
    pub fn load_from(file: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(::config::File::from(path).required(true));
        }
        let config = builder
            .add_source(::config::Environment::with_prefix("HOSTWATCH").try_parsing(true))
            .build()
            .context("Failed to read configuration")?;

        let loaded: HostwatchConfig = config
            .try_deserialize()
            .context("Failed to parse configuration")?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        self.detector_params()
            .validate()
            .context("Invalid detector configuration")?;
        if self.max_samples == 0 {
            anyhow::bail!("max_samples must be at least 1");
        }
        if self.sample_interval_secs == 0 {
            anyhow::bail!("sample_interval_secs must be greater than zero");
        }
        validate_table_name(&self.table_name).context("Invalid table_name")?;
        Ok(())
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs)
    }

    pub fn detector_params(&self) -> DetectorParams {
        DetectorParams {
            contamination: self.contamination,
            n_estimators: self.n_estimators,
            max_samples: self.max_samples,
            random_seed: self.random_seed,
        }
    }

    pub fn training_config(&self) -> TrainingConfig {
        TrainingConfig {
            params: self.detector_params(),
            bundle_path: self.bundle_path.clone(),
            node_name: self.node_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = HostwatchConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.table_name, "system_stats");
        assert_eq!(config.sample_interval(), Duration::from_secs(10));
        assert_eq!(config.detector_params(), DetectorParams::default());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("hostwatch.toml");
        fs::write(
            &path,
            "db_path = \"/tmp/stats.db\"\ncontamination = 0.1\nn_estimators = 50\n",
        )
        .unwrap();

        let config = HostwatchConfig::load_from(Some(&path)).unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/stats.db"));
        assert_eq!(config.contamination, 0.1);
        assert_eq!(config.n_estimators, 50);
        assert_eq!(config.random_seed, 42);
    }

    #[test]
    fn test_load_rejects_invalid_file_values() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("hostwatch.toml");
        fs::write(&path, "contamination = 0.7\n").unwrap();

        assert!(HostwatchConfig::load_from(Some(&path)).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = HostwatchConfig {
            n_estimators: 0,
            ..HostwatchConfig::default()
        };
        assert!(config.validate().is_err());

        config.n_estimators = 10;
        config.table_name = "stats; DROP TABLE x".to_string();
        assert!(config.validate().is_err());

        config.table_name = "stats".to_string();
        config.sample_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_training_config_mirrors_settings() {
        let config = HostwatchConfig {
            bundle_path: PathBuf::from("/tmp/bundle.json"),
            random_seed: 7,
            ..HostwatchConfig::default()
        };

        let training = config.training_config();

        assert_eq!(training.bundle_path, PathBuf::from("/tmp/bundle.json"));
        assert_eq!(training.params.random_seed, 7);
    }
}
