//! Pipeline configuration
//!
//! Loaded from YAML with every field defaulted; the CLI layers flags and
//! `TRIALGRAPH_*` environment variables on top.

use crate::rules::{RuleResult, RuleTable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// What to do with a record the cleaner rejects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Log a warning, count it, continue
    #[default]
    Skip,
    /// Fail the run
    Abort,
}

impl FromStr for MalformedPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(MalformedPolicy::Skip),
            "abort" => Ok(MalformedPolicy::Abort),
            other => Err(ConfigError::Invalid(format!(
                "on_malformed must be 'skip' or 'abort', got {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for MalformedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedPolicy::Skip => write!(f, "skip"),
            MalformedPolicy::Abort => write!(f, "abort"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Records per load transaction
    pub batch_size: usize,
    /// Maximum number of raw records to read
    pub limit: Option<usize>,
    pub on_malformed: MalformedPolicy,
    /// Clean each chunk with rayon
    pub parallel_clean: bool,
    /// Rule table YAML; built-in table when absent
    pub rules_path: Option<PathBuf>,
    /// WAL directory; in-memory graph when absent
    pub data_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            limit: None,
            on_malformed: MalformedPolicy::Skip,
            parallel_clean: true,
            rules_path: None,
            data_dir: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        Ok(())
    }

    /// The configured rule table, or the built-in one
    pub fn load_rules(&self) -> RuleResult<RuleTable> {
        match &self.rules_path {
            Some(path) => RuleTable::from_path(path),
            None => Ok(RuleTable::default()),
        }
    }
}
