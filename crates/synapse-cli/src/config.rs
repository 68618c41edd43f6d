//! Run configuration loaded from a JSON file.
//!
//! The file is looked up from the `--config` flag, then from the
//! `SYNAPSE_CONFIG` environment variable. Without either, every section uses
//! its defaults. Sections and fields missing from the file keep their
//! defaults too.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use synapse_search::{
    CapacityModel, CostWeights, LibraryConfig, SearchConfig, SearchEnv, TargetType,
};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "SYNAPSE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config '{path}': {source}", path = path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub search: SearchConfig,
    pub weights: CostWeights,
    /// Capacity of the switch data plane.
    pub switch_capacity: CapacityModel,
    pub library: LibraryConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads the config named by `flag`, falling back to `SYNAPSE_CONFIG`.
    pub fn load(flag: Option<&Path>) -> Result<Config, ConfigError> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        match resolve_path(flag, from_env) {
            Some(path) => {
                tracing::debug!("loading config from {}", path.display());
                Config::from_file(&path)
            }
            None => Ok(Config::default()),
        }
    }

    /// The generator environment this config describes.
    pub fn env(&self) -> SearchEnv {
        SearchEnv::new(self.weights.clone())
            .with_placement(TargetType::Switch, Arc::new(self.switch_capacity.clone()))
            .with_library(self.library.clone())
    }
}

fn resolve_path(flag: Option<&Path>, from_env: Option<PathBuf>) -> Option<PathBuf> {
    flag.map(Path::to_path_buf).or(from_env)
}
