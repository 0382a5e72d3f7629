//! Agent configuration (ambient stack, not part of the SHDLC core):
//! the YAML-shaped file named in spec.md §6.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeriesConfig {
    pub measurement: String,
}

/// Recognised keys: `database`, `SensirionSPS30`, `DHT22` (optional — the
/// DHT22 read path itself is out of scope here, but the two sensors
/// share one config file, so its key must still round-trip).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(rename = "SensirionSPS30")]
    pub sensirion_sps30: SeriesConfig,
    #[serde(rename = "DHT22")]
    pub dht22: Option<SeriesConfig>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}
