//! Configuration management

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SwarmError};

/// Base configuration shared by every SwarmQ component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseConfig {
    /// Log level
    pub log_level: String,
    /// Prefix prepended to every log line
    pub log_prefix: String,
    /// Statsd address
    pub statsd_address: Option<String>,
    /// Statsd prefix
    pub statsd_prefix: String,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_prefix: "[swarmq] ".to_string(),
            statsd_address: None,
            statsd_prefix: "swarmq".to_string(),
        }
    }
}

/// Directory daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    #[serde(flatten)]
    pub base: BaseConfig,

    /// TCP address to listen on for producers
    pub tcp_address: String,
    /// HTTP address to listen on for queries and admin actions
    pub http_address: String,
    /// Address of this directory node advertised in IDENTIFY responses
    pub broadcast_address: String,

    /// Time (ms) a producer stays in the active list since its last ping
    pub inactive_producer_timeout: u64,
    /// Time (ms) a tombstoned producer stays hidden from lookups
    pub tombstone_lifetime: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base: BaseConfig {
                log_prefix: "[swarmq-directory] ".to_string(),
                statsd_prefix: "swarmq-directory".to_string(),
                ..BaseConfig::default()
            },
            tcp_address: "0.0.0.0:4160".to_string(),
            http_address: "0.0.0.0:4161".to_string(),
            broadcast_address: default_hostname(),
            inactive_producer_timeout: 300 * 1000, // 5 minutes
            tombstone_lifetime: 45 * 1000,         // 45 seconds
        }
    }
}

/// The OS hostname, used as the default broadcast address.
pub fn default_hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

/// Load configuration from a TOML file, overlaying the type's defaults.
pub fn load_config<T>(path: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let settings = config::Config::builder()
        .add_source(config::File::with_name(path))
        .add_source(config::Environment::with_prefix("SWARMQ"))
        .build()
        .map_err(|e| SwarmError::Config(e.to_string()))?;

    settings
        .try_deserialize()
        .map_err(|e| SwarmError::Config(e.to_string()))
}
