//! Command line and configuration file handling

use clap::Parser;

use swarmq_common::{load_config, DirectoryConfig, Result};

/// swarmq-directory command line arguments. Every flag is optional:
/// command line beats the config file, which beats built-in defaults.
#[derive(Parser, Debug, Default)]
#[command(name = "swarmq-directory", version)]
#[command(about = "SwarmQ service discovery daemon")]
pub struct Args {
    /// Path to a TOML config file
    #[arg(long)]
    pub config: Option<String>,

    /// <addr>:<port> to listen on for TCP producers
    #[arg(long)]
    pub tcp_address: Option<String>,

    /// <addr>:<port> to listen on for HTTP clients
    #[arg(long)]
    pub http_address: Option<String>,

    /// Address of this directory node advertised to peers (defaults to the OS hostname)
    #[arg(long)]
    pub broadcast_address: Option<String>,

    /// Time (ms) a producer stays in the active list since its last ping
    #[arg(long)]
    pub inactive_producer_timeout: Option<u64>,

    /// Time (ms) a tombstoned producer stays hidden from lookups
    #[arg(long)]
    pub tombstone_lifetime: Option<u64>,

    /// Log verbosity: trace, debug, info, warn or error
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log message prefix
    #[arg(long)]
    pub log_prefix: Option<String>,
}

impl Args {
    /// Resolve the effective configuration: defaults, then the config file,
    /// then explicit flags.
    pub fn resolve(self) -> Result<DirectoryConfig> {
        let mut config = match &self.config {
            Some(path) => load_config::<DirectoryConfig>(path)?,
            None => DirectoryConfig::default(),
        };

        if let Some(v) = self.tcp_address {
            config.tcp_address = v;
        }
        if let Some(v) = self.http_address {
            config.http_address = v;
        }
        if let Some(v) = self.broadcast_address {
            config.broadcast_address = v;
        }
        if let Some(v) = self.inactive_producer_timeout {
            config.inactive_producer_timeout = v;
        }
        if let Some(v) = self.tombstone_lifetime {
            config.tombstone_lifetime = v;
        }
        if let Some(v) = self.log_level {
            config.base.log_level = v;
        }
        if let Some(v) = self.log_prefix {
            config.base.log_prefix = v;
        }

        Ok(config)
    }
}
