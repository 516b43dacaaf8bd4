use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::rules::RulesConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub transport: TransportConfig,
    pub storage: StorageConfig,
    pub rules: RulesConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address for the HTTP API server to listen on
    pub http_addr: SocketAddr,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    Mqtt {
        /// Broker host
        host: String,
        /// Broker port
        port: u16,
        /// Client id presented to the broker
        client_id: String,
    },
    Mock {
        /// Number of simulated devices
        device_count: usize,
        /// Interval in seconds between simulated message bursts
        interval_secs: u64,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    Memory,
    Sqlite { path: PathBuf },
}

impl Config {
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                http_addr: "0.0.0.0:8080".parse().unwrap(),
            },
            transport: TransportConfig::Mqtt {
                host: "127.0.0.1".to_string(),
                port: 1883,
                client_id: "fleetwatch-ingest".to_string(),
            },
            storage: StorageConfig::Memory,
            rules: RulesConfig::default(),
        }
    }
}
