use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use crate::orchestrator::OrchestratorConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub provisioning: ProvisioningConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub flow: FlowConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("courier.db")
}

/// Filesystem provisioning configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProvisioningConfig {
    /// Directory under which per-job resource directories are created.
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
    /// Capacity of the provisioning handoff channel.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            channel_buffer: default_channel_buffer(),
        }
    }
}

fn default_root_dir() -> PathBuf {
    PathBuf::from("data/provisioned")
}

fn default_channel_buffer() -> usize {
    100
}

/// Remote dispatch configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchConfig {
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Base URL peers use to acknowledge our transfers, e.g.
    /// `http://10.0.0.5:8080`. Without it peers cannot acknowledge
    /// automatically.
    #[serde(default)]
    pub callback_address: Option<String>,
}

impl DispatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            callback_address: None,
        }
    }
}

fn default_timeout() -> u64 {
    30
}

/// Executor-side data flow configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FlowConfig {
    /// Register the filesystem copy controller.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Files peers may ask us to copy must live under this directory.
    #[serde(default = "default_source_root")]
    pub source_root: PathBuf,
    /// Copies may only be written under this directory.
    #[serde(default = "default_destination_root")]
    pub destination_root: PathBuf,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            source_root: default_source_root(),
            destination_root: default_destination_root(),
        }
    }
}

fn default_source_root() -> PathBuf {
    PathBuf::from("data/outbox")
}

fn default_destination_root() -> PathBuf {
    default_root_dir()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.database.path.to_str().unwrap(), "courier.db");
        assert_eq!(config.provisioning.root_dir.to_str().unwrap(), "data/provisioned");
        assert_eq!(config.dispatch.timeout(), Duration::from_secs(30));
        assert!(config.flow.enabled);
        assert_eq!(config.flow.source_root.to_str().unwrap(), "data/outbox");
        assert_eq!(config.flow.destination_root, config.provisioning.root_dir);
        assert_eq!(config.dispatch.callback_address, None);
        assert!(config.orchestrator.enabled);
    }

    #[test]
    fn test_deserialize_sections() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 9000

[database]
path = "/data/courier.sqlite"

[provisioning]
root_dir = "/srv/transfers"

[dispatch]
timeout_secs = 5
callback_address = "http://10.0.0.5:9000"

[flow]
enabled = false
source_root = "/srv/outbox"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
        assert_eq!(config.database.path.to_str().unwrap(), "/data/courier.sqlite");
        assert_eq!(config.provisioning.root_dir.to_str().unwrap(), "/srv/transfers");
        assert_eq!(config.provisioning.channel_buffer, 100);
        assert_eq!(config.dispatch.timeout_secs, 5);
        assert_eq!(
            config.dispatch.callback_address.as_deref(),
            Some("http://10.0.0.5:9000")
        );
        assert!(!config.flow.enabled);
        assert_eq!(config.flow.source_root.to_str().unwrap(), "/srv/outbox");
        assert_eq!(config.flow.destination_root.to_str().unwrap(), "data/provisioned");
    }

    #[test]
    fn test_deserialize_rejects_bad_port() {
        let toml = r#"
[server]
port = "eighty"
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }
}
