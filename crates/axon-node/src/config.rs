//! Node configuration, loaded from environment variables over defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Stable identifier advertised in beacons.
    pub node_id: String,
    /// Address the HTTP API binds to.
    pub http_addr: SocketAddr,
    /// Address peers should dial for the API, as advertised in beacons.
    pub api_address: String,
    /// SQLite database file.
    pub db_path: PathBuf,
    /// Address the discovery beacon is sent to.
    pub beacon_target: SocketAddr,
    /// Address the discovery listener binds to.
    pub beacon_bind: SocketAddr,
    /// How often the beacon is broadcast.
    pub beacon_interval: Duration,
    /// Per-request timeout for outbound sync HTTP calls.
    pub request_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: uuid::Uuid::new_v4().to_string(),
            http_addr: ([0, 0, 0, 0], 8080).into(),
            api_address: "127.0.0.1:8080".to_string(),
            db_path: PathBuf::from("./axon.db"),
            beacon_target: ([255, 255, 255, 255], 9999).into(),
            beacon_bind: ([0, 0, 0, 0], 9999).into(),
            beacon_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(15),
        }
    }
}

impl NodeConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(id) = std::env::var("AXON_NODE_ID") {
            if !id.is_empty() {
                config.node_id = id;
            }
        }

        if let Ok(addr) = std::env::var("AXON_HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "invalid AXON_HTTP_ADDR, using default"),
            }
        }

        if let Ok(addr) = std::env::var("AXON_API_ADDRESS") {
            if !addr.is_empty() {
                config.api_address = addr;
            }
        }

        if let Ok(path) = std::env::var("AXON_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        if let Ok(addr) = std::env::var("AXON_BEACON_TARGET") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.beacon_target = parsed,
                Err(_) => {
                    tracing::warn!(value = %addr, "invalid AXON_BEACON_TARGET, using default")
                }
            }
        }

        if let Ok(addr) = std::env::var("AXON_BEACON_BIND") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.beacon_bind = parsed,
                Err(_) => tracing::warn!(value = %addr, "invalid AXON_BEACON_BIND, using default"),
            }
        }

        if let Ok(secs) = std::env::var("AXON_BEACON_INTERVAL_SECS") {
            if let Ok(n) = secs.parse::<u64>() {
                config.beacon_interval = Duration::from_secs(n.max(1));
            }
        }

        if let Ok(secs) = std::env::var("AXON_REQUEST_TIMEOUT_SECS") {
            if let Ok(n) = secs.parse::<u64>() {
                config.request_timeout = Duration::from_secs(n.max(1));
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = NodeConfig::default();
        assert_eq!(config.http_addr.port(), 8080);
        assert_eq!(config.beacon_interval, Duration::from_secs(5));
        assert!(!config.node_id.is_empty());
    }
}
