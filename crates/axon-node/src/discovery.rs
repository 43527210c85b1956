//! UDP beacon discovery.
//!
//! Every node periodically broadcasts a one-line beacon
//! `node_id|full_hash|api_address|local_ip` and listens for beacons
//! from others. A beacon advertising a different full hash triggers an
//! outbound sync session against the sender's API address.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;

use crate::node::Node;

/// One parsed beacon line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Beacon {
    pub node_id: String,
    pub full_hash: String,
    pub api_address: String,
    pub local_ip: String,
}

impl Beacon {
    pub fn to_line(&self) -> String {
        format!(
            "{}|{}|{}|{}\n",
            self.node_id, self.full_hash, self.api_address, self.local_ip
        )
    }

    /// Parse a `node_id|full_hash|api_address|local_ip` line.
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.trim().split('|');
        let node_id = fields.next()?.to_string();
        let full_hash = fields.next()?.to_string();
        let api_address = fields.next()?.to_string();
        let local_ip = fields.next()?.to_string();
        if fields.next().is_some() || node_id.is_empty() || api_address.is_empty() {
            return None;
        }
        Some(Self {
            node_id,
            full_hash,
            api_address,
            local_ip,
        })
    }
}

/// Bind the shared discovery socket with broadcast enabled.
pub async fn bind_socket(addr: SocketAddr) -> std::io::Result<Arc<UdpSocket>> {
    let socket = UdpSocket::bind(addr).await?;
    socket.set_broadcast(true)?;
    Ok(Arc::new(socket))
}

/// Broadcast this node's beacon on a fixed interval, refreshing the
/// advertised hash each tick.
pub async fn broadcast_loop(node: Arc<Node>, socket: Arc<UdpSocket>) {
    let target = node.config.beacon_target;
    let local_ip = local_ip().unwrap_or_else(|| "127.0.0.1".to_string());
    let mut ticker = tokio::time::interval(node.config.beacon_interval);

    tracing::info!(%target, "starting beacon broadcast");
    loop {
        ticker.tick().await;
        let full_hash = match node.store.database_hashes().await {
            Ok(hashes) => hashes.full,
            Err(e) => {
                tracing::warn!(error = %e, "skipping beacon, hash unavailable");
                continue;
            }
        };
        let beacon = Beacon {
            node_id: node.config.node_id.clone(),
            full_hash,
            api_address: node.config.api_address.clone(),
            local_ip: local_ip.clone(),
        };
        if let Err(e) = socket.send_to(beacon.to_line().as_bytes(), target).await {
            tracing::warn!(error = %e, "beacon send failed");
        }
    }
}

/// Listen for peer beacons and trigger an outbound session whenever a
/// peer advertises a different full hash. Self-beacons are ignored.
pub async fn listen_loop(node: Arc<Node>, socket: Arc<UdpSocket>) {
    let mut buffer = [0u8; 4096];
    tracing::info!(addr = %node.config.beacon_bind, "listening for peer beacons");

    loop {
        let (len, src) = match socket.recv_from(&mut buffer).await {
            Ok(received) => received,
            Err(e) => {
                tracing::warn!(error = %e, "beacon receive failed");
                continue;
            }
        };
        let Ok(line) = std::str::from_utf8(&buffer[..len]) else {
            continue;
        };
        let Some(beacon) = Beacon::parse(line) else {
            tracing::debug!(%src, "ignoring malformed beacon");
            continue;
        };
        if beacon.node_id == node.config.node_id {
            continue;
        }

        let ours = match node.store.database_hashes().await {
            Ok(hashes) => hashes.full,
            Err(e) => {
                tracing::warn!(error = %e, "hash unavailable, ignoring beacon");
                continue;
            }
        };
        if beacon.full_hash == ours {
            continue;
        }

        tracing::info!(peer = %beacon.api_address, "peer hash differs, syncing");
        let node = Arc::clone(&node);
        tokio::spawn(async move {
            match node.sync_with(&beacon.api_address).await {
                Ok(report) => tracing::info!(
                    peer = %beacon.api_address,
                    outcome = ?report.outcome,
                    rounds = report.rounds,
                    "sync session done"
                ),
                Err(e) => tracing::warn!(
                    peer = %beacon.api_address,
                    error = %e,
                    "sync session failed"
                ),
            }
        });
    }
}

/// Best-effort local IP discovery: the address a UDP socket would use
/// to reach a public host. No packets are sent.
fn local_ip() -> Option<String> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    Some(socket.local_addr().ok()?.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beacon_line_roundtrip() {
        let beacon = Beacon {
            node_id: "node-1".into(),
            full_hash: "abc123".into(),
            api_address: "10.0.0.5:8080".into(),
            local_ip: "10.0.0.5".into(),
        };
        let parsed = Beacon::parse(&beacon.to_line()).unwrap();
        assert_eq!(parsed, beacon);
    }

    #[test]
    fn parse_rejects_malformed_lines() {
        assert!(Beacon::parse("").is_none());
        assert!(Beacon::parse("only|three|fields").is_none());
        assert!(Beacon::parse("a|b|c|d|extra").is_none());
        assert!(Beacon::parse("|hash|addr|ip").is_none());
    }
}
