use shared::{DEFAULT_TCP_PORT, DEFAULT_UDP_PORT};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings of the server. The binary fills this from the command line.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    /// Reliable listening port, 0 for an ephemeral one
    pub tcp_port: u16,
    /// Connectionless port, 0 for an ephemeral one
    pub udp_port: u16,
    pub max_clients: usize,
    /// Lower bound of the readiness wait so the loop never busy-spins
    pub min_update_interval: Duration,
    /// Reliable writes that stall longer than this disconnect the peer
    pub write_timeout: Duration,
    /// File backing the player store; in-memory when absent
    pub store_path: Option<PathBuf>,
    /// Seed credentials as `(username, password)`
    pub accounts: Vec<(String, String)>,
    pub cipher_key: Option<String>,
}

impl ServerConfig {
    pub fn tcp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.tcp_port)
    }

    pub fn udp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.udp_port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            tcp_port: DEFAULT_TCP_PORT,
            udp_port: DEFAULT_UDP_PORT,
            max_clients: 64,
            min_update_interval: Duration::from_millis(5),
            write_timeout: Duration::from_secs(2),
            store_path: None,
            accounts: Vec::new(),
            cipher_key: None,
        }
    }
}

/// Parses `name:password`
pub fn parse_account(raw: &str) -> Result<(String, String), String> {
    match raw.split_once(':') {
        Some((name, password)) if !name.is_empty() => {
            Ok((name.to_string(), password.to_string()))
        }
        _ => Err(format!("expected <name>:<password>, got '{}'", raw)),
    }
}
