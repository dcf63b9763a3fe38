use shared::{DEFAULT_TCP_PORT, DEFAULT_UDP_PORT};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_tcp: SocketAddr,
    pub server_udp: SocketAddr,
    /// Connect messages sent before giving up
    pub handshake_attempts: u32,
    /// Wait for a Connect reply per attempt
    pub handshake_timeout: Duration,
    /// Wait for the reply to an authenticate or world state request
    pub reply_timeout: Duration,
    /// Must match the server's key
    pub cipher_key: Option<String>,
}

impl ClientConfig {
    /// Server at `host` on its two ports
    pub fn for_server(host: IpAddr, tcp_port: u16, udp_port: u16) -> Self {
        Self {
            server_tcp: SocketAddr::new(host, tcp_port),
            server_udp: SocketAddr::new(host, udp_port),
            ..Self::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        let localhost = IpAddr::V4(Ipv4Addr::LOCALHOST);
        Self {
            server_tcp: SocketAddr::new(localhost, DEFAULT_TCP_PORT),
            server_udp: SocketAddr::new(localhost, DEFAULT_UDP_PORT),
            handshake_attempts: 5,
            handshake_timeout: Duration::from_secs(1),
            reply_timeout: Duration::from_secs(2),
            cipher_key: None,
        }
    }
}
