use clap::Parser;
use log::{error, info};
use server::config::{parse_account, ServerConfig};
use server::network::Server;
use shared::{DEFAULT_TCP_PORT, DEFAULT_UDP_PORT};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind both sockets to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Reliable (TCP) port
    #[arg(short = 't', long, default_value_t = DEFAULT_TCP_PORT)]
    tcp_port: u16,

    /// Unreliable (UDP) port
    #[arg(short = 'u', long, default_value_t = DEFAULT_UDP_PORT)]
    udp_port: u16,

    /// Maximum number of connected clients
    #[arg(short = 'm', long, default_value = "64")]
    max_clients: usize,

    /// Lower bound of the readiness wait in milliseconds
    #[arg(long, default_value = "5")]
    min_update_ms: u64,

    /// Player store file; players are kept in memory when omitted
    #[arg(short = 's', long)]
    store: Option<PathBuf>,

    /// Account as <name>:<password>, repeatable
    #[arg(short = 'a', long = "account", value_parser = parse_account)]
    accounts: Vec<(String, String)>,

    /// Shared key for the wire transform, must match the clients
    #[arg(short = 'k', long)]
    key: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = ServerConfig {
        host: args.host,
        tcp_port: args.tcp_port,
        udp_port: args.udp_port,
        max_clients: args.max_clients,
        min_update_interval: Duration::from_millis(args.min_update_ms.max(1)),
        store_path: args.store,
        accounts: args.accounts,
        cipher_key: args.key,
        ..ServerConfig::default()
    };

    info!("Starting server...");
    info!("{} accounts configured", config.accounts.len());

    let (console_tx, console_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if console_tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Console read failed: {}", e);
                    break;
                }
            }
        }
    });

    let server = Server::bind(config).await?.with_console(console_rx);
    info!("Type 'help' for admin commands");
    server.run().await;

    Ok(())
}
