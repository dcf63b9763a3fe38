//! # Realm Server Library
//!
//! Authoritative server for a small multiplayer world. It owns the canonical
//! entity state, accepts client traffic on a reliable stream channel and an
//! unreliable datagram channel, and keeps every client's view consistent by
//! broadcasting changes.
//!
//! ## Architecture
//!
//! ### Single-Task Control Loop
//! One task owns every socket, the session table and the world. Each
//! iteration of [`network::Server::step`]:
//! 1. waits, bounded by a timeout, for one I/O source to become ready
//! 2. dispatches every inbound message through the [`router::MessageRouter`]
//! 3. runs the scheduled systems
//! 4. executes queued admin commands
//! 5. writes the outbound queue
//! 6. tears down clients that disconnected during the iteration
//!
//! Nothing is shared across threads, so the core needs no locks.
//!
//! ### Two Channels
//! Control traffic (handshake, authentication, entity creation and removal)
//! travels over the stream. Gameplay traffic (actions, input and stats
//! updates, world state) travels as datagrams. Datagram senders are
//! resolved through the endpoint bound during the handshake, and stale or
//! duplicate datagrams are rejected by sequence number.
//!
//! ### Deferred Disconnects
//! A disconnect is requested during the iteration and applied after the
//! outbound queue was flushed. Handlers and systems therefore never observe
//! a half-removed client.
//!
//! ## Module Organization
//!
//! - `session`: per-connection state and datagram endpoint resolution
//! - `transport`: socket multiplexing, header validation and sending
//! - `router` / `handlers`: per-type dispatch of inbound messages
//! - `scheduler` / `systems`: every-tick and interval simulation
//! - `world`: component tables keyed by client identity
//! - `store` / `login` / `shell`: persistence, credentials and admin commands
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         accounts: vec![("gary".to_string(), "password".to_string())],
//!         ..ServerConfig::default()
//!     };
//!     let server = Server::bind(config).await?;
//!     server.run().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod login;
pub mod network;
pub mod router;
pub mod scheduler;
pub mod session;
pub mod shell;
pub mod store;
pub mod systems;
pub mod transport;
pub mod world;

pub use config::ServerConfig;
pub use error::{HandlerError, ServerError, TransportError};
pub use network::Server;
pub use store::{FileStore, MemoryStore, PlayerRecord, PlayerStore, StoreError};
