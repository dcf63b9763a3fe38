//! # Realm Client Library
//!
//! Headless client for the realm server. It connects over both channels,
//! performs the handshake and keeps a local mirror of the entities the
//! server reports.
//!
//! ## Architecture Overview
//!
//! ### Authoritative Server
//! The client never simulates. It sends actions and renders whatever the
//! server broadcasts back, so the mirror in [`game::ClientGameState`] is only
//! ever updated from server events.
//!
//! ### Two Channels
//! Every message type has a fixed channel. Control traffic (handshake,
//! authentication, commands, entity creation and removal) uses the stream;
//! gameplay traffic uses datagrams. Datagrams from the server carry
//! increasing sequence numbers and stale ones are dropped.
//!
//! ### Bounded Handshake
//! [`network::Client::connect`] advertises the local datagram port and waits
//! for the assigned identity, retrying a fixed number of times before giving
//! up with [`error::ClientError::HandshakeTimeout`].
//!
//! ## Module Organization
//!
//! - `network`: sockets, handshake, sequencing and typed request helpers
//! - `events`: parsing server messages into [`events::ServerEvent`]
//! - `game`: the local entity mirror
//! - `input`: console lines to actions
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::config::ClientConfig;
//! use client::network::Client;
//! use shared::{ActionState, ActionType, AuthResult};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::connect(&ClientConfig::default()).await?;
//!     if client.authenticate("gary", "password").await? == AuthResult::Valid {
//!         client.spawn().await?;
//!         client.action(ActionType::MoveForward, ActionState::Begin).await?;
//!     }
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod game;
pub mod input;
pub mod network;

pub use config::ClientConfig;
pub use error::ClientError;
pub use events::ServerEvent;
pub use network::Client;
