use shared::{ClientId, DecodeError, EncodeError};
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

use crate::store::StoreError;

/// Socket-level failures. Only `Bind` is fatal, and only at startup.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),
    #[error("failed to send to {client_id}: {source}")]
    Send {
        client_id: ClientId,
        #[source]
        source: io::Error,
    },
    #[error("failed to receive: {0}")]
    Receive(#[source] io::Error),
    #[error("failed to encode outbound frame: {0}")]
    Encode(#[from] EncodeError),
}

/// Failure of a single handler invocation, logged and contained by the router
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("malformed payload: {0}")]
    Decode(#[from] DecodeError),
    #[error("malformed reply: {0}")]
    Encode(#[from] EncodeError),
    #[error("no session for {0}")]
    UnknownSession(ClientId),
    #[error("{0} has not authenticated")]
    NotAuthenticated(ClientId),
    #[error("{0} has no world entity")]
    NotSpawned(ClientId),
    #[error("persistence failure: {0}")]
    Store(#[from] StoreError),
}

/// Startup failure of [`crate::network::Server`]
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to open player store: {0}")]
    Store(#[from] StoreError),
}
