use shared::{DecodeError, EncodeError, MessageType};
use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed message from server: {0}")]
    Decode(#[from] DecodeError),
    #[error("failed to encode message: {0}")]
    Encode(#[from] EncodeError),
    #[error("no handshake reply after {attempts} attempts")]
    HandshakeTimeout { attempts: u32 },
    #[error("server closed the connection")]
    Closed,
    #[error("expected {expected:?} reply, got type byte {got}")]
    UnexpectedReply { expected: MessageType, got: u8 },
    #[error("no {message_type:?} reply within {timeout:?}")]
    Timeout {
        message_type: MessageType,
        timeout: Duration,
    },
}
