//! Message header, message types and frame encode/decode
//!
//! Frame layout, all fields little-endian and written one by one:
//!
//! ```text
//! +--------------+-----------------+-----------+------+-----------------+
//! | client id u32| sequence u64    | transport | type | payload ...     |
//! | 4 bytes      | 8 bytes         | 1 byte    | 1 b  | variable        |
//! +--------------+-----------------+-----------+------+-----------------+
//! ```

use crate::codec::{DecodeError, EncodeError, Payload};
use crate::MAX_FRAME_SIZE;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-assigned identity of a connection, also the key of its world entity
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct ClientId(pub u32);

impl ClientId {
    /// Identity carried by frames sent before the handshake assigned one
    pub const UNASSIGNED: ClientId = ClientId(0);
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Reliable,
    Unreliable,
}

impl Transport {
    pub fn to_byte(self) -> u8 {
        match self {
            Transport::Reliable => 0,
            Transport::Unreliable => 1,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, DecodeError> {
        match byte {
            0 => Ok(Transport::Reliable),
            1 => Ok(Transport::Unreliable),
            other => Err(DecodeError::InvalidTransport(other)),
        }
    }
}

/// Known message types. The wire carries the raw byte so that peers can
/// receive types they do not know about and ignore them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    None = 0,
    Connect = 1,
    Disconnect = 2,
    Command = 3,
    Authenticate = 4,
    Spawn = 5,
    Action = 6,
    GetWorldState = 7,
    InputStateUpdate = 8,
    StatsUpdate = 9,
    CreateEntity = 10,
    DestroyEntity = 11,
    WorldState = 12,
}

impl MessageType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        let ty = match byte {
            0 => MessageType::None,
            1 => MessageType::Connect,
            2 => MessageType::Disconnect,
            3 => MessageType::Command,
            4 => MessageType::Authenticate,
            5 => MessageType::Spawn,
            6 => MessageType::Action,
            7 => MessageType::GetWorldState,
            8 => MessageType::InputStateUpdate,
            9 => MessageType::StatsUpdate,
            10 => MessageType::CreateEntity,
            11 => MessageType::DestroyEntity,
            12 => MessageType::WorldState,
            _ => return None,
        };
        Some(ty)
    }

    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Channel this type always travels on, identical on both peers
    pub fn transport(self) -> Transport {
        match self {
            MessageType::None
            | MessageType::Connect
            | MessageType::Disconnect
            | MessageType::Command
            | MessageType::Authenticate
            | MessageType::CreateEntity
            | MessageType::DestroyEntity => Transport::Reliable,
            MessageType::Spawn
            | MessageType::Action
            | MessageType::GetWorldState
            | MessageType::InputStateUpdate
            | MessageType::StatsUpdate
            | MessageType::WorldState => Transport::Unreliable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub client_id: ClientId,
    pub sequence: u64,
    pub transport: Transport,
    /// Raw type byte, see [`MessageType::from_byte`]
    pub message_type: u8,
}

impl Header {
    pub const SIZE: usize = 4 + 8 + 1 + 1;

    pub fn new(client_id: ClientId, sequence: u64, message_type: MessageType) -> Self {
        Self {
            client_id,
            sequence,
            transport: message_type.transport(),
            message_type: message_type.to_byte(),
        }
    }

    pub fn kind(&self) -> Option<MessageType> {
        MessageType::from_byte(self.message_type)
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.client_id.0.to_le_bytes());
        out.extend_from_slice(&self.sequence.to_le_bytes());
        out.push(self.transport.to_byte());
        out.push(self.message_type);
    }

    fn read_from(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut id = [0u8; 4];
        id.copy_from_slice(&bytes[0..4]);
        let mut sequence = [0u8; 8];
        sequence.copy_from_slice(&bytes[4..12]);
        Ok(Self {
            client_id: ClientId(u32::from_le_bytes(id)),
            sequence: u64::from_le_bytes(sequence),
            transport: Transport::from_byte(bytes[12])?,
            message_type: bytes[13],
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub payload: Payload,
}

impl Message {
    pub fn new(header: Header, payload: Payload) -> Self {
        Self { header, payload }
    }

    pub fn kind(&self) -> Option<MessageType> {
        self.header.kind()
    }

    /// Header bytes followed by payload bytes
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let size = Header::SIZE + self.payload.len();
        if size > MAX_FRAME_SIZE {
            return Err(EncodeError::FrameTooLarge {
                size,
                max: MAX_FRAME_SIZE,
            });
        }
        let mut out = Vec::with_capacity(size);
        self.header.write_to(&mut out);
        out.extend_from_slice(self.payload.as_bytes());
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < Header::SIZE {
            return Err(DecodeError::Truncated {
                len: bytes.len(),
                header: Header::SIZE,
            });
        }
        if bytes.len() > MAX_FRAME_SIZE {
            return Err(DecodeError::FrameTooLarge {
                size: bytes.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        let header = Header::read_from(&bytes[..Header::SIZE])?;
        let payload = Payload::from_bytes(bytes[Header::SIZE..].to_vec());
        Ok(Self { header, payload })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    MoveForward,
    MoveBackward,
    MoveLeft,
    MoveRight,
    Attack,
}

impl ActionType {
    pub fn to_byte(self) -> u8 {
        match self {
            ActionType::MoveForward => 0,
            ActionType::MoveBackward => 1,
            ActionType::MoveLeft => 2,
            ActionType::MoveRight => 3,
            ActionType::Attack => 4,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, DecodeError> {
        match byte {
            0 => Ok(ActionType::MoveForward),
            1 => Ok(ActionType::MoveBackward),
            2 => Ok(ActionType::MoveLeft),
            3 => Ok(ActionType::MoveRight),
            4 => Ok(ActionType::Attack),
            value => Err(DecodeError::InvalidValue {
                field: "action type",
                value,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    Begin,
    End,
}

impl ActionState {
    pub fn to_byte(self) -> u8 {
        match self {
            ActionState::Begin => 0,
            ActionState::End => 1,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, DecodeError> {
        match byte {
            0 => Ok(ActionState::Begin),
            1 => Ok(ActionState::End),
            value => Err(DecodeError::InvalidValue {
                field: "action state",
                value,
            }),
        }
    }
}

/// Result code of an Authenticate reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthResult {
    Valid,
    InvalidUsername,
    InvalidPassword,
    AlreadyLoggedIn,
}

impl AuthResult {
    pub fn to_byte(self) -> u8 {
        match self {
            AuthResult::Valid => 0,
            AuthResult::InvalidUsername => 1,
            AuthResult::InvalidPassword => 2,
            AuthResult::AlreadyLoggedIn => 3,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, DecodeError> {
        match byte {
            0 => Ok(AuthResult::Valid),
            1 => Ok(AuthResult::InvalidUsername),
            2 => Ok(AuthResult::InvalidPassword),
            3 => Ok(AuthResult::AlreadyLoggedIn),
            value => Err(DecodeError::InvalidValue {
                field: "auth result",
                value,
            }),
        }
    }
}
