//! Wire protocol, components and constants shared by server and client

pub mod cipher;
pub mod codec;
pub mod components;
pub mod framing;
pub mod protocol;
pub mod sequence;

pub use cipher::{cipher_for_key, Cipher, Direction, IdentityCipher, XorCipher};
pub use codec::{DecodeError, EncodeError, Payload, Serializable};
pub use components::{
    Bounds, CooldownTimer, EntitySnapshot, Facing, InputState, Name, Position, StatBlock, Stats,
};
pub use framing::{frame, FrameBuffer};
pub use protocol::{
    ActionState, ActionType, AuthResult, ClientId, Header, Message, MessageType, Transport,
};
pub use sequence::{SequenceCounter, SequenceWindow};

/// Largest encoded frame, header included
pub const MAX_FRAME_SIZE: usize = 32 * 1024;

pub const DEFAULT_TCP_PORT: u16 = 4000;
pub const DEFAULT_UDP_PORT: u16 = 4001;

/// World units per second along each axis
pub const PLAYER_SPEED: f32 = 120.0;
/// Side length of an entity's collision box
pub const ENTITY_SIZE: f32 = 32.0;
/// Depth of the box swept in front of an attacker
pub const ATTACK_RANGE: f32 = 32.0;
pub const ATTACK_DAMAGE: i32 = 10_000;
/// Milliseconds between two attacks
pub const ATTACK_COOLDOWN_MS: u32 = 500;

pub const WORLD_WIDTH: f32 = 800.0;
pub const WORLD_HEIGHT: f32 = 600.0;
pub const DEFAULT_INSTANCE: u32 = 0;
