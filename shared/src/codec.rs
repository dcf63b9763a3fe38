//! Payload byte layout shared by both peers
//!
//! A payload is an ordered byte sequence built by appending primitives in
//! declaration order. All integers are little-endian, floats travel as their
//! IEEE bit pattern, booleans as a one-byte sentinel and strings as a `u16`
//! byte length followed by UTF-8. Reading advances a cursor that can never
//! pass the end of the buffer.

use crate::protocol::ClientId;
use thiserror::Error;

/// Sentinel byte written for `true`
const TRUE_SENTINEL: u8 = 1;
/// Sentinel byte written for `false`
const FALSE_SENTINEL: u8 = 0;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame of {len} bytes is shorter than the {header}-byte header")]
    Truncated { len: usize, header: usize },
    #[error("read of {needed} bytes at offset {offset} exceeds payload length {len}")]
    OutOfBounds {
        needed: usize,
        offset: usize,
        len: usize,
    },
    #[error("frame of {size} bytes exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },
    #[error("invalid transport byte {0}")]
    InvalidTransport(u8),
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,
    #[error("invalid {field} value {value}")]
    InvalidValue { field: &'static str, value: u8 },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("encoded frame of {size} bytes exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },
    #[error("string of {0} bytes does not fit a u16 length prefix")]
    StringTooLong(usize),
}

/// Variable part of a message with an append side and a read cursor
#[derive(Debug, Clone, Default)]
pub struct Payload {
    bytes: Vec<u8>,
    cursor: usize,
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for Payload {}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes, cursor: 0 }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Bytes left between the cursor and the end of the payload
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.cursor
    }

    /// Moves the read cursor back to the first byte
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    pub fn write_bool(&mut self, value: bool) -> &mut Self {
        self.bytes.push(if value {
            TRUE_SENTINEL
        } else {
            FALSE_SENTINEL
        });
        self
    }

    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.bytes.push(value);
        self
    }

    pub fn write_u16(&mut self, value: u16) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn write_u32(&mut self, value: u32) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn write_u64(&mut self, value: u64) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn write_i32(&mut self, value: i32) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn write_f32(&mut self, value: f32) -> &mut Self {
        self.write_u32(value.to_bits())
    }

    pub fn write_f64(&mut self, value: f64) -> &mut Self {
        self.write_u64(value.to_bits())
    }

    pub fn write_id(&mut self, id: ClientId) -> &mut Self {
        self.write_u32(id.0)
    }

    pub fn write_str(&mut self, value: &str) -> Result<&mut Self, EncodeError> {
        let len = u16::try_from(value.len()).map_err(|_| EncodeError::StringTooLong(value.len()))?;
        self.write_u16(len);
        self.bytes.extend_from_slice(value.as_bytes());
        Ok(self)
    }

    fn take(&mut self, needed: usize) -> Result<&[u8], DecodeError> {
        if needed > self.remaining() {
            return Err(DecodeError::OutOfBounds {
                needed,
                offset: self.cursor,
                len: self.bytes.len(),
            });
        }
        let start = self.cursor;
        self.cursor += needed;
        Ok(&self.bytes[start..self.cursor])
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        match self.read_u8()? {
            FALSE_SENTINEL => Ok(false),
            TRUE_SENTINEL => Ok(true),
            value => Err(DecodeError::InvalidValue {
                field: "bool",
                value,
            }),
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    pub fn read_id(&mut self) -> Result<ClientId, DecodeError> {
        Ok(ClientId(self.read_u32()?))
    }

    pub fn read_str(&mut self) -> Result<String, DecodeError> {
        let len = self.read_u16()? as usize;
        let raw = self.take(len)?.to_vec();
        String::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8)
    }
}

/// A value with a fixed payload representation
///
/// `decode` must consume exactly the bytes `encode` appended so that values
/// can be chained inside one payload.
pub trait Serializable: Sized {
    fn encode(&self, payload: &mut Payload) -> Result<(), EncodeError>;
    fn decode(payload: &mut Payload) -> Result<Self, DecodeError>;
}

impl Serializable for ClientId {
    fn encode(&self, payload: &mut Payload) -> Result<(), EncodeError> {
        payload.write_id(*self);
        Ok(())
    }

    fn decode(payload: &mut Payload) -> Result<Self, DecodeError> {
        payload.read_id()
    }
}
