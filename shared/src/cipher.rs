//! Byte transform applied to every frame before it leaves and after it arrives

use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToRemote,
    FromRemote,
}

/// Pure, side-effect free transform. What one peer applies with
/// `ToRemote` the other undoes with `FromRemote`.
pub trait Cipher: Send + Sync {
    fn transform(&self, bytes: Vec<u8>, direction: Direction) -> Vec<u8>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityCipher;

impl Cipher for IdentityCipher {
    fn transform(&self, bytes: Vec<u8>, _direction: Direction) -> Vec<u8> {
        bytes
    }
}

/// Repeating-key XOR. Obfuscation only; swap in a real scheme where
/// confidentiality matters.
#[derive(Debug, Clone)]
pub struct XorCipher {
    key: Vec<u8>,
}

impl XorCipher {
    pub fn new(key: &[u8]) -> Self {
        Self { key: key.to_vec() }
    }
}

impl Cipher for XorCipher {
    fn transform(&self, mut bytes: Vec<u8>, _direction: Direction) -> Vec<u8> {
        if self.key.is_empty() {
            return bytes;
        }
        for (byte, key) in bytes.iter_mut().zip(self.key.iter().cycle()) {
            *byte ^= key;
        }
        bytes
    }
}

/// Picks the transform both peers use for a given optional shared key
pub fn cipher_for_key(key: Option<&str>) -> Arc<dyn Cipher> {
    match key {
        Some(key) if !key.is_empty() => Arc::new(XorCipher::new(key.as_bytes())),
        _ => Arc::new(IdentityCipher),
    }
}
