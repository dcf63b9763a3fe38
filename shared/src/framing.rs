//! Length-prefixed framing for the reliable stream
//!
//! ```text
//! +-------------------+--------------------+
//! | length (4 bytes)  |   frame            |
//! | u32 little-endian |   (length bytes)   |
//! +-------------------+--------------------+
//! ```
//!
//! Bytes arrive in arbitrary chunks; [`FrameBuffer`] accumulates them and
//! hands back whole frames.

use crate::codec::{DecodeError, EncodeError};
use crate::MAX_FRAME_SIZE;

const PREFIX_LEN: usize = 4;

/// Prefixes `frame` with its length
pub fn frame(bytes: &[u8]) -> Result<Vec<u8>, EncodeError> {
    if bytes.len() > MAX_FRAME_SIZE {
        return Err(EncodeError::FrameTooLarge {
            size: bytes.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    let mut out = Vec::with_capacity(PREFIX_LEN + bytes.len());
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
    Ok(out)
}

#[derive(Debug, Default)]
pub struct FrameBuffer {
    pending: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Number of buffered bytes not yet returned as a frame
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Pops the next complete frame
    ///
    /// An oversized length prefix means the stream can no longer be trusted
    /// to be aligned, so everything buffered is discarded along with the error.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, DecodeError> {
        if self.pending.len() < PREFIX_LEN {
            return Ok(None);
        }
        let mut prefix = [0u8; PREFIX_LEN];
        prefix.copy_from_slice(&self.pending[..PREFIX_LEN]);
        let len = u32::from_le_bytes(prefix) as usize;

        if len > MAX_FRAME_SIZE {
            self.pending.clear();
            return Err(DecodeError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }
        if self.pending.len() < PREFIX_LEN + len {
            return Ok(None);
        }

        let frame = self.pending[PREFIX_LEN..PREFIX_LEN + len].to_vec();
        self.pending.drain(..PREFIX_LEN + len);
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_frame_roundtrip() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(&frame(b"hello world").unwrap());
        assert_eq!(buffer.next_frame().unwrap().unwrap(), b"hello world");
        assert_eq!(buffer.next_frame().unwrap(), None);
        assert_eq!(buffer.buffered(), 0);
    }

    #[test]
    fn test_partial_frame_waits_for_rest() {
        let bytes = frame(b"this frame arrives in pieces").unwrap();
        let mut buffer = FrameBuffer::new();

        for chunk in bytes.chunks(3) {
            assert_eq!(buffer.next_frame().unwrap(), None);
            buffer.extend(chunk);
        }
        assert_eq!(
            buffer.next_frame().unwrap().unwrap(),
            b"this frame arrives in pieces"
        );
    }

    #[test]
    fn test_back_to_back_frames_dont_merge() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(&frame(b"aaa").unwrap());
        buffer.extend(&frame(b"bbb").unwrap());

        assert_eq!(buffer.next_frame().unwrap().unwrap(), b"aaa");
        assert_eq!(buffer.next_frame().unwrap().unwrap(), b"bbb");
        assert_eq!(buffer.next_frame().unwrap(), None);
    }

    #[test]
    fn test_zero_length_frame() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(&frame(&[]).unwrap());
        assert_eq!(buffer.next_frame().unwrap().unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_oversized_prefix_discards_buffer() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(&((MAX_FRAME_SIZE as u32) + 1).to_le_bytes());
        buffer.extend(b"junk");

        assert!(matches!(
            buffer.next_frame(),
            Err(DecodeError::FrameTooLarge { .. })
        ));
        assert_eq!(buffer.buffered(), 0);

        // The buffer is usable again afterwards
        buffer.extend(&frame(b"ok").unwrap());
        assert_eq!(buffer.next_frame().unwrap().unwrap(), b"ok");
    }

    #[test]
    fn test_oversized_frame_rejected_on_write() {
        let big = vec![0u8; MAX_FRAME_SIZE + 1];
        assert!(matches!(frame(&big), Err(EncodeError::FrameTooLarge { .. })));
    }
}
