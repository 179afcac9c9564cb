//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForHeader`: need at least 8 bytes
//! - `WaitingForBody`: header parsed, need N more body bytes

use bytes::{Bytes, BytesMut};

use super::wire_format::{Header, DEFAULT_MAX_BODY_SIZE, HEADER_SIZE};
use super::Frame;
use crate::error::Result;

/// State machine for frame parsing.
#[derive(Debug, Clone)]
enum State {
    /// Waiting for a complete header.
    WaitingForHeader,
    /// Header parsed, waiting for body bytes.
    WaitingForBody { header: Header },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
///
/// All data is stored in a single `BytesMut` buffer to minimize allocations.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed body size.
    max_body_size: u32,
}

impl FrameBuffer {
    /// Create a new frame buffer with default settings.
    pub fn new() -> Self {
        Self::with_max_body(DEFAULT_MAX_BODY_SIZE)
    }

    /// Create a new frame buffer with a custom body size cap.
    pub fn with_max_body(max_body_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(16 * 1024),
            state: State::WaitingForHeader,
            max_body_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Returns the frames completed by this chunk (possibly none). Partial
    /// data is kept internally for the next push.
    ///
    /// # Errors
    ///
    /// Fails with a protocol error when a header is malformed or a declared
    /// body length exceeds the cap; the buffer is unusable afterwards.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Number of buffered bytes not yet assembled into a frame.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        if let State::WaitingForHeader = self.state {
            if self.buffer.len() < HEADER_SIZE {
                return Ok(None);
            }
            let header = Header::decode(&self.buffer[..HEADER_SIZE])?;
            header.validate(self.max_body_size)?;
            let _ = self.buffer.split_to(HEADER_SIZE);

            if header.body_length == 0 {
                return Ok(Some(Frame::new(header, Bytes::new())));
            }
            self.state = State::WaitingForBody { header };
        }

        if let State::WaitingForBody { header } = self.state {
            if self.buffer.len() < header.body_length as usize {
                return Ok(None);
            }
            let body = self.buffer.split_to(header.body_length as usize).freeze();
            self.state = State::WaitingForHeader;
            return Ok(Some(Frame::new(header, body)));
        }

        Ok(None)
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{build_frame, Opcode};

    fn frame_bytes(opcode: Opcode, stream: u8, body: &[u8]) -> Vec<u8> {
        let header = Header::response(opcode, stream, 0, body.len() as u32);
        build_frame(&header, body)
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new();
        let bytes = frame_bytes(Opcode::Result, 5, b"body");

        let frames = buffer.push(&bytes).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].stream(), 5);
        assert_eq!(frames[0].body(), b"body");
        assert_eq!(buffer.pending_bytes(), 0);
    }

    #[test]
    fn test_empty_body_frame() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&frame_bytes(Opcode::Ready, 0, b"")).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].body().is_empty());
    }

    #[test]
    fn test_fragmented_frame() {
        let mut buffer = FrameBuffer::new();
        let bytes = frame_bytes(Opcode::Result, 1, b"fragmented body data");

        // Header split in two pushes
        assert!(buffer.push(&bytes[..5]).unwrap().is_empty());
        assert!(buffer.push(&bytes[5..HEADER_SIZE]).unwrap().is_empty());

        // Body split in two pushes
        let mid = HEADER_SIZE + 7;
        assert!(buffer.push(&bytes[HEADER_SIZE..mid]).unwrap().is_empty());
        let frames = buffer.push(&bytes[mid..]).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].body(), b"fragmented body data");
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut buffer = FrameBuffer::new();
        let mut bytes = Vec::new();
        for stream in 0u8..4 {
            bytes.extend(frame_bytes(Opcode::Result, stream, &[stream; 3]));
        }

        let frames = buffer.push(&bytes).unwrap();
        assert_eq!(frames.len(), 4);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.stream(), i as u8);
            assert_eq!(frame.body(), &[i as u8; 3]);
        }
    }

    #[test]
    fn test_frame_followed_by_partial() {
        let mut buffer = FrameBuffer::new();
        let first = frame_bytes(Opcode::Result, 1, b"one");
        let second = frame_bytes(Opcode::Result, 2, b"two");

        let mut bytes = first.clone();
        bytes.extend(&second[..HEADER_SIZE + 1]);

        let frames = buffer.push(&bytes).unwrap();
        assert_eq!(frames.len(), 1);

        let frames = buffer.push(&second[HEADER_SIZE + 1..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].body(), b"two");
    }

    #[test]
    fn test_body_too_large_rejected() {
        let mut buffer = FrameBuffer::with_max_body(16);
        let bytes = frame_bytes(Opcode::Result, 1, &[0u8; 32]);
        assert!(buffer.push(&bytes).is_err());
    }

    #[test]
    fn test_garbage_header_rejected() {
        let mut buffer = FrameBuffer::new();
        let bytes = [0xEEu8; HEADER_SIZE];
        assert!(buffer.push(&bytes).is_err());
    }
}
