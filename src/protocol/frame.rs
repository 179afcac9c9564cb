//! Frame struct and the frame codec.
//!
//! A [`Frame`] is one complete protocol message (header + body). The
//! [`FrameCodec`] turns request bodies into wire bytes and recovers response
//! bodies, applying the connection's compression strategy where the header's
//! compression bit says so. Uses `bytes::Bytes` for zero-copy body sharing.

use bytes::Bytes;

use super::wire_format::{flags, Header, Opcode, DEFAULT_MAX_BODY_SIZE, HEADER_SIZE};
use crate::compression::Compression;
use crate::error::{MeridianError, Result};

/// A complete protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Body bytes as they appeared on the wire (still compressed when the
    /// header's compression bit is set).
    pub body: Bytes,
}

impl Frame {
    /// Create a new frame from header and body.
    pub fn new(header: Header, body: Bytes) -> Self {
        Self { header, body }
    }

    /// Get the opcode.
    #[inline]
    pub fn opcode(&self) -> Opcode {
        self.header.opcode
    }

    /// Get the stream id.
    #[inline]
    pub fn stream(&self) -> u8 {
        self.header.stream
    }

    /// Get a reference to the raw body bytes.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Check if the body is compressed.
    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.header.is_compressed()
    }
}

/// Build a complete frame as a single byte vector.
///
/// Encodes the header and appends the body into a contiguous buffer. The
/// header's `body_length` is taken from the body slice, not the caller.
pub fn build_frame(header: &Header, body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
    let header = Header {
        body_length: body.len() as u32,
        ..*header
    };
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(body);
    buf
}

/// Request serializer / response body reader for one connection.
///
/// Holds the compression strategy negotiated at startup. Encoding compresses
/// a body only when the strategy is active and compression actually shrinks
/// it; the compression flag records which choice was made, so decoding is
/// driven entirely by the received header.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    compression: Option<Compression>,
    max_body_size: u32,
}

impl FrameCodec {
    /// Create a codec with the given compression strategy.
    pub fn new(compression: Option<Compression>) -> Self {
        Self {
            compression,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    /// The active compression strategy, if any.
    #[inline]
    pub fn compression(&self) -> Option<Compression> {
        self.compression
    }

    /// Encode a request frame for the wire.
    pub fn encode(&self, opcode: Opcode, stream: u8, body: &[u8]) -> Result<Vec<u8>> {
        let mut flags_byte = 0u8;
        let mut wire_body = None;
        if let Some(c) = self.compression {
            if !body.is_empty() {
                let compressed = c.compress(body);
                if compressed.len() < body.len() {
                    flags_byte |= flags::COMPRESSED;
                    wire_body = Some(compressed);
                }
            }
        }
        let wire_body = wire_body.as_deref().unwrap_or(body);
        if wire_body.len() as u32 > self.max_body_size {
            return Err(MeridianError::Protocol(format!(
                "request body of {} bytes exceeds maximum {}",
                wire_body.len(),
                self.max_body_size
            )));
        }
        let header = Header::request(opcode, stream, flags_byte, wire_body.len() as u32);
        Ok(build_frame(&header, wire_body))
    }

    /// Recover the plain body of a received frame, decompressing if the
    /// header's compression bit is set.
    pub fn decode_body(&self, frame: &Frame) -> Result<Bytes> {
        if !frame.is_compressed() {
            return Ok(frame.body.clone());
        }
        match self.compression {
            Some(c) => Ok(Bytes::from(c.decompress(&frame.body)?)),
            None => Err(MeridianError::Protocol(
                "received a compressed frame but no compression was negotiated".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FrameBuffer;

    #[test]
    fn test_frame_accessors() {
        let header = Header::response(Opcode::Result, 42, 0, 5);
        let frame = Frame::new(header, Bytes::from_static(b"hello"));

        assert_eq!(frame.opcode(), Opcode::Result);
        assert_eq!(frame.stream(), 42);
        assert_eq!(frame.body(), b"hello");
        assert!(!frame.is_compressed());
    }

    #[test]
    fn test_build_frame_sets_length() {
        let header = Header::request(Opcode::Query, 7, 0, 0);
        let bytes = build_frame(&header, b"hello");

        assert_eq!(bytes.len(), HEADER_SIZE + 5);
        let parsed = Header::decode(&bytes[..HEADER_SIZE]).unwrap();
        assert_eq!(parsed.body_length, 5);
        assert_eq!(&bytes[HEADER_SIZE..], b"hello");
    }

    #[test]
    fn test_codec_roundtrip_uncompressed() {
        let codec = FrameCodec::new(None);
        let bytes = codec.encode(Opcode::Query, 3, b"select 1").unwrap();

        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&bytes).unwrap();
        assert_eq!(frames.len(), 1);

        let body = codec.decode_body(&frames[0]).unwrap();
        assert_eq!(&body[..], b"select 1");
        assert!(!frames[0].is_compressed());
    }

    #[test]
    fn test_codec_roundtrip_compressed() {
        let codec = FrameCodec::new(Some(Compression::Lz4));
        let body: Vec<u8> = std::iter::repeat(b'x').take(2048).collect();
        let bytes = codec.encode(Opcode::Query, 9, &body).unwrap();

        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&bytes).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_compressed());
        assert!(frames[0].body.len() < body.len());

        let decoded = codec.decode_body(&frames[0]).unwrap();
        assert_eq!(&decoded[..], &body[..]);
    }

    #[test]
    fn test_codec_skips_compression_when_not_smaller() {
        // High-entropy bytes do not shrink, so the flag must stay clear even
        // with an active strategy.
        let codec = FrameCodec::new(Some(Compression::Lz4));
        let body: Vec<u8> = (0u16..512).map(|i| (i % 251) as u8).collect();
        let bytes = codec.encode(Opcode::Query, 1, &body).unwrap();

        let header = Header::decode(&bytes[..HEADER_SIZE]).unwrap();
        assert!(!header.is_compressed());
        assert_eq!(&bytes[HEADER_SIZE..], &body[..]);
    }

    #[test]
    fn test_decode_body_rejects_unnegotiated_compression() {
        let codec = FrameCodec::new(None);
        let header = Header::response(Opcode::Result, 1, flags::COMPRESSED, 4);
        let frame = Frame::new(header, Bytes::from_static(&[0, 0, 0, 0]));

        let err = codec.decode_body(&frame).unwrap_err();
        assert!(matches!(err, MeridianError::Protocol(_)));
    }

    #[test]
    fn test_empty_body_never_compressed() {
        let codec = FrameCodec::new(Some(Compression::Lz4));
        let bytes = codec.encode(Opcode::Options, 0, &[]).unwrap();
        let header = Header::decode(&bytes[..HEADER_SIZE]).unwrap();
        assert!(!header.is_compressed());
        assert_eq!(header.body_length, 0);
    }
}
