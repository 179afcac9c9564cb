//! Wire format encoding and decoding.
//!
//! Implements the 8-byte header format:
//! ```text
//! ┌─────────┬───────┬────────┬────────┬───────────┐
//! │ Version │ Flags │ Stream │ Opcode │ Length    │
//! │ 1 byte  │ 1 byte│ 1 byte │ 1 byte │ 4 bytes BE│
//! └─────────┴───────┴────────┴────────┴───────────┘
//! ```
//!
//! The version byte carries the direction: `0x01` for requests, `0x81` for
//! responses. All multi-byte integers are Big Endian.

use crate::error::{MeridianError, Result};

/// Header size in bytes (fixed, exactly 8).
pub const HEADER_SIZE: usize = 8;

/// Version byte for client-to-server frames.
pub const REQUEST_VERSION: u8 = 0x01;

/// Version byte for server-to-client frames.
pub const RESPONSE_VERSION: u8 = 0x81;

/// Default maximum body size (64 MiB).
pub const DEFAULT_MAX_BODY_SIZE: u32 = 64 * 1024 * 1024;

/// Highest stream id usable for requests; the pool is 0..=127.
pub const MAX_STREAM_ID: u8 = 127;

/// Flag constants for the protocol.
pub mod flags {
    /// Body is compressed with the connection's negotiated algorithm.
    pub const COMPRESSED: u8 = 0b0000_0001;

    /// Reserved bits mask (bits 1-7).
    pub const RESERVED_MASK: u8 = 0b1111_1110;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }
}

/// Message opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Error = 0x00,
    Startup = 0x01,
    Ready = 0x02,
    Authenticate = 0x03,
    Credentials = 0x04,
    Options = 0x05,
    Supported = 0x06,
    Query = 0x07,
    Result = 0x08,
    Prepare = 0x09,
    Execute = 0x0A,
}

impl Opcode {
    /// Parse an opcode byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Opcode::Error),
            0x01 => Some(Opcode::Startup),
            0x02 => Some(Opcode::Ready),
            0x03 => Some(Opcode::Authenticate),
            0x04 => Some(Opcode::Credentials),
            0x05 => Some(Opcode::Options),
            0x06 => Some(Opcode::Supported),
            0x07 => Some(Opcode::Query),
            0x08 => Some(Opcode::Result),
            0x09 => Some(Opcode::Prepare),
            0x0A => Some(Opcode::Execute),
            _ => None,
        }
    }

    /// The opcode as its wire byte.
    #[inline]
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Version byte ([`REQUEST_VERSION`] or [`RESPONSE_VERSION`]).
    pub version: u8,
    /// Flags byte (see [`flags`]).
    pub flags: u8,
    /// Stream id correlating a request to its response.
    pub stream: u8,
    /// Message opcode.
    pub opcode: Opcode,
    /// Body length in bytes.
    pub body_length: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(version: u8, flags: u8, stream: u8, opcode: Opcode, body_length: u32) -> Self {
        Self {
            version,
            flags,
            stream,
            opcode,
            body_length,
        }
    }

    /// Create a request header.
    pub fn request(opcode: Opcode, stream: u8, flags: u8, body_length: u32) -> Self {
        Self::new(REQUEST_VERSION, flags, stream, opcode, body_length)
    }

    /// Create a response header.
    pub fn response(opcode: Opcode, stream: u8, flags: u8, body_length: u32) -> Self {
        Self::new(RESPONSE_VERSION, flags, stream, opcode, body_length)
    }

    /// Encode header to bytes (Big Endian).
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (8 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0] = self.version;
        buf[1] = self.flags;
        buf[2] = self.stream;
        buf[3] = self.opcode.as_byte();
        buf[4..8].copy_from_slice(&self.body_length.to_be_bytes());
    }

    /// Decode a header from bytes.
    ///
    /// Fails with a protocol error on a short buffer, an unsupported version
    /// byte, or an unknown opcode.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(MeridianError::Protocol(format!(
                "header truncated: need {} bytes, have {}",
                HEADER_SIZE,
                buf.len()
            )));
        }
        let version = buf[0];
        if version != REQUEST_VERSION && version != RESPONSE_VERSION {
            return Err(MeridianError::Protocol(format!(
                "unsupported protocol version byte 0x{:02x}",
                version
            )));
        }
        let opcode = Opcode::from_byte(buf[3]).ok_or_else(|| {
            MeridianError::Protocol(format!("unknown opcode 0x{:02x}", buf[3]))
        })?;
        Ok(Self {
            version,
            flags: buf[1],
            stream: buf[2],
            opcode,
            body_length: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
        })
    }

    /// Validate the header for protocol compliance.
    ///
    /// Checks that reserved flag bits are zero and the declared body length
    /// stays below the given cap.
    pub fn validate(&self, max_body_size: u32) -> Result<()> {
        if self.flags & flags::RESERVED_MASK != 0 {
            return Err(MeridianError::Protocol(format!(
                "reserved flag bits set: 0x{:02x}",
                self.flags
            )));
        }
        if self.body_length > max_body_size {
            return Err(MeridianError::Protocol(format!(
                "body length {} exceeds maximum {}",
                self.body_length, max_body_size
            )));
        }
        Ok(())
    }

    /// Check if the body is compressed.
    #[inline]
    pub fn is_compressed(&self) -> bool {
        flags::has_flag(self.flags, flags::COMPRESSED)
    }

    /// Check if this is a server-to-client frame.
    #[inline]
    pub fn is_response(&self) -> bool {
        self.version == RESPONSE_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let original = Header::request(Opcode::Query, 42, flags::COMPRESSED, 100);
        let encoded = original.encode();
        let decoded = Header::decode(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_header_big_endian_byte_order() {
        let header = Header::response(Opcode::Result, 0x05, 0x01, 0x08090A0B);
        let bytes = header.encode();

        assert_eq!(bytes[0], RESPONSE_VERSION);
        assert_eq!(bytes[1], 0x01);
        assert_eq!(bytes[2], 0x05);
        assert_eq!(bytes[3], 0x08);

        // Body length: 0x08090A0B in BE
        assert_eq!(bytes[4], 0x08);
        assert_eq!(bytes[5], 0x09);
        assert_eq!(bytes[6], 0x0A);
        assert_eq!(bytes[7], 0x0B);
    }

    #[test]
    fn test_header_size_is_exactly_8() {
        assert_eq!(HEADER_SIZE, 8);
        let header = Header::request(Opcode::Options, 0, 0, 0);
        assert_eq!(header.encode().len(), 8);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let buf = [0u8; 7]; // One byte short
        assert!(Header::decode(&buf).is_err());
    }

    #[test]
    fn test_decode_bad_version_rejected() {
        let mut buf = Header::request(Opcode::Query, 1, 0, 0).encode();
        buf[0] = 0x02;
        let err = Header::decode(&buf).unwrap_err();
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn test_decode_unknown_opcode_rejected() {
        let mut buf = Header::request(Opcode::Query, 1, 0, 0).encode();
        buf[3] = 0x7F;
        let err = Header::decode(&buf).unwrap_err();
        assert!(err.to_string().contains("opcode"));
    }

    #[test]
    fn test_validate_reserved_bits_must_be_zero() {
        let header = Header::new(REQUEST_VERSION, 0b1000_0000, 1, Opcode::Query, 0);
        assert!(header.validate(DEFAULT_MAX_BODY_SIZE).is_err());
    }

    #[test]
    fn test_validate_body_too_large() {
        let header = Header::request(Opcode::Query, 1, 0, 1_000_000);
        let result = header.validate(100);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_flag_accessors() {
        let compressed = Header::response(Opcode::Result, 1, flags::COMPRESSED, 0);
        assert!(compressed.is_compressed());
        assert!(compressed.is_response());

        let plain = Header::request(Opcode::Query, 1, 0, 0);
        assert!(!plain.is_compressed());
        assert!(!plain.is_response());
    }

    #[test]
    fn test_opcode_byte_roundtrip() {
        for op in [
            Opcode::Error,
            Opcode::Startup,
            Opcode::Ready,
            Opcode::Authenticate,
            Opcode::Credentials,
            Opcode::Options,
            Opcode::Supported,
            Opcode::Query,
            Opcode::Result,
            Opcode::Prepare,
            Opcode::Execute,
        ] {
            assert_eq!(Opcode::from_byte(op.as_byte()), Some(op));
        }
        assert_eq!(Opcode::from_byte(0x42), None);
    }
}
