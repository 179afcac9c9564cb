//! Protocol module - wire format, framing, and the frame codec.
//!
//! This module implements the binary framing layer:
//! - 8-byte header encoding/decoding
//! - Frame buffer for accumulating partial reads
//! - Frame codec applying the negotiated compression strategy

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{build_frame, Frame, FrameCodec};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    flags, Header, Opcode, DEFAULT_MAX_BODY_SIZE, HEADER_SIZE, MAX_STREAM_ID, REQUEST_VERSION,
    RESPONSE_VERSION,
};
