//! Body compression for the binary protocol.
//!
//! Compression is a connect-time choice, negotiated against the algorithms
//! the server advertises in its SUPPORTED response. A compressed body is
//! framed as:
//!
//! ```text
//! [raw_len: u32 BE][block data...]
//! ```
//!
//! The block data is an LZ4-style byte stream of run and literal tokens:
//! a token with the high bit set repeats the following byte
//! `(token & 0x7F) + 4` times; a token with the high bit clear is followed
//! by `token + 1` literal bytes.

use crate::error::{MeridianError, Result};

/// Compression requested in [`ConnectOptions`](crate::ConnectOptions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionMode {
    /// Never compress; skips negotiation entirely.
    #[default]
    None,
    /// Use lz4 when the server advertises it, plain frames otherwise.
    Auto,
    /// Require lz4; connection setup fails if the server does not offer it.
    Lz4,
}

/// An active compression strategy on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Lz4,
}

/// Decompressed bodies larger than this are rejected as corrupt.
const MAX_RAW_SIZE: u32 = 64 * 1024 * 1024;

/// Shortest run worth encoding as a run token.
const RUN_MIN: usize = 4;

/// Longest run one token can express.
const RUN_MAX: usize = RUN_MIN + 0x7F;

/// Longest literal sequence one token can express.
const LITERAL_MAX: usize = 0x80;

impl Compression {
    /// The algorithm name used on the wire (STARTUP option, SUPPORTED list).
    pub fn name(self) -> &'static str {
        match self {
            Compression::Lz4 => "lz4",
        }
    }

    /// Look up an algorithm by its wire name.
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "lz4" => Some(Compression::Lz4),
            _ => None,
        }
    }

    /// Compress a body. The output carries the raw length prefix; whether it
    /// is worth using is the caller's call (the frame codec keeps the
    /// original when compression does not shrink it).
    pub fn compress(self, data: &[u8]) -> Vec<u8> {
        match self {
            Compression::Lz4 => {
                let mut out = Vec::with_capacity(data.len() / 2 + 8);
                out.extend_from_slice(&(data.len() as u32).to_be_bytes());
                pack(data, &mut out);
                out
            }
        }
    }

    /// Decompress a body produced by [`compress`](Self::compress).
    pub fn decompress(self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Compression::Lz4 => {
                if data.len() < 4 {
                    return Err(MeridianError::Protocol(
                        "compressed body shorter than its length prefix".to_string(),
                    ));
                }
                let raw_len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
                if raw_len > MAX_RAW_SIZE {
                    return Err(MeridianError::Protocol(format!(
                        "declared decompressed size {} exceeds maximum {}",
                        raw_len, MAX_RAW_SIZE
                    )));
                }
                unpack(&data[4..], raw_len as usize)
            }
        }
    }
}

/// Resolve the strategy for a connection from the requested mode and the
/// algorithm names the server advertised.
///
/// `None` always succeeds without looking at the server list. A named
/// algorithm the server does not offer is a configuration error; `Auto`
/// quietly falls back to plain frames.
pub fn negotiate(mode: CompressionMode, supported: &[String]) -> Result<Option<Compression>> {
    let offered = supported.iter().any(|name| name == Compression::Lz4.name());
    match mode {
        CompressionMode::None => Ok(None),
        CompressionMode::Auto => Ok(offered.then_some(Compression::Lz4)),
        CompressionMode::Lz4 => {
            if offered {
                Ok(Some(Compression::Lz4))
            } else {
                Err(MeridianError::Configuration(format!(
                    "server does not support {} compression",
                    Compression::Lz4.name()
                )))
            }
        }
    }
}

fn pack(input: &[u8], out: &mut Vec<u8>) {
    let mut i = 0;
    let mut lit_start = 0;
    while i < input.len() {
        let b = input[i];
        let mut run = 1;
        while i + run < input.len() && input[i + run] == b && run < RUN_MAX {
            run += 1;
        }
        if run >= RUN_MIN {
            flush_literals(out, &input[lit_start..i]);
            out.push(0x80 | (run - RUN_MIN) as u8);
            out.push(b);
            i += run;
            lit_start = i;
        } else {
            i += run;
        }
    }
    flush_literals(out, &input[lit_start..]);
}

fn flush_literals(out: &mut Vec<u8>, mut lit: &[u8]) {
    while !lit.is_empty() {
        let n = lit.len().min(LITERAL_MAX);
        out.push((n - 1) as u8);
        out.extend_from_slice(&lit[..n]);
        lit = &lit[n..];
    }
}

fn unpack(input: &[u8], expected: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected);
    let mut i = 0;
    while i < input.len() {
        let token = input[i];
        i += 1;
        if token & 0x80 != 0 {
            if i >= input.len() {
                return Err(MeridianError::Protocol(
                    "truncated run token in compressed body".to_string(),
                ));
            }
            let count = (token & 0x7F) as usize + RUN_MIN;
            let b = input[i];
            i += 1;
            out.resize(out.len() + count, b);
        } else {
            let n = token as usize + 1;
            if i + n > input.len() {
                return Err(MeridianError::Protocol(
                    "truncated literal sequence in compressed body".to_string(),
                ));
            }
            out.extend_from_slice(&input[i..i + n]);
            i += n;
        }
    }
    if out.len() != expected {
        return Err(MeridianError::Protocol(format!(
            "decompressed size mismatch: declared {}, got {}",
            expected,
            out.len()
        )));
    }
    Ok(out)
}
