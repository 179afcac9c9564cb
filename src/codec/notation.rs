//! Primitive wire notations used inside frame bodies.
//!
//! All multi-byte integers are big-endian. Readers take a `&mut &[u8]`
//! cursor and consume what they parse; writers append to a `BytesMut`.
//! Length-prefixed notations:
//!
//! - `[string]`       u16 length + UTF-8 bytes
//! - `[long string]`  i32 length + UTF-8 bytes
//! - `[bytes]`        i32 length + bytes, negative length marks null
//! - `[short bytes]`  u16 length + bytes
//! - `[string list]`  u16 count + `[string]`s
//! - `[string map]`   u16 count + key/value `[string]` pairs
//! - `[string multimap]` u16 count + (`[string]`, `[string list]`) pairs

use bytes::{BufMut, BytesMut};

use crate::error::{MeridianError, Result};

fn ensure(buf: &[u8], need: usize, what: &str) -> Result<()> {
    if buf.len() < need {
        return Err(MeridianError::Protocol(format!(
            "truncated {}: expected {} bytes, got {}",
            what,
            need,
            buf.len()
        )));
    }
    Ok(())
}

// ── Readers ──────────────────────────────────────────────────────────────

pub fn read_u8(buf: &mut &[u8]) -> Result<u8> {
    ensure(buf, 1, "u8")?;
    let v = buf[0];
    *buf = &buf[1..];
    Ok(v)
}

pub fn read_short(buf: &mut &[u8]) -> Result<u16> {
    ensure(buf, 2, "short")?;
    let v = u16::from_be_bytes([buf[0], buf[1]]);
    *buf = &buf[2..];
    Ok(v)
}

pub fn read_int(buf: &mut &[u8]) -> Result<i32> {
    ensure(buf, 4, "int")?;
    let v = i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    *buf = &buf[4..];
    Ok(v)
}

pub fn read_long(buf: &mut &[u8]) -> Result<i64> {
    ensure(buf, 8, "long")?;
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&buf[..8]);
    *buf = &buf[8..];
    Ok(i64::from_be_bytes(arr))
}

pub fn read_raw<'a>(buf: &mut &'a [u8], n: usize) -> Result<&'a [u8]> {
    ensure(buf, n, "bytes")?;
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}

fn utf8(bytes: &[u8], what: &str) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| MeridianError::Protocol(format!("invalid UTF-8 in {}: {}", what, e)))
}

pub fn read_string(buf: &mut &[u8]) -> Result<String> {
    let len = read_short(buf)? as usize;
    let raw = read_raw(buf, len)?;
    utf8(raw, "string")
}

pub fn read_long_string(buf: &mut &[u8]) -> Result<String> {
    let len = read_int(buf)?;
    if len < 0 {
        return Err(MeridianError::Protocol(format!(
            "negative long string length {}",
            len
        )));
    }
    let raw = read_raw(buf, len as usize)?;
    utf8(raw, "long string")
}

/// Read a `[bytes]` value; a negative length is the null marker, distinct
/// from a zero-length value.
pub fn read_bytes(buf: &mut &[u8]) -> Result<Option<Vec<u8>>> {
    let len = read_int(buf)?;
    if len < 0 {
        return Ok(None);
    }
    Ok(Some(read_raw(buf, len as usize)?.to_vec()))
}

pub fn read_short_bytes(buf: &mut &[u8]) -> Result<Vec<u8>> {
    let len = read_short(buf)? as usize;
    Ok(read_raw(buf, len)?.to_vec())
}

pub fn read_string_list(buf: &mut &[u8]) -> Result<Vec<String>> {
    let n = read_short(buf)? as usize;
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(read_string(buf)?);
    }
    Ok(out)
}

pub fn read_string_map(buf: &mut &[u8]) -> Result<Vec<(String, String)>> {
    let n = read_short(buf)? as usize;
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        let key = read_string(buf)?;
        let value = read_string(buf)?;
        out.push((key, value));
    }
    Ok(out)
}

pub fn read_string_multimap(buf: &mut &[u8]) -> Result<Vec<(String, Vec<String>)>> {
    let n = read_short(buf)? as usize;
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        let key = read_string(buf)?;
        let values = read_string_list(buf)?;
        out.push((key, values));
    }
    Ok(out)
}

// ── Writers ──────────────────────────────────────────────────────────────

pub fn put_short(out: &mut BytesMut, v: u16) {
    out.put_u16(v);
}

pub fn put_int(out: &mut BytesMut, v: i32) {
    out.put_i32(v);
}

pub fn put_string(out: &mut BytesMut, s: &str) {
    out.put_u16(s.len() as u16);
    out.put_slice(s.as_bytes());
}

pub fn put_long_string(out: &mut BytesMut, s: &str) {
    out.put_i32(s.len() as i32);
    out.put_slice(s.as_bytes());
}

/// Write a `[bytes]` value; `None` emits the null marker (length -1).
pub fn put_bytes(out: &mut BytesMut, v: Option<&[u8]>) {
    match v {
        Some(b) => {
            out.put_i32(b.len() as i32);
            out.put_slice(b);
        }
        None => out.put_i32(-1),
    }
}

pub fn put_short_bytes(out: &mut BytesMut, v: &[u8]) {
    out.put_u16(v.len() as u16);
    out.put_slice(v);
}

pub fn put_string_list(out: &mut BytesMut, items: &[&str]) {
    out.put_u16(items.len() as u16);
    for s in items {
        put_string(out, s);
    }
}

pub fn put_string_map(out: &mut BytesMut, pairs: &[(&str, &str)]) {
    out.put_u16(pairs.len() as u16);
    for (k, v) in pairs {
        put_string(out, k);
        put_string(out, v);
    }
}

pub fn put_string_multimap(out: &mut BytesMut, pairs: &[(&str, &[&str])]) {
    out.put_u16(pairs.len() as u16);
    for (k, vs) in pairs {
        put_string(out, k);
        put_string_list(out, vs);
    }
}
