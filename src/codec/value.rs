//! Typed column values and their wire representations.
//!
//! Every cell in a rows result carries a `[bytes]` payload interpreted
//! through the column's type tag: fixed-width big-endian integers, IEEE-754
//! floats, length-delimited UTF-8 text, and 64-bit millisecond timestamps.
//! A null cell (negative length on the wire) decodes to [`Value::Null`],
//! which is distinct from an empty string or empty blob.

use crate::error::{MeridianError, Result};

/// Column type tags as they appear in result metadata (`[short]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ColumnType {
    Custom = 0x00,
    Ascii = 0x01,
    BigInt = 0x02,
    Blob = 0x03,
    Boolean = 0x04,
    Counter = 0x05,
    Decimal = 0x06,
    Double = 0x07,
    Float = 0x08,
    Int = 0x09,
    Text = 0x0A,
    Timestamp = 0x0B,
    Uuid = 0x0C,
    Varchar = 0x0D,
    VarInt = 0x0E,
}

impl ColumnType {
    /// Parse a type tag, failing with a protocol error on an unknown tag.
    pub fn from_tag(tag: u16) -> Result<Self> {
        match tag {
            0x00 => Ok(ColumnType::Custom),
            0x01 => Ok(ColumnType::Ascii),
            0x02 => Ok(ColumnType::BigInt),
            0x03 => Ok(ColumnType::Blob),
            0x04 => Ok(ColumnType::Boolean),
            0x05 => Ok(ColumnType::Counter),
            0x06 => Ok(ColumnType::Decimal),
            0x07 => Ok(ColumnType::Double),
            0x08 => Ok(ColumnType::Float),
            0x09 => Ok(ColumnType::Int),
            0x0A => Ok(ColumnType::Text),
            0x0B => Ok(ColumnType::Timestamp),
            0x0C => Ok(ColumnType::Uuid),
            0x0D => Ok(ColumnType::Varchar),
            0x0E => Ok(ColumnType::VarInt),
            _ => Err(MeridianError::Protocol(format!(
                "unknown column type tag 0x{:04x}",
                tag
            ))),
        }
    }

    /// The tag as its wire value.
    #[inline]
    pub fn tag(self) -> u16 {
        self as u16
    }
}

/// A decoded (or to-be-bound) native value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Int(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
    Uuid([u8; 16]),
    Blob(Vec<u8>),
}

impl Value {
    /// Decode one cell per its column type. `None` is the wire null marker.
    pub fn decode_cell(ty: ColumnType, cell: Option<&[u8]>) -> Result<Value> {
        let Some(raw) = cell else {
            return Ok(Value::Null);
        };
        match ty {
            ColumnType::Text | ColumnType::Varchar | ColumnType::Ascii => {
                let s = std::str::from_utf8(raw).map_err(|e| {
                    MeridianError::Protocol(format!("invalid UTF-8 in text cell: {}", e))
                })?;
                Ok(Value::Text(s.to_string()))
            }
            ColumnType::Int => Ok(Value::Int(i32::from_be_bytes(fixed(raw, "int")?))),
            ColumnType::BigInt | ColumnType::Counter => {
                Ok(Value::BigInt(i64::from_be_bytes(fixed(raw, "bigint")?)))
            }
            ColumnType::Float => Ok(Value::Float(f32::from_be_bytes(fixed(raw, "float")?))),
            ColumnType::Double => Ok(Value::Double(f64::from_be_bytes(fixed(raw, "double")?))),
            ColumnType::Boolean => {
                let [b] = fixed(raw, "boolean")?;
                Ok(Value::Boolean(b != 0))
            }
            ColumnType::Timestamp => {
                Ok(Value::Timestamp(i64::from_be_bytes(fixed(raw, "timestamp")?)))
            }
            ColumnType::Uuid => Ok(Value::Uuid(fixed(raw, "uuid")?)),
            ColumnType::Blob | ColumnType::Custom | ColumnType::Decimal | ColumnType::VarInt => {
                Ok(Value::Blob(raw.to_vec()))
            }
        }
    }

    /// Encode this value for binding to a parameter slot of the given type.
    /// Returns `None` for a null bind (the wire null marker).
    ///
    /// The value must be compatible with the target type; a mismatch is a
    /// caller error, not a protocol error.
    pub fn encode_for(&self, ty: ColumnType) -> Result<Option<Vec<u8>>> {
        let bytes = match (self, ty) {
            (Value::Null, _) => return Ok(None),
            (Value::Text(s), ColumnType::Text | ColumnType::Varchar | ColumnType::Ascii) => {
                s.as_bytes().to_vec()
            }
            (Value::Int(v), ColumnType::Int) => v.to_be_bytes().to_vec(),
            (Value::Int(v), ColumnType::BigInt | ColumnType::Timestamp) => {
                (*v as i64).to_be_bytes().to_vec()
            }
            (Value::BigInt(v), ColumnType::BigInt | ColumnType::Counter | ColumnType::Timestamp) => {
                v.to_be_bytes().to_vec()
            }
            (Value::Timestamp(v), ColumnType::Timestamp | ColumnType::BigInt) => {
                v.to_be_bytes().to_vec()
            }
            (Value::Float(v), ColumnType::Float) => v.to_be_bytes().to_vec(),
            (Value::Float(v), ColumnType::Double) => (*v as f64).to_be_bytes().to_vec(),
            (Value::Double(v), ColumnType::Double) => v.to_be_bytes().to_vec(),
            (Value::Double(v), ColumnType::Float) => (*v as f32).to_be_bytes().to_vec(),
            (Value::Boolean(v), ColumnType::Boolean) => vec![u8::from(*v)],
            (Value::Uuid(v), ColumnType::Uuid) => v.to_vec(),
            (Value::Blob(v), ColumnType::Blob | ColumnType::Custom | ColumnType::Decimal
                | ColumnType::VarInt) => v.clone(),
            (value, ty) => {
                return Err(MeridianError::Programming(format!(
                    "cannot bind {:?} to a {:?} parameter",
                    value, ty
                )))
            }
        };
        Ok(Some(bytes))
    }

    /// Render this value as a query-text literal for immediate execution.
    ///
    /// Text is single-quoted with embedded quotes doubled; blobs render as
    /// hex; everything else uses its plain textual form.
    pub fn literal(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
            Value::Int(v) => v.to_string(),
            Value::BigInt(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Double(v) => v.to_string(),
            Value::Boolean(v) => v.to_string(),
            Value::Timestamp(v) => v.to_string(),
            Value::Uuid(v) => {
                let h = |r: std::ops::Range<usize>| {
                    v[r].iter().map(|b| format!("{:02x}", b)).collect::<String>()
                };
                format!("{}-{}-{}-{}-{}", h(0..4), h(4..6), h(6..8), h(8..10), h(10..16))
            }
            Value::Blob(v) => {
                let hex: String = v.iter().map(|b| format!("{:02x}", b)).collect();
                format!("0x{}", hex)
            }
        }
    }
}

fn fixed<const N: usize>(raw: &[u8], what: &str) -> Result<[u8; N]> {
    raw.try_into().map_err(|_| {
        MeridianError::Protocol(format!(
            "{} cell has {} bytes, expected {}",
            what,
            raw.len(),
            N
        ))
    })
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_null_cell() {
        assert_eq!(
            Value::decode_cell(ColumnType::Text, None).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_null_distinct_from_empty_string() {
        let null = Value::decode_cell(ColumnType::Text, None).unwrap();
        let empty = Value::decode_cell(ColumnType::Text, Some(b"")).unwrap();
        assert_eq!(null, Value::Null);
        assert_eq!(empty, Value::Text(String::new()));
        assert_ne!(null, empty);
    }

    #[test]
    fn test_decode_int() {
        let raw = 1234i32.to_be_bytes();
        assert_eq!(
            Value::decode_cell(ColumnType::Int, Some(&raw)).unwrap(),
            Value::Int(1234)
        );
    }

    #[test]
    fn test_decode_bigint_and_timestamp() {
        let raw = (-77i64).to_be_bytes();
        assert_eq!(
            Value::decode_cell(ColumnType::BigInt, Some(&raw)).unwrap(),
            Value::BigInt(-77)
        );
        let ms = 1_700_000_000_000i64.to_be_bytes();
        assert_eq!(
            Value::decode_cell(ColumnType::Timestamp, Some(&ms)).unwrap(),
            Value::Timestamp(1_700_000_000_000)
        );
    }

    #[test]
    fn test_decode_floats() {
        let f = 1.234f32.to_be_bytes();
        assert_eq!(
            Value::decode_cell(ColumnType::Float, Some(&f)).unwrap(),
            Value::Float(1.234)
        );
        let d = 2.5f64.to_be_bytes();
        assert_eq!(
            Value::decode_cell(ColumnType::Double, Some(&d)).unwrap(),
            Value::Double(2.5)
        );
    }

    #[test]
    fn test_decode_boolean_and_uuid() {
        assert_eq!(
            Value::decode_cell(ColumnType::Boolean, Some(&[1])).unwrap(),
            Value::Boolean(true)
        );
        let id = [7u8; 16];
        assert_eq!(
            Value::decode_cell(ColumnType::Uuid, Some(&id)).unwrap(),
            Value::Uuid(id)
        );
    }

    #[test]
    fn test_decode_wrong_width_rejected() {
        let err = Value::decode_cell(ColumnType::Int, Some(&[1, 2])).unwrap_err();
        assert!(matches!(err, MeridianError::Protocol(_)));
    }

    #[test]
    fn test_decode_invalid_utf8_rejected() {
        let err = Value::decode_cell(ColumnType::Text, Some(&[0xFF, 0xFE])).unwrap_err();
        assert!(matches!(err, MeridianError::Protocol(_)));
    }

    #[test]
    fn test_unknown_type_tag() {
        let err = ColumnType::from_tag(0x9999).unwrap_err();
        assert!(err.to_string().contains("type tag"));
    }

    #[test]
    fn test_encode_for_matching_types() {
        assert_eq!(
            Value::Int(5).encode_for(ColumnType::Int).unwrap(),
            Some(5i32.to_be_bytes().to_vec())
        );
        assert_eq!(
            Value::from("hi").encode_for(ColumnType::Text).unwrap(),
            Some(b"hi".to_vec())
        );
        assert_eq!(Value::Null.encode_for(ColumnType::Int).unwrap(), None);
    }

    #[test]
    fn test_encode_for_widening() {
        assert_eq!(
            Value::Int(5).encode_for(ColumnType::BigInt).unwrap(),
            Some(5i64.to_be_bytes().to_vec())
        );
        assert_eq!(
            Value::Float(1.5).encode_for(ColumnType::Double).unwrap(),
            Some(1.5f64.to_be_bytes().to_vec())
        );
    }

    #[test]
    fn test_encode_for_mismatch_is_programming_error() {
        let err = Value::Boolean(true).encode_for(ColumnType::Int).unwrap_err();
        assert!(matches!(err, MeridianError::Programming(_)));
    }

    #[test]
    fn test_literal_text_escaping() {
        assert_eq!(Value::from("it's").literal(), "'it''s'");
        assert_eq!(Value::from("plain").literal(), "'plain'");
    }

    #[test]
    fn test_literal_scalars() {
        assert_eq!(Value::Int(1234).literal(), "1234");
        assert_eq!(Value::Double(1.234).literal(), "1.234");
        assert_eq!(Value::Boolean(false).literal(), "false");
        assert_eq!(Value::Null.literal(), "null");
        assert_eq!(Value::Blob(vec![0xDE, 0xAD]).literal(), "0xdead");
    }

    #[test]
    fn test_literal_uuid() {
        let v = Value::Uuid([
            0x55, 0x0e, 0x84, 0x00, 0xe2, 0x9b, 0x41, 0xd4, 0xa7, 0x16, 0x44, 0x66, 0x55, 0x44,
            0x00, 0x00,
        ]);
        assert_eq!(v.literal(), "550e8400-e29b-41d4-a716-446655440000");
    }
}
