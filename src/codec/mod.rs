//! Codec module - body-level encoding and decoding.
//!
//! Frame bodies are built from a small set of length-prefixed notations
//! ([`notation`]), typed cell values ([`value`]), and the RESULT body
//! structure ([`result`]). The framing layer above this module never looks
//! inside a body; everything here assumes a complete, decompressed body.

pub mod notation;
pub mod result;
pub mod value;

pub use result::{Column, PreparedInfo, QueryResult, ResultSet, Row};
pub use value::{ColumnType, Value};
