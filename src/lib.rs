//! # meridian-client
//!
//! Rust client for the Meridian native binary query protocol.
//!
//! The crate speaks the framed binary protocol directly: every message is an
//! 8-byte header (`version`, `flags`, `stream`, `opcode`, body length)
//! followed by an optionally compressed body. Requests are multiplexed over
//! a bounded pool of stream ids so many callers can share one connection.
//!
//! ## Architecture
//!
//! - **Frame codec** ([`protocol`]): header encoding/decoding and a buffer
//!   that reassembles frames from partial socket reads.
//! - **Connection** ([`connection`]): handshake, compression negotiation, a
//!   background read loop routing responses by stream id, and a dedicated
//!   writer task.
//! - **Cursor** ([`cursor`]): immediate and prepared statement execution,
//!   row fetching.
//!
//! ## Example
//!
//! ```ignore
//! use meridian_client::{connect, ConnectOptions, Value};
//!
//! #[tokio::main]
//! async fn main() -> meridian_client::Result<()> {
//!     let conn = connect("127.0.0.1", 8000, ConnectOptions::default()).await?;
//!     let mut cursor = conn.cursor();
//!     cursor.execute("select a, b from moo where a = :key",
//!                    &[("key", Value::from("hi"))]).await?;
//!     for row in cursor.fetchall() {
//!         println!("{:?}", row);
//!     }
//!     conn.close()
//! }
//! ```

pub mod codec;
pub mod compression;
pub mod connection;
pub mod cursor;
pub mod error;
pub mod protocol;

pub use codec::result::{Column, QueryResult, ResultSet, Row};
pub use codec::value::{ColumnType, Value};
pub use compression::{Compression, CompressionMode};
pub use connection::{connect, ConnectOptions, Connection, Credentials, Transport};
pub use cursor::{Cursor, PreparedStatement};
pub use error::{MeridianError, Result};
