//! Connection lifecycle and request multiplexing.
//!
//! A [`Connection`] owns one TCP transport. [`connect`] validates the
//! options, performs the startup handshake (compression negotiation and
//! optional authentication), then splits the socket:
//! 1. a dedicated writer task drains a channel of pre-encoded frames;
//! 2. a background read loop reassembles response frames and routes each to
//!    the caller waiting on its stream id.
//!
//! Requests occupy the lowest free id from a bounded pool; when every id is
//! busy the caller is rejected immediately rather than queued. Closing the
//! connection fails every outstanding request and permanently rejects new
//! ones.

mod streams;

pub use streams::STREAM_POOL_SIZE;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::codec::notation;
use crate::compression::{self, Compression, CompressionMode};
use crate::cursor::Cursor;
use crate::error::{MeridianError, Result};
use crate::protocol::{Frame, FrameBuffer, FrameCodec, Opcode};
use streams::StreamTable;

/// The only protocol version the native transport speaks.
pub const SUPPORTED_PROTOCOL_VERSION: &str = "1.0.0";

/// Orphan response frames tolerated before the connection is failed.
const ORPHAN_TOLERANCE: u32 = 8;

/// Outbound frame queue depth.
const WRITER_QUEUE_DEPTH: usize = 256;

/// Maximum frames coalesced into a single write.
const MAX_WRITE_BATCH: usize = 32;

/// Wire transport selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    /// The native binary protocol (the only transport this crate speaks).
    #[default]
    Binary,
    /// The legacy RPC transport; selecting it fails fast instead of
    /// attempting a degraded connection.
    LegacyRpc,
}

/// Username/password pair for servers that demand authentication.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Connect-time configuration.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Transport selector; only [`Transport::Binary`] is accepted.
    pub transport: Transport,
    /// Protocol version string; only [`SUPPORTED_PROTOCOL_VERSION`].
    pub version: String,
    /// Keyspace to issue a `USE` for right after the handshake.
    pub keyspace: Option<String>,
    /// Body compression mode.
    pub compression: CompressionMode,
    /// Credentials, required only when the server demands authentication.
    pub credentials: Option<Credentials>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            transport: Transport::Binary,
            version: SUPPORTED_PROTOCOL_VERSION.to_string(),
            keyspace: None,
            compression: CompressionMode::None,
            credentials: None,
        }
    }
}

/// Open a connection and run the startup handshake.
///
/// Option validation happens before any socket is opened, so an unsupported
/// transport or protocol version leaves nothing behind. Transport failures
/// surface as [`MeridianError::Connection`], handshake violations as
/// [`MeridianError::Protocol`].
pub async fn connect(host: &str, port: u16, options: ConnectOptions) -> Result<Connection> {
    validate_options(&options)?;

    let mut stream = TcpStream::connect((host, port)).await?;
    stream.set_nodelay(true)?;

    let negotiated = handshake(&mut stream, &options).await?;
    tracing::debug!(?negotiated, "handshake complete");

    let codec = FrameCodec::new(negotiated);
    let (read_half, write_half) = stream.into_split();
    let streams = Arc::new(StreamTable::new());
    let closed = Arc::new(AtomicBool::new(false));

    let (writer_tx, writer_rx) = mpsc::channel(WRITER_QUEUE_DEPTH);
    let writer_task = tokio::spawn(write_loop(write_half, writer_rx));
    let reader_task = tokio::spawn(read_loop(read_half, streams.clone(), closed.clone()));

    let conn = Connection {
        codec,
        streams,
        writer_tx,
        closed,
        keyspace: Mutex::new(None),
        reader_task,
        writer_task,
    };

    if let Some(keyspace) = options.keyspace.clone() {
        let mut cursor = conn.cursor();
        cursor
            .execute(&format!("USE \"{}\"", keyspace), &[])
            .await?;
    }

    Ok(conn)
}

/// A live connection to one server.
#[derive(Debug)]
pub struct Connection {
    /// Frame codec carrying the negotiated compression strategy.
    codec: FrameCodec,
    /// Stream-id pool and pending-request table.
    streams: Arc<StreamTable>,
    /// Channel feeding the writer task.
    writer_tx: mpsc::Sender<Vec<u8>>,
    /// Set once, on close or read-loop exit; never cleared.
    closed: Arc<AtomicBool>,
    /// Keyspace last selected via USE.
    keyspace: Mutex<Option<String>>,
    /// Background read loop.
    reader_task: JoinHandle<()>,
    /// Dedicated writer task.
    writer_task: JoinHandle<()>,
}

impl Connection {
    /// Create a cursor for issuing statements on this connection.
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor::new(self)
    }

    /// The compression strategy negotiated at startup, if any.
    pub fn compression(&self) -> Option<Compression> {
        self.codec.compression()
    }

    /// The keyspace selected via `USE`, if any.
    pub fn keyspace(&self) -> Option<String> {
        self.keyspace.lock().unwrap().clone()
    }

    pub(crate) fn set_keyspace(&self, keyspace: String) {
        *self.keyspace.lock().unwrap() = Some(keyspace);
    }

    /// Whether the connection has been closed (explicitly or by failure).
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of requests currently awaiting a response.
    pub fn in_flight(&self) -> usize {
        self.streams.in_flight()
    }

    /// Close the connection.
    ///
    /// Fails every outstanding request with [`MeridianError::ConnectionClosed`]
    /// and stops both background tasks. Every later operation, including a
    /// second `close`, fails with [`MeridianError::Programming`].
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(MeridianError::Programming(
                "connection is already closed".to_string(),
            ));
        }
        self.reader_task.abort();
        self.writer_task.abort();
        self.streams.fail_all();
        tracing::debug!("connection closed");
        Ok(())
    }

    /// Send one request and await its response body.
    ///
    /// Allocates a stream id, hands the encoded frame to the writer task,
    /// and parks on the completion channel until the read loop delivers the
    /// response. A server ERROR response is surfaced as a programming error
    /// carrying the server's message.
    pub(crate) async fn request(&self, opcode: Opcode, body: &[u8]) -> Result<(Opcode, Bytes)> {
        if self.is_closed() {
            return Err(MeridianError::Programming("connection closed".to_string()));
        }

        let (tx, rx) = oneshot::channel();
        let stream = self.streams.allocate(tx)?;
        let bytes = self.codec.encode(opcode, stream, body)?;

        if self.writer_tx.send(bytes).await.is_err() {
            // Writer task is gone; free the id before reporting.
            let _ = self.streams.complete(stream);
            return Err(MeridianError::ConnectionClosed);
        }
        tracing::debug!(stream, ?opcode, "request sent");

        let frame = rx.await.map_err(|_| MeridianError::ConnectionClosed)?;
        let body = self.codec.decode_body(&frame)?;

        if frame.opcode() == Opcode::Error {
            let mut cur: &[u8] = &body;
            let code = notation::read_int(&mut cur)?;
            let message = notation::read_string(&mut cur)?;
            tracing::debug!(stream, code, "server reported an error");
            return Err(MeridianError::Programming(message));
        }
        Ok((frame.opcode(), body))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.reader_task.abort();
        self.writer_task.abort();
        self.streams.fail_all();
    }
}

fn validate_options(options: &ConnectOptions) -> Result<()> {
    if options.transport == Transport::LegacyRpc {
        return Err(MeridianError::Programming(
            "the legacy RPC transport is not available on a native-protocol connection"
                .to_string(),
        ));
    }
    if options.version != SUPPORTED_PROTOCOL_VERSION {
        return Err(MeridianError::Programming(format!(
            "protocol version {} is not supported by the native transport",
            options.version
        )));
    }
    Ok(())
}

/// Run the startup exchange on stream 0, before the socket is split.
///
/// Frames are uncompressed during the handshake; the negotiated strategy
/// only applies from the first post-READY request.
async fn handshake(
    stream: &mut TcpStream,
    options: &ConnectOptions,
) -> Result<Option<Compression>> {
    let plain = FrameCodec::new(None);
    let mut frames = FrameBuffer::new();

    let negotiated = match options.compression {
        CompressionMode::None => None,
        mode => {
            let frame = exchange(stream, &mut frames, &plain, Opcode::Options, &[]).await?;
            if frame.opcode() != Opcode::Supported {
                return Err(unexpected_frame("option negotiation", &frame));
            }
            let body = plain.decode_body(&frame)?;
            let mut cur: &[u8] = &body;
            let supported = notation::read_string_multimap(&mut cur)?;
            let algorithms = supported
                .into_iter()
                .find(|(key, _)| key == "COMPRESSION")
                .map(|(_, values)| values)
                .unwrap_or_default();
            compression::negotiate(mode, &algorithms)?
        }
    };

    let mut body = BytesMut::new();
    match negotiated {
        Some(algo) => notation::put_string_map(
            &mut body,
            &[
                ("PROTOCOL_VERSION", SUPPORTED_PROTOCOL_VERSION),
                ("COMPRESSION", algo.name()),
            ],
        ),
        None => notation::put_string_map(
            &mut body,
            &[("PROTOCOL_VERSION", SUPPORTED_PROTOCOL_VERSION)],
        ),
    }
    let mut frame = exchange(stream, &mut frames, &plain, Opcode::Startup, &body).await?;

    if frame.opcode() == Opcode::Authenticate {
        let creds = options.credentials.as_ref().ok_or_else(|| {
            MeridianError::Configuration(
                "server requires authentication but no credentials were configured".to_string(),
            )
        })?;
        let mut body = BytesMut::new();
        notation::put_string_map(
            &mut body,
            &[
                ("username", creds.username.as_str()),
                ("password", creds.password.as_str()),
            ],
        );
        frame = exchange(stream, &mut frames, &plain, Opcode::Credentials, &body).await?;
    }

    match frame.opcode() {
        Opcode::Ready => Ok(negotiated),
        Opcode::Error => {
            let body = plain.decode_body(&frame)?;
            let mut cur: &[u8] = &body;
            let _code = notation::read_int(&mut cur)?;
            let message = notation::read_string(&mut cur)?;
            Err(MeridianError::Protocol(format!(
                "handshake rejected by server: {}",
                message
            )))
        }
        _ => Err(unexpected_frame("handshake", &frame)),
    }
}

/// Write one stream-0 request and block for the next complete frame.
async fn exchange(
    stream: &mut TcpStream,
    frames: &mut FrameBuffer,
    codec: &FrameCodec,
    opcode: Opcode,
    body: &[u8],
) -> Result<Frame> {
    let bytes = codec.encode(opcode, 0, body)?;
    stream.write_all(&bytes).await?;

    let mut buf = [0u8; 8 * 1024];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(MeridianError::Protocol(
                "server closed the connection during the handshake".to_string(),
            ));
        }
        let mut ready = frames.push(&buf[..n])?;
        if !ready.is_empty() {
            return Ok(ready.remove(0));
        }
    }
}

fn unexpected_frame(phase: &str, frame: &Frame) -> MeridianError {
    MeridianError::Protocol(format!(
        "unexpected {:?} frame during {}",
        frame.opcode(),
        phase
    ))
}

/// Background read loop: drain the transport, route frames by stream id.
///
/// A frame for an id with no pending request signals desynchronization; it
/// is logged and dropped, but recurrence past [`ORPHAN_TOLERANCE`] fails the
/// connection. On any exit path the pending table is drained so every
/// waiting caller observes a closed connection.
async fn read_loop<R>(mut reader: R, streams: Arc<StreamTable>, closed: Arc<AtomicBool>)
where
    R: AsyncRead + Unpin,
{
    let mut frames = FrameBuffer::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut orphans = 0u32;

    'outer: loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!("server closed the connection");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                if !closed.load(Ordering::SeqCst) {
                    tracing::error!("transport read failed: {}", e);
                }
                break;
            }
        };

        let ready = match frames.push(&buf[..n]) {
            Ok(f) => f,
            Err(e) => {
                tracing::error!("frame decode failed: {}", e);
                break;
            }
        };

        for frame in ready {
            match streams.complete(frame.stream()) {
                Some(tx) => {
                    // Receiver may have given up; that frees the id either way.
                    let _ = tx.send(frame);
                }
                None => {
                    orphans += 1;
                    tracing::warn!(
                        stream = frame.stream(),
                        "dropping frame for an idle stream id"
                    );
                    if orphans > ORPHAN_TOLERANCE {
                        tracing::error!(
                            "persistent frames for idle stream ids; failing the connection"
                        );
                        break 'outer;
                    }
                }
            }
        }
    }

    closed.store(true, Ordering::SeqCst);
    streams.fail_all();
}

/// Dedicated writer task: coalesce queued frames and write them in batches.
async fn write_loop<W>(mut writer: W, mut rx: mpsc::Receiver<Vec<u8>>)
where
    W: AsyncWrite + Unpin,
{
    let mut batch: Vec<u8> = Vec::with_capacity(16 * 1024);
    while let Some(first) = rx.recv().await {
        batch.clear();
        batch.extend_from_slice(&first);
        let mut queued = 1;
        while queued < MAX_WRITE_BATCH {
            match rx.try_recv() {
                Ok(next) => {
                    batch.extend_from_slice(&next);
                    queued += 1;
                }
                Err(_) => break,
            }
        }
        if let Err(e) = writer.write_all(&batch).await {
            tracing::error!("transport write failed: {}", e);
            return;
        }
        if let Err(e) = writer.flush().await {
            tracing::error!("transport flush failed: {}", e);
            return;
        }
    }
}
