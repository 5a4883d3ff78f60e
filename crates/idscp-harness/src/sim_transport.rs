//! Simulated transports.
//!
//! - [`ChannelSession`]: in-memory session whose outbound frames land in an
//!   unbounded channel. [`ChannelSession::pair`] plus [`forward`] connect two
//!   handlers back to back without a network.
//! - [`SimTransport`] / [`TcpSession`]: Turmoil TCP streams, so a handshake
//!   can run across a simulated network with partitions and latency.
//!
//! Frames on a stream are delimited by their header's payload size; see
//! [`read_frame`].

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use idscp_core::{
    session::SessionHandler,
    transport::{SessionId, TransportSession},
};
use idscp_proto::{CodecError, FrameHeader};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf},
    sync::{Mutex, mpsc},
};
use turmoil::net::{TcpListener, TcpStream};

/// Close code sent on a clean end of stream
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code sent when the stream fails
pub const CLOSE_ABNORMAL: u16 = 1006;

/// In-memory transport session
pub struct ChannelSession {
    id: SessionId,
    remote: String,
    outbound: mpsc::UnboundedSender<Bytes>,
}

impl ChannelSession {
    /// Session whose sent frames are readable from the returned receiver
    pub fn new(
        id: SessionId,
        remote: impl Into<String>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Bytes>) {
        let (outbound, receiver) = mpsc::unbounded_channel();
        (Arc::new(Self { id, remote: remote.into(), outbound }), receiver)
    }

    /// Two sessions for the two ends of one simulated connection
    ///
    /// Each receiver yields what the session next to it sent.
    pub fn pair(
        left: SessionId,
        right: SessionId,
    ) -> (
        (Arc<Self>, mpsc::UnboundedReceiver<Bytes>),
        (Arc<Self>, mpsc::UnboundedReceiver<Bytes>),
    ) {
        (Self::new(left, format!("sim:{right}")), Self::new(right, format!("sim:{left}")))
    }
}

#[async_trait]
impl TransportSession for ChannelSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn remote(&self) -> String {
        self.remote.clone()
    }

    async fn send(&self, bytes: Bytes) -> io::Result<()> {
        self.outbound
            .send(bytes)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "channel session closed"))
    }
}

/// Deliver every frame from `frames` to `handler` as session `to`
///
/// Returns once the sending side is dropped, after calling `on_close`.
pub async fn forward(
    mut frames: mpsc::UnboundedReceiver<Bytes>,
    handler: Arc<dyn SessionHandler>,
    to: SessionId,
) {
    while let Some(bytes) = frames.recv().await {
        handler.on_message(to, bytes).await;
    }
    handler.on_close(to, CLOSE_NORMAL, "peer closed").await;
}

/// Transport session over a Turmoil TCP stream
pub struct TcpSession {
    id: SessionId,
    remote: String,
    writer: Mutex<WriteHalf<TcpStream>>,
}

impl TcpSession {
    fn split(id: SessionId, stream: TcpStream) -> io::Result<(Arc<Self>, ReadHalf<TcpStream>)> {
        let remote = stream.peer_addr()?.to_string();
        let (reader, writer) = tokio::io::split(stream);
        Ok((Arc::new(Self { id, remote, writer: Mutex::new(writer) }), reader))
    }
}

#[async_trait]
impl TransportSession for TcpSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn remote(&self) -> String {
        self.remote.clone()
    }

    async fn send(&self, bytes: Bytes) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(&bytes).await?;
        writer.flush().await
    }
}

/// Simulation transport using Turmoil's deterministic TCP streams.
///
/// Session ids are assigned from a per-transport counter starting at 1.
pub struct SimTransport {
    listener: TcpListener,
    next_id: AtomicU64,
}

impl SimTransport {
    /// Bind a listener (e.g. `"0.0.0.0:443"`)
    ///
    /// # Errors
    ///
    /// Returns error if the address is in use or invalid.
    pub async fn bind(address: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self { listener, next_id: AtomicU64::new(1) })
    }

    /// Accept one connection
    ///
    /// # Errors
    ///
    /// Returns error if accepting fails.
    pub async fn accept(&self) -> io::Result<(Arc<TcpSession>, ReadHalf<TcpStream>)> {
        let (stream, _addr) = self.listener.accept().await?;
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        TcpSession::split(id, stream)
    }

    /// Connect to `address` (e.g. `"server:443"`) as session `id`
    ///
    /// # Errors
    ///
    /// Returns error if the host is unreachable or refuses the connection.
    pub async fn connect(
        address: &str,
        id: SessionId,
    ) -> io::Result<(Arc<TcpSession>, ReadHalf<TcpStream>)> {
        let stream = TcpStream::connect(address).await?;
        TcpSession::split(id, stream)
    }
}

/// Read one complete frame (header and payload) from a stream
///
/// Returns `Ok(None)` on a clean end of stream between frames.
///
/// # Errors
///
/// Returns `InvalidData` if the header is invalid (the stream can no longer
/// be delimited), or the I/O error if the stream ends mid-frame.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Option<Bytes>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FrameHeader::SIZE];
    match reader.read_exact(&mut header).await {
        Ok(_) => {},
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let payload_size = FrameHeader::from_bytes(&header)
        .map_err(|e: CodecError| io::Error::new(io::ErrorKind::InvalidData, e))?
        .payload_size() as usize;

    let mut frame = BytesMut::with_capacity(FrameHeader::SIZE + payload_size);
    frame.extend_from_slice(&header);
    frame.resize(FrameHeader::SIZE + payload_size, 0);
    reader.read_exact(&mut frame[FrameHeader::SIZE..]).await?;

    Ok(Some(frame.freeze()))
}

/// Feed every frame read from `reader` to `handler` until the stream ends
///
/// A read failure is reported through `on_error` before the session is
/// closed.
pub async fn drive<R>(handler: &dyn SessionHandler, session: SessionId, reader: &mut R)
where
    R: AsyncRead + Unpin,
{
    loop {
        match read_frame(reader).await {
            Ok(Some(frame)) => handler.on_message(session, frame).await,
            Ok(None) => {
                handler.on_close(session, CLOSE_NORMAL, "end of stream").await;
                return;
            },
            Err(e) => {
                handler.on_error(session, &e).await;
                handler.on_close(session, CLOSE_ABNORMAL, "read failed").await;
                return;
            },
        }
    }
}
