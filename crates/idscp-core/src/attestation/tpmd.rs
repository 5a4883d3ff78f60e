//! Measurement daemon client over a local Unix socket.
//!
//! Each exchange opens a fresh connection, writes one request and reads one
//! reply. Messages are CBOR, each prefixed with its length as a Big Endian
//! `u32`:
//!
//! ```text
//! ┌──────────────┬──────────────────────┐
//! │ len (u32 BE) │ CBOR body (len bytes)│
//! └──────────────┴──────────────────────┘
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::UnixStream,
};

use super::measurement::{
    AttestationRequest, AttestationResponse, MeasurementError, MeasurementService,
};
use crate::config::ProtocolConfig;

/// Largest message accepted from the daemon (1 MiB)
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Client for the measurement daemon's control socket
#[derive(Debug, Clone)]
pub struct TpmdClient {
    socket_path: PathBuf,
}

impl TpmdClient {
    /// Client for the daemon listening at `socket_path`
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self { socket_path: socket_path.into() }
    }

    /// Client for the socket named in `config`
    #[must_use]
    pub fn from_config(config: &ProtocolConfig) -> Self {
        Self::new(config.tpmd_socket.clone())
    }

    /// Control socket path
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

#[async_trait]
impl MeasurementService for TpmdClient {
    async fn measure(
        &self,
        request: AttestationRequest,
    ) -> Result<AttestationResponse, MeasurementError> {
        let mut stream = UnixStream::connect(&self.socket_path).await.map_err(|source| {
            MeasurementError::Unreachable {
                endpoint: self.socket_path.display().to_string(),
                source,
            }
        })?;

        let mut body = Vec::new();
        ciborium::ser::into_writer(&request, &mut body)
            .map_err(|e| MeasurementError::Encode(e.to_string()))?;
        write_message(&mut stream, &body).await?;

        let reply = read_message(&mut stream).await?;
        tracing::debug!(
            operation = ?request.operation,
            reply_len = reply.len(),
            "measurement daemon replied"
        );

        ciborium::de::from_reader(reply.as_slice())
            .map_err(|e| MeasurementError::Decode(e.to_string()))
    }
}

/// Write one length-prefixed message
///
/// # Errors
///
/// Returns [`MeasurementError::Encode`] if `body` exceeds
/// [`MAX_MESSAGE_SIZE`], or an I/O error from the writer.
pub async fn write_message<W>(writer: &mut W, body: &[u8]) -> Result<(), MeasurementError>
where
    W: AsyncWrite + Unpin,
{
    if body.len() > MAX_MESSAGE_SIZE {
        return Err(MeasurementError::Encode(format!(
            "message of {} bytes exceeds {MAX_MESSAGE_SIZE}",
            body.len()
        )));
    }

    #[allow(clippy::cast_possible_truncation)]
    let len = body.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed message
///
/// # Errors
///
/// Returns [`MeasurementError::ReplyTooLarge`] if the announced length
/// exceeds [`MAX_MESSAGE_SIZE`] (nothing is allocated in that case), or an
/// I/O error if the stream ends early.
pub async fn read_message<R>(reader: &mut R) -> Result<Vec<u8>, MeasurementError>
where
    R: AsyncRead + Unpin,
{
    let mut len = [0u8; 4];
    reader.read_exact(&mut len).await?;

    let len = u32::from_be_bytes(len) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(MeasurementError::ReplyTooLarge { size: len, max: MAX_MESSAGE_SIZE });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}
