use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::transport::MAX_FRAME_LEN;

type BoxedRead = Box<dyn AsyncRead + Send + Sync + Unpin>;
type BoxedWrite = Box<dyn AsyncWrite + Send + Sync + Unpin>;

/// Per-operation limits of a framed connection; `None` waits indefinitely
#[derive(Debug, Clone, Copy, Default)]
pub struct Timeouts {
    pub connect: Option<Duration>,
    pub send: Option<Duration>,
    pub receive: Option<Duration>,
}

impl Timeouts {
    /// Run a connect future under the connect limit
    pub(crate) async fn connect<S>(&self, op: impl Future<Output = std::io::Result<S>>) -> Result<S> {
        let stream = match self.connect {
            Some(limit) => tokio::time::timeout(limit, op)
                .await
                .map_err(|_| Error::Timeout("Connect"))??,
            None => op.await?,
        };
        Ok(stream)
    }

    /// Frame both halves of a split stream with the send and receive limits
    pub(crate) fn frame(
        &self,
        read: impl AsyncRead + Send + Sync + Unpin + 'static,
        write: impl AsyncWrite + Send + Sync + Unpin + 'static,
    ) -> (FrameReader, FrameWriter) {
        (FrameReader::new(read, self.receive), FrameWriter::new(write, self.send))
    }
}

/// Read half of a length-prefixed connection
///
/// Each frame is a 4-byte big-endian length followed by that many bytes.
pub struct FrameReader {
    inner: BoxedRead,
    timeout: Option<Duration>,
}

impl FrameReader {
    pub fn new(inner: impl AsyncRead + Send + Sync + Unpin + 'static, timeout: Option<Duration>) -> Self {
        Self {
            inner: Box::new(inner),
            timeout,
        }
    }

    /// Read the next frame
    pub async fn read_frame(&mut self) -> Result<Vec<u8>> {
        let inner = &mut self.inner;
        let read_op = async move {
            let len = inner.read_u32().await.map_err(eof_as_closed)? as usize;

            if len > MAX_FRAME_LEN {
                return Err(Error::InvalidFrame(format!(
                    "Message too large: {} bytes",
                    len
                )));
            }

            let mut buf = vec![0u8; len];
            inner.read_exact(&mut buf).await.map_err(eof_as_closed)?;
            Ok::<Vec<u8>, Error>(buf)
        };

        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, read_op)
                .await
                .map_err(|_| Error::Timeout("Receive"))?,
            None => read_op.await,
        }
    }
}

/// Write half of a length-prefixed connection
pub struct FrameWriter {
    inner: BoxedWrite,
    timeout: Option<Duration>,
}

impl FrameWriter {
    pub fn new(inner: impl AsyncWrite + Send + Sync + Unpin + 'static, timeout: Option<Duration>) -> Self {
        Self {
            inner: Box::new(inner),
            timeout,
        }
    }

    /// Write one frame and flush it
    pub async fn write_frame(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > MAX_FRAME_LEN {
            return Err(Error::InvalidFrame(format!(
                "Message too large: {} bytes",
                bytes.len()
            )));
        }

        let inner = &mut self.inner;
        let write_op = async move {
            inner.write_u32(bytes.len() as u32).await?;
            inner.write_all(bytes).await?;
            inner.flush().await?;
            Ok::<(), Error>(())
        };

        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, write_op)
                .await
                .map_err(|_| Error::Timeout("Send"))?,
            None => write_op.await,
        }
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

fn eof_as_closed(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::ConnectionClosed
    } else {
        e.into()
    }
}
