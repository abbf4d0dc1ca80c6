use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::{UnixListener, UnixStream};

use crate::error::{Error, Result};
use crate::transport::{FrameReader, FrameWriter, Timeouts, Transport, TransportListener};

/// Framed connection over a Unix domain socket
pub struct UnixTransport {
    reader: FrameReader,
    writer: FrameWriter,
}

impl UnixTransport {
    /// Connect without any timeouts
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        Self::builder().path(path).connect().await
    }

    pub fn builder() -> UnixTransportBuilder {
        UnixTransportBuilder::default()
    }

    pub fn from_stream(stream: UnixStream) -> Self {
        Self::framed(stream, Timeouts::default())
    }

    fn framed(stream: UnixStream, timeouts: Timeouts) -> Self {
        let (read, write) = stream.into_split();
        let (reader, writer) = timeouts.frame(read, write);
        Self { reader, writer }
    }
}

#[async_trait::async_trait]
impl Transport for UnixTransport {
    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_frame(bytes).await
    }

    async fn receive(&mut self) -> Result<Vec<u8>> {
        self.reader.read_frame().await
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.shutdown().await
    }

    fn into_split(self: Box<Self>) -> (FrameReader, FrameWriter) {
        (self.reader, self.writer)
    }
}

/// Listener owning its socket file, which is removed on close or drop
pub struct UnixTransportListener {
    listener: UnixListener,
    path: PathBuf,
}

impl UnixTransportListener {
    /// Bind to `path`, replacing a socket file left behind by an earlier process
    pub async fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }

        let listener = UnixListener::bind(&path)?;
        Ok(Self { listener, path })
    }

    pub async fn accept(&self) -> Result<UnixTransport> {
        let (stream, _) = self.listener.accept().await?;
        Ok(UnixTransport::from_stream(stream))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn close(&mut self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

impl Drop for UnixTransportListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[async_trait::async_trait]
impl TransportListener for UnixTransportListener {
    type Transport = UnixTransport;

    async fn accept(&self) -> Result<UnixTransport> {
        let transport = UnixTransportListener::accept(self).await?;
        tracing::debug!(path = %self.path.display(), "accepted unix connection");
        Ok(transport)
    }

    async fn close(&mut self) -> Result<()> {
        UnixTransportListener::close(self).await
    }
}

#[derive(Debug, Default)]
pub struct UnixTransportBuilder {
    path: Option<PathBuf>,
    timeouts: Timeouts,
}

impl UnixTransportBuilder {
    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connect = Some(timeout);
        self
    }

    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.send = Some(timeout);
        self
    }

    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.receive = Some(timeout);
        self
    }

    pub async fn connect(self) -> Result<UnixTransport> {
        let path = self.path.ok_or(Error::MissingConfig("socket path"))?;
        let stream = self.timeouts.connect(UnixStream::connect(&path)).await?;
        Ok(UnixTransport::framed(stream, self.timeouts))
    }
}
