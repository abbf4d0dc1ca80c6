use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};

use crate::error::{Error, Result};
use crate::transport::{FrameReader, FrameWriter, Timeouts, Transport, TransportListener};

/// Framed connection over TCP, Nagle disabled
pub struct TcpTransport {
    reader: FrameReader,
    writer: FrameWriter,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// Connect without any timeouts
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::builder().address(addr).connect().await
    }

    pub fn builder() -> TcpTransportBuilder {
        TcpTransportBuilder::default()
    }

    /// Frame an accepted or already connected stream
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        Self::framed(stream, Timeouts::default())
    }

    fn framed(stream: TcpStream, timeouts: Timeouts) -> Result<Self> {
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;
        let (read, write) = stream.into_split();
        let (reader, writer) = timeouts.frame(read, write);
        Ok(Self {
            reader,
            writer,
            peer_addr,
            local_addr,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
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

pub struct TcpTransportListener {
    listener: TcpListener,
}

impl TcpTransportListener {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(addr).await?,
        })
    }

    /// Accept the next connection along with the peer address
    pub async fn accept(&self) -> Result<(TcpTransport, SocketAddr)> {
        let (stream, peer) = self.listener.accept().await?;
        Ok((TcpTransport::from_stream(stream)?, peer))
    }

    /// Bound address, useful after binding port 0
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// The socket is released on drop; nothing to do here
    pub async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl TransportListener for TcpTransportListener {
    type Transport = TcpTransport;

    async fn accept(&self) -> Result<TcpTransport> {
        let (transport, peer) = TcpTransportListener::accept(self).await?;
        tracing::debug!(%peer, "accepted tcp connection");
        Ok(transport)
    }

    async fn close(&mut self) -> Result<()> {
        TcpTransportListener::close(self).await
    }
}

#[derive(Debug, Default)]
pub struct TcpTransportBuilder {
    address: Option<SocketAddr>,
    timeouts: Timeouts,
}

impl TcpTransportBuilder {
    pub fn address(mut self, addr: SocketAddr) -> Self {
        self.address = Some(addr);
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

    pub async fn connect(self) -> Result<TcpTransport> {
        let addr = self.address.ok_or(Error::MissingConfig("address"))?;
        let stream = self.timeouts.connect(TcpStream::connect(addr)).await?;
        TcpTransport::framed(stream, self.timeouts)
    }
}
