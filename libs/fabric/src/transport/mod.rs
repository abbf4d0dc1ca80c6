use crate::error::Result;

pub mod framed;
pub mod tcp;
pub mod unix;

pub use self::framed::{FrameReader, FrameWriter, Timeouts};
pub use self::tcp::{TcpTransport, TcpTransportBuilder, TcpTransportListener};
pub use self::unix::{UnixTransport, UnixTransportBuilder, UnixTransportListener};

/// Largest frame accepted on any transport (100MB)
pub const MAX_FRAME_LEN: usize = 100 * 1024 * 1024;

/// Transport trait for sending and receiving raw bytes
///
/// Each transport instance represents a single connection.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send bytes over the transport
    async fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Receive bytes from the transport
    async fn receive(&mut self) -> Result<Vec<u8>>;

    /// Close the transport connection
    async fn close(&mut self) -> Result<()>;

    /// Split into independent read and write halves so reads and writes can
    /// proceed from different tasks
    fn into_split(self: Box<Self>) -> (FrameReader, FrameWriter);
}

/// Listener producing one transport per accepted connection
#[async_trait::async_trait]
pub trait TransportListener: Send + Sync {
    type Transport: Transport + 'static;

    /// Accept the next incoming connection
    async fn accept(&self) -> Result<Self::Transport>;

    /// Stop listening
    async fn close(&mut self) -> Result<()>;
}
