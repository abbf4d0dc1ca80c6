use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::codec::Codec;
use crate::error::Result;
use crate::transport::{FrameReader, FrameWriter, TcpTransport, Transport};

/// Typed messages over a framed transport.
///
/// Both RPC connection loops are built on the split halves: one task owns
/// the [`ChannelReceiver`], another the [`ChannelSender`].
pub struct Channel<C> {
    transport: Box<dyn Transport>,
    codec: C,
}

impl<C: Codec + Clone> Channel<C> {
    pub fn from_transport(transport: impl Transport + 'static, codec: C) -> Self {
        Self {
            transport: Box::new(transport),
            codec,
        }
    }

    pub async fn tcp(addr: SocketAddr, codec: C) -> Result<Self> {
        let transport = TcpTransport::connect(addr).await?;
        Ok(Self::from_transport(transport, codec))
    }

    pub async fn send<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let bytes = self.codec.encode(message)?;
        self.transport.send(&bytes).await
    }

    /// Next message; a frame that does not decode as `T` is a codec error
    pub async fn receive<T: for<'de> Deserialize<'de>>(&mut self) -> Result<T> {
        let bytes = self.transport.receive().await?;
        self.codec.decode(&bytes)
    }

    /// Split into a receiving and a sending half sharing the codec
    pub fn split(self) -> (ChannelReceiver<C>, ChannelSender<C>) {
        let (reader, writer) = self.transport.into_split();
        (
            ChannelReceiver {
                reader,
                codec: self.codec.clone(),
            },
            ChannelSender {
                writer,
                codec: self.codec,
            },
        )
    }

    /// Shut down the write side, the peer sees end of stream
    pub async fn close(mut self) -> Result<()> {
        self.transport.close().await
    }
}

/// Receiving half of a split [`Channel`]
pub struct ChannelReceiver<C> {
    reader: FrameReader,
    codec: C,
}

impl<C: Codec> ChannelReceiver<C> {
    pub async fn receive<T: for<'de> Deserialize<'de>>(&mut self) -> Result<T> {
        let bytes = self.reader.read_frame().await?;
        self.codec.decode(&bytes)
    }
}

/// Sending half of a split [`Channel`]
pub struct ChannelSender<C> {
    writer: FrameWriter,
    codec: C,
}

impl<C: Codec> ChannelSender<C> {
    pub async fn send<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let bytes = self.codec.encode(message)?;
        self.writer.write_frame(&bytes).await
    }

    /// Write bytes already encoded with this channel's codec as one frame
    pub async fn send_encoded(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_frame(bytes).await
    }

    pub async fn close(mut self) -> Result<()> {
        self.writer.shutdown().await
    }
}
