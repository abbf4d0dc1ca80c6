//! RPC client: a multiplexed connection shared by concurrent calls, and the
//! adapter that turns a remote method into an [`Endpoint`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use addsvc_core::{Context, Endpoint, Error as CallError, Result as CallResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::channel::{Channel, ChannelReceiver, ChannelSender};
use crate::codec::{BincodeCodec, Codec};
use crate::error::{Error, Result};
use crate::frame::{RequestFrame, ResponseFrame};
use crate::metadata::Metadata;
use crate::propagation::ClientBefore;
use crate::transport::{TcpTransport, Transport, UnixTransport, MAX_FRAME_LEN};

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Vec<u8>>>>>>;

/// A request frame already encoded, tagged with its id
struct Outgoing {
    id: u64,
    bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Requests queued for the writer before callers wait
    pub request_buffer: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self { request_buffer: 64 }
    }
}

struct ConnectionInner {
    next_id: AtomicU64,
    pending: Pending,
    outbound: mpsc::Sender<Outgoing>,
    closed: CancellationToken,
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

/// Client side of an RPC connection.
///
/// Cheap to clone; all clones share one underlying transport, and calls made
/// concurrently are matched to their replies by request id. The connection
/// stays open until [`Connection::close`] is called, the peer hangs up, or
/// the last clone is dropped.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Connect over TCP
    pub async fn tcp(addr: SocketAddr) -> Result<Self> {
        Ok(Self::new(TcpTransport::connect(addr).await?))
    }

    /// Connect over a Unix socket
    pub async fn unix(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(UnixTransport::connect(path).await?))
    }

    /// Wrap an established transport. Must be called within a Tokio runtime.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::with_config(transport, ConnectionConfig::default())
    }

    pub fn with_config(transport: impl Transport + 'static, config: ConnectionConfig) -> Self {
        let (receiver, sender) = Channel::from_transport(transport, BincodeCodec).split();
        let (outbound, requests) = mpsc::channel(config.request_buffer);
        let pending: Pending = Arc::default();
        let closed = CancellationToken::new();

        tokio::spawn(read_replies(receiver, Arc::clone(&pending), closed.clone()));
        tokio::spawn(write_requests(sender, requests, Arc::clone(&pending), closed.clone()));

        Self {
            inner: Arc::new(ConnectionInner {
                next_id: AtomicU64::new(1),
                pending,
                outbound,
                closed,
            }),
        }
    }

    /// Issue one call and wait for its reply or the deadline, whichever comes first
    pub async fn call(
        &self,
        method: &str,
        metadata: Metadata,
        deadline: Option<Instant>,
        payload: Vec<u8>,
    ) -> Result<Vec<u8>> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let timeout_ms = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(Error::DeadlineExceeded);
                }
                Some(remaining.as_millis().max(1) as u64)
            }
            None => None,
        };

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = RequestFrame {
            id,
            method: method.to_string(),
            metadata,
            timeout_ms,
            payload,
        };
        // An unsendable frame fails this call only
        let bytes = encode_request(&frame)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        lock(&self.inner.pending).insert(id, reply_tx);
        let _slot = PendingSlot {
            pending: &self.inner.pending,
            id,
        };

        let outgoing = Outgoing { id, bytes };
        match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline.into(), self.exchange(outgoing, reply_rx))
                .await
                .map_err(|_| Error::DeadlineExceeded)?,
            None => self.exchange(outgoing, reply_rx).await,
        }
    }

    async fn exchange(&self, outgoing: Outgoing, reply_rx: oneshot::Receiver<Result<Vec<u8>>>) -> Result<Vec<u8>> {
        self.inner
            .outbound
            .send(outgoing)
            .await
            .map_err(|_| Error::ConnectionClosed)?;

        // A reply delivered before the connection closed still wins
        tokio::select! {
            biased;
            reply = reply_rx => reply.map_err(|_| Error::ConnectionClosed)?,
            _ = self.inner.closed.cancelled() => Err(Error::ConnectionClosed),
        }
    }

    /// Stop both connection tasks. Calls still waiting fail with `ConnectionClosed`.
    pub fn close(&self) {
        self.inner.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }
}

/// Removes an abandoned call's reply slot, e.g. after its deadline passed
struct PendingSlot<'a> {
    pending: &'a Pending,
    id: u64,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.id);
    }
}

fn encode_request(frame: &RequestFrame) -> Result<Vec<u8>> {
    let bytes = BincodeCodec
        .encode(frame)
        .map_err(|e| Error::InvalidFrame(e.to_string()))?;
    if bytes.len() > MAX_FRAME_LEN {
        return Err(Error::InvalidFrame(format!(
            "Message too large: {} bytes",
            bytes.len()
        )));
    }
    Ok(bytes)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn read_replies(mut receiver: ChannelReceiver<BincodeCodec>, pending: Pending, closed: CancellationToken) {
    loop {
        let received = tokio::select! {
            _ = closed.cancelled() => break,
            received = receiver.receive::<ResponseFrame>() => received,
        };

        match received {
            Ok(reply) => {
                let waiter = lock(&pending).remove(&reply.id);
                match waiter {
                    Some(waiter) => {
                        let _ = waiter.send(reply.result.map_err(Error::Status));
                    }
                    None => debug!(id = reply.id, "reply for abandoned call"),
                }
            }
            Err(Error::ConnectionClosed) => {
                debug!("peer closed connection");
                break;
            }
            Err(e) => {
                warn!(error = %e, "connection read failed");
                break;
            }
        }
    }

    closed.cancel();
    lock(&pending).clear();
}

async fn write_requests(
    mut sender: ChannelSender<BincodeCodec>,
    mut requests: mpsc::Receiver<Outgoing>,
    pending: Pending,
    closed: CancellationToken,
) {
    loop {
        let request = tokio::select! {
            _ = closed.cancelled() => break,
            request = requests.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        match sender.send_encoded(&request.bytes).await {
            Ok(()) => {}
            // Nothing reached the socket, only this call fails
            Err(e @ (Error::InvalidFrame(_) | Error::Codec(_))) => {
                warn!(id = request.id, error = %e, "request not sent");
                if let Some(waiter) = lock(&pending).remove(&request.id) {
                    let _ = waiter.send(Err(e));
                }
            }
            Err(e) => {
                warn!(id = request.id, error = %e, "connection write failed");
                break;
            }
        }
    }

    closed.cancel();
    let _ = sender.close().await;
}

/// Client half of an endpoint binding: encodes the domain request, runs the
/// before-hooks into outbound metadata, calls the remote method and decodes
/// the reply. Transport failures surface as [`CallError::Transport`], peer
/// statuses as [`CallError::Remote`].
pub struct RemoteEndpoint<Req, Res, WReq, WRes> {
    connection: Connection,
    method: &'static str,
    encode: fn(Req) -> CallResult<WReq>,
    decode: fn(WRes) -> CallResult<Res>,
    before: Vec<ClientBefore>,
    codec: BincodeCodec,
}

impl<Req, Res, WReq, WRes> RemoteEndpoint<Req, Res, WReq, WRes>
where
    Req: Send + 'static,
    Res: Send + 'static,
    WReq: Serialize + Send + 'static,
    WRes: DeserializeOwned + Send + 'static,
{
    pub fn new(
        connection: Connection,
        method: &'static str,
        encode: fn(Req) -> CallResult<WReq>,
        decode: fn(WRes) -> CallResult<Res>,
    ) -> Self {
        Self {
            connection,
            method,
            encode,
            decode,
            before: Vec::new(),
            codec: BincodeCodec,
        }
    }

    /// Append a hook run before sending, in registration order
    pub fn before(mut self, hook: ClientBefore) -> Self {
        self.before.push(hook);
        self
    }

    pub fn endpoint(self) -> Endpoint<Req, Res> {
        let remote = Arc::new(self);
        Endpoint::new(move |ctx: Context, request: Req| {
            let remote = Arc::clone(&remote);
            async move { remote.invoke(ctx, request).await }
        })
    }

    async fn invoke(&self, ctx: Context, request: Req) -> CallResult<Res> {
        let wire = (self.encode)(request)?;
        let payload = self.codec.encode(&wire)?;

        let mut metadata = Metadata::new();
        for hook in &self.before {
            hook(&ctx, &mut metadata);
        }

        let reply = self
            .connection
            .call(self.method, metadata, ctx.deadline(), payload)
            .await?;

        let wire: WRes = self
            .codec
            .decode(&reply)
            .map_err(|e| CallError::decode(e.to_string()))?;
        (self.decode)(wire)
    }
}
