//! RPC server: accepts connections, dispatches request frames to handlers by
//! method name and writes replies back on the same connection.
//!
//! Every connection gets its own task and every request its own task, so a
//! slow call never holds up the others sharing a connection.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use addsvc_core::{Context, Endpoint, Error as CallError, Failer, Result as CallResult, Status};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelSender};
use crate::codec::{BincodeCodec, Codec};
use crate::error::{Error, Result};
use crate::frame::{RequestFrame, ResponseFrame};
use crate::metadata::Metadata;
use crate::propagation::ServerBefore;
use crate::transport::{Transport, TransportListener};

/// A request as handed to a [`Handler`]
#[derive(Debug)]
pub struct Incoming {
    pub method: String,
    pub metadata: Metadata,
    pub deadline: Option<Instant>,
    pub payload: Vec<u8>,
}

/// Serves one method: codec-encoded request bytes in, reply bytes or status out
#[async_trait::async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, request: Incoming) -> std::result::Result<Vec<u8>, Status>;
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Replies queued per connection before request tasks wait on the writer
    pub response_buffer: usize,
    /// Requests executing concurrently per connection
    pub max_in_flight: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            response_buffer: 64,
            max_in_flight: 256,
        }
    }
}

struct ServerInner {
    handlers: HashMap<String, Arc<dyn Handler>>,
    config: ServerConfig,
}

#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// Registered method names
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.inner.handlers.keys().map(String::as_str)
    }

    /// Accept connections until `shutdown` is cancelled
    pub async fn serve<L: TransportListener>(&self, mut listener: L, shutdown: CancellationToken) -> Result<()> {
        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok(transport) => {
                    let server = self.clone();
                    let token = shutdown.child_token();
                    tokio::spawn(async move { server.serve_connection(transport, token).await });
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }

        info!("server stopped accepting connections");
        listener.close().await
    }

    /// Serve requests from a single connection until the peer disconnects or
    /// `shutdown` is cancelled. In-flight requests still get their reply.
    pub async fn serve_connection<T: Transport + 'static>(&self, transport: T, shutdown: CancellationToken) {
        let (mut receiver, sender) = Channel::from_transport(transport, BincodeCodec).split();
        let (replies, outbound) = mpsc::channel(self.inner.config.response_buffer);
        let writer = tokio::spawn(write_replies(sender, outbound));
        let in_flight = Arc::new(Semaphore::new(self.inner.config.max_in_flight));

        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = receiver.receive::<RequestFrame>() => received,
            };

            let frame = match received {
                Ok(frame) => frame,
                Err(Error::ConnectionClosed) => break,
                Err(e) => {
                    warn!(error = %e, "dropping connection after unreadable frame");
                    break;
                }
            };

            let received_at = Instant::now();
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = Arc::clone(&in_flight).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let server = self.clone();
            let replies = replies.clone();
            tokio::spawn(async move {
                let id = frame.id;
                let result = server.dispatch(frame, received_at).await;
                // The writer is gone only when the connection is, so the reply has nowhere to go.
                let _ = replies.send(ResponseFrame { id, result }).await;
                drop(permit);
            });
        }

        drop(replies);
        let _ = writer.await;
    }

    async fn dispatch(&self, frame: RequestFrame, received_at: Instant) -> std::result::Result<Vec<u8>, Status> {
        let deadline = frame.deadline(received_at);
        let RequestFrame {
            id,
            method,
            metadata,
            payload,
            ..
        } = frame;
        debug!(id, method = %method, "dispatching request");

        let Some(handler) = self.inner.handlers.get(&method) else {
            warn!(method = %method, "unknown method");
            return Err(Status::unimplemented(format!("unknown method {method}")));
        };

        let incoming = Incoming {
            method,
            metadata,
            deadline,
            payload,
        };

        match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline.into(), handler.handle(incoming))
                .await
                .unwrap_or_else(|_| Err(Status::deadline_exceeded("deadline exceeded"))),
            None => handler.handle(incoming).await,
        }
    }
}

async fn write_replies(mut sender: ChannelSender<BincodeCodec>, mut outbound: mpsc::Receiver<ResponseFrame>) {
    while let Some(reply) = outbound.recv().await {
        if let Err(e) = sender.send(&reply).await {
            warn!(id = reply.id, error = %e, "failed to write reply");
            break;
        }
    }
    let _ = sender.close().await;
}

#[derive(Default)]
pub struct ServerBuilder {
    handlers: HashMap<String, Arc<dyn Handler>>,
    config: ServerConfig,
}

impl ServerBuilder {
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Route `method` to `handler`, replacing any earlier registration
    pub fn handler(mut self, method: impl Into<String>, handler: impl Handler + 'static) -> Self {
        self.handlers.insert(method.into(), Arc::new(handler));
        self
    }

    pub fn build(self) -> Server {
        Server {
            inner: Arc::new(ServerInner {
                handlers: self.handlers,
                config: self.config,
            }),
        }
    }
}

/// Maps an endpoint error to the status returned to the caller
pub type ErrorEncoder = Arc<dyn Fn(&CallError) -> Status + Send + Sync>;

/// Binds an [`Endpoint`] to the wire.
///
/// Runs the before-hooks against inbound metadata, decodes the wire request
/// into the domain request, calls the endpoint and encodes the domain
/// response, routing every failure through the error encoder.
pub struct EndpointHandler<Req, Res, WReq, WRes> {
    endpoint: Endpoint<Req, Res>,
    decode: fn(WReq) -> CallResult<Req>,
    encode: fn(Res) -> CallResult<WRes>,
    error_encoder: ErrorEncoder,
    before: Vec<ServerBefore>,
    codec: BincodeCodec,
}

impl<Req, Res, WReq, WRes> EndpointHandler<Req, Res, WReq, WRes> {
    pub fn new(
        endpoint: Endpoint<Req, Res>,
        decode: fn(WReq) -> CallResult<Req>,
        encode: fn(Res) -> CallResult<WRes>,
        error_encoder: ErrorEncoder,
    ) -> Self {
        Self {
            endpoint,
            decode,
            encode,
            error_encoder,
            before: Vec::new(),
            codec: BincodeCodec,
        }
    }

    /// Append a hook run before decoding, in registration order
    pub fn before(mut self, hook: ServerBefore) -> Self {
        self.before.push(hook);
        self
    }

    fn context_for(&self, request: &Incoming) -> Context {
        let ctx = match request.deadline {
            Some(deadline) => Context::background().with_deadline(deadline),
            None => Context::background(),
        };
        self.before
            .iter()
            .fold(ctx, |ctx, hook| hook(ctx, &request.metadata))
    }
}

#[async_trait::async_trait]
impl<Req, Res, WReq, WRes> Handler for EndpointHandler<Req, Res, WReq, WRes>
where
    Req: Send + 'static,
    Res: Failer + Send + 'static,
    WReq: DeserializeOwned + Send + Sync + 'static,
    WRes: Serialize + Send + Sync + 'static,
{
    async fn handle(&self, request: Incoming) -> std::result::Result<Vec<u8>, Status> {
        let ctx = self.context_for(&request);
        let fail = |err: CallError| (self.error_encoder)(&err);

        let wire: WReq = self
            .codec
            .decode(&request.payload)
            .map_err(|e| fail(CallError::decode(e.to_string())))?;
        let domain_request = (self.decode)(wire).map_err(fail)?;

        let response = self.endpoint.call(ctx, domain_request).await.map_err(fail)?;
        if let Some(err) = response.failed() {
            return Err((self.error_encoder)(err));
        }

        let wire = (self.encode)(response).map_err(fail)?;
        self.codec
            .encode(&wire)
            .map_err(|e| fail(CallError::from(e)))
    }
}
