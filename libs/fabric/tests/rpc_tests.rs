use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use addsvc_core::{Code, Context, Endpoint, Error as CallError, Failer, Status};
use addsvc_fabric::{
    codec::{BincodeCodec, Codec},
    error::Error,
    propagation::{extract_token, inject_token},
    server::{EndpointHandler, Handler, Incoming, Server, ServerConfig},
    transport::{TcpTransportListener, MAX_FRAME_LEN},
    Connection, Metadata, RemoteEndpoint,
};
use tokio_util::sync::CancellationToken;

/// Echoes the payload after sleeping for the number of milliseconds it encodes
struct SleepyEcho;

#[async_trait::async_trait]
impl Handler for SleepyEcho {
    async fn handle(&self, request: Incoming) -> Result<Vec<u8>, Status> {
        let millis: u64 = BincodeCodec
            .decode(&request.payload)
            .map_err(|e| Status::internal(e.to_string()))?;
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok(request.payload)
    }
}

/// Never replies
struct Silent;

#[async_trait::async_trait]
impl Handler for Silent {
    async fn handle(&self, _request: Incoming) -> Result<Vec<u8>, Status> {
        std::future::pending::<Result<Vec<u8>, Status>>().await
    }
}

#[derive(Debug)]
struct Greeting(String);

impl Failer for Greeting {
    fn failed(&self) -> Option<&CallError> {
        None
    }
}

fn identity<T>(value: T) -> addsvc_core::Result<T> {
    Ok(value)
}

fn to_greeting(value: String) -> addsvc_core::Result<Greeting> {
    Ok(Greeting(value))
}

fn from_greeting(value: Greeting) -> addsvc_core::Result<String> {
    Ok(value.0)
}

fn opaque_errors() -> addsvc_fabric::server::ErrorEncoder {
    Arc::new(|_err: &CallError| Status::internal("internal server error"))
}

async fn start(server: Server) -> (SocketAddr, CancellationToken) {
    let listener = TcpTransportListener::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move { server.serve(listener, token).await });
    (addr, shutdown)
}

fn encode_millis(millis: u64) -> Vec<u8> {
    BincodeCodec.encode(&millis).unwrap()
}

#[tokio::test]
async fn concurrent_calls_on_one_connection_get_their_own_replies() {
    let server = Server::builder().handler("test.Echo", SleepyEcho).build();
    let (addr, _shutdown) = start(server).await;
    let conn = Connection::tcp(addr).await.unwrap();

    // Slowest request first, so replies arrive out of order
    let calls = (0..8u64).rev().map(|i| {
        let conn = conn.clone();
        async move {
            let reply = conn
                .call("test.Echo", Metadata::new(), None, encode_millis(i * 20))
                .await
                .unwrap();
            (i, reply)
        }
    });

    for (i, reply) in futures::future::join_all(calls).await {
        assert_eq!(reply, encode_millis(i * 20));
    }
}

#[tokio::test]
async fn unknown_method_is_unimplemented() {
    let (addr, _shutdown) = start(Server::builder().build()).await;
    let conn = Connection::tcp(addr).await.unwrap();

    match conn.call("test.Missing", Metadata::new(), None, Vec::new()).await {
        Err(Error::Status(status)) => {
            assert_eq!(status.code(), Code::Unimplemented);
            assert!(status.message().contains("test.Missing"));
        }
        other => panic!("Expected Unimplemented, got {:?}", other),
    }
}

#[tokio::test]
async fn deadline_bounds_a_silent_handler() {
    let server = Server::builder().handler("test.Silent", Silent).build();
    let (addr, _shutdown) = start(server).await;
    let conn = Connection::tcp(addr).await.unwrap();

    let started = Instant::now();
    let deadline = started + Duration::from_millis(100);
    let result = conn
        .call("test.Silent", Metadata::new(), Some(deadline), Vec::new())
        .await;

    // Either side may notice the deadline first
    match result {
        Err(Error::DeadlineExceeded) => {}
        Err(Error::Status(status)) => assert_eq!(status.code(), Code::DeadlineExceeded),
        other => panic!("Expected deadline exceeded, got {:?}", other),
    }
    assert!(started.elapsed() < Duration::from_secs(2));

    // Connection remains usable afterwards
    assert!(!conn.is_closed());
}

#[tokio::test]
async fn oversized_request_fails_alone() {
    let server = Server::builder().handler("test.Echo", SleepyEcho).build();
    let (addr, _shutdown) = start(server).await;
    let conn = Connection::tcp(addr).await.unwrap();

    // The payload fits the frame limit, the envelope around it does not
    let result = conn
        .call("test.Echo", Metadata::new(), None, vec![0u8; MAX_FRAME_LEN])
        .await;
    assert!(matches!(result, Err(Error::InvalidFrame(_))), "got {:?}", result);

    let reply = conn
        .call("test.Echo", Metadata::new(), None, encode_millis(0))
        .await
        .unwrap();
    assert_eq!(reply, encode_millis(0));
    assert!(!conn.is_closed());
}

#[tokio::test]
async fn expired_deadline_fails_without_sending() {
    let server = Server::builder().handler("test.Echo", SleepyEcho).build();
    let (addr, _shutdown) = start(server).await;
    let conn = Connection::tcp(addr).await.unwrap();

    let result = conn
        .call("test.Echo", Metadata::new(), Some(Instant::now()), encode_millis(0))
        .await;
    assert!(matches!(result, Err(Error::DeadlineExceeded)));
}

#[tokio::test]
async fn close_fails_pending_calls() {
    let server = Server::builder().handler("test.Silent", Silent).build();
    let (addr, _shutdown) = start(server).await;
    let conn = Connection::tcp(addr).await.unwrap();

    let pending = {
        let conn = conn.clone();
        tokio::spawn(async move { conn.call("test.Silent", Metadata::new(), None, Vec::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    conn.close();

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(Error::ConnectionClosed)), "got {:?}", result);

    let after = conn.call("test.Silent", Metadata::new(), None, Vec::new()).await;
    assert!(matches!(after, Err(Error::ConnectionClosed)));
}

#[tokio::test]
async fn bound_endpoints_carry_the_token_across_the_wire() {
    let whoami = Endpoint::new(|ctx: Context, greeting: Greeting| async move {
        let token = ctx.token().unwrap_or("anonymous").to_string();
        Ok::<_, CallError>(Greeting(format!("{} {}", greeting.0, token)))
    });
    let handler = EndpointHandler::new(whoami, to_greeting, from_greeting, opaque_errors()).before(extract_token());
    let server = Server::builder().handler("test.WhoAmI", handler).build();
    let (addr, _shutdown) = start(server).await;

    let conn = Connection::tcp(addr).await.unwrap();
    let remote = RemoteEndpoint::new(conn, "test.WhoAmI", identity::<String>, identity::<String>)
        .before(inject_token())
        .endpoint();

    let reply = remote
        .call(Context::background().with_token("t0k3n"), "hello".to_string())
        .await
        .unwrap();
    assert_eq!(reply, "hello t0k3n");

    let reply = remote.call(Context::background(), "hello".to_string()).await.unwrap();
    assert_eq!(reply, "hello anonymous");
}

#[tokio::test]
async fn endpoint_errors_reach_the_caller_as_encoded_status() {
    let failing = Endpoint::new(|_ctx: Context, _greeting: Greeting| async move {
        Err::<Greeting, _>(CallError::domain("database password is hunter2"))
    });
    let handler = EndpointHandler::new(failing, to_greeting, from_greeting, opaque_errors());
    let server = Server::builder().handler("test.Fail", handler).build();
    let (addr, _shutdown) = start(server).await;

    let conn = Connection::tcp(addr).await.unwrap();
    let remote = RemoteEndpoint::new(conn, "test.Fail", identity::<String>, identity::<String>).endpoint();

    let err = remote
        .call(Context::background(), "hello".to_string())
        .await
        .unwrap_err();
    let status = err.status().expect("status in chain");
    assert_eq!(status.code(), Code::Internal);
    assert_eq!(status.message(), "internal server error");
    assert!(!err.to_string().contains("hunter2"));
}

#[tokio::test]
async fn shutdown_stops_accepting_connections() {
    let listener = TcpTransportListener::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let shutdown = CancellationToken::new();
    let server = Server::builder().handler("test.Echo", SleepyEcho).build();
    let serving = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { server.serve(listener, shutdown).await })
    };

    shutdown.cancel();
    let stopped = tokio::time::timeout(Duration::from_secs(2), serving).await;
    assert!(matches!(stopped, Ok(Ok(Ok(())))));
}

#[tokio::test]
async fn shutdown_skips_requests_waiting_for_a_slot() {
    let server = Server::builder()
        .config(ServerConfig {
            max_in_flight: 1,
            ..ServerConfig::default()
        })
        .handler("test.Echo", SleepyEcho)
        .build();
    let (addr, shutdown) = start(server).await;
    let conn = Connection::tcp(addr).await.unwrap();

    let running = {
        let conn = conn.clone();
        tokio::spawn(async move { conn.call("test.Echo", Metadata::new(), None, encode_millis(300)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let waiting = {
        let conn = conn.clone();
        tokio::spawn(async move { conn.call("test.Echo", Metadata::new(), None, encode_millis(0)).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();

    // The running request still gets its reply, the queued one is never dispatched
    assert_eq!(running.await.unwrap().unwrap(), encode_millis(300));
    let result = waiting.await.unwrap();
    assert!(matches!(result, Err(Error::ConnectionClosed)), "got {:?}", result);
}
