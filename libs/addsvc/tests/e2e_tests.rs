use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use addsvc::service::{AddService, AuthRequired, BasicService};
use addsvc::transport::{make_rpc_client, make_rpc_server};
use addsvc::{pb, Endpoints};
use addsvc_core::{Code, Context, Error, ErrorKind, LogTracer, Result, Span, SpanKind, TraceContext, Tracer};
use addsvc_fabric::transport::{TcpTransportListener, UnixTransportListener};
use addsvc_fabric::{Connection, Metadata};
use tokio_util::sync::CancellationToken;

struct Harness {
    client: Endpoints,
    conn: Connection,
    shutdown: CancellationToken,
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.conn.close();
        self.shutdown.cancel();
    }
}

async fn serve(svc: impl AddService + 'static) -> SocketAddr {
    let listener = TcpTransportListener::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let server = make_rpc_server(Endpoints::new(svc, Arc::new(LogTracer)));
    tokio::spawn(async move { server.serve(listener, CancellationToken::new()).await });
    addr
}

async fn harness(svc: impl AddService + 'static) -> Harness {
    let listener = TcpTransportListener::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let server = make_rpc_server(Endpoints::new(svc, Arc::new(LogTracer)));
    let token = shutdown.clone();
    tokio::spawn(async move { server.serve(listener, token).await });

    let conn = Connection::tcp(addr).await.unwrap();
    Harness {
        client: make_rpc_client(conn.clone(), Arc::new(LogTracer)),
        conn,
        shutdown,
    }
}

#[tokio::test]
async fn sum_over_the_wire() {
    let h = harness(BasicService).await;
    let ctx = Context::background();

    assert_eq!(h.client.sum(&ctx, 2, 3).await.unwrap(), 5);
    assert_eq!(h.client.sum(&ctx, -10, 4).await.unwrap(), -6);
}

#[tokio::test]
async fn concat_over_the_wire() {
    let h = harness(BasicService).await;
    let ctx = Context::background();

    assert_eq!(h.client.concat(&ctx, "foo", "bar").await.unwrap(), "foobar");
    assert_eq!(h.client.concat(&ctx, "", "").await.unwrap(), "");
}

#[tokio::test]
async fn missing_token_is_unauthenticated() {
    let h = harness(AuthRequired::new(BasicService)).await;

    let err = h.client.sum(&Context::background(), 1, 2).await.unwrap_err();
    let status = err.status().expect("remote status");
    assert_eq!(err.kind(), ErrorKind::Remote);
    assert_eq!(status.code(), Code::Unauthenticated);
    assert!(status
        .message()
        .contains("token up for parsing was not passed through the context"));
}

#[tokio::test]
async fn token_is_propagated_to_the_service() {
    let h = harness(AuthRequired::new(BasicService)).await;
    let ctx = Context::background().with_token("t0k3n");

    assert_eq!(h.client.sum(&ctx, 1, 2).await.unwrap(), 3);
    assert_eq!(h.client.concat(&ctx, "a", "b").await.unwrap(), "ab");
}

#[tokio::test]
async fn domain_errors_are_opaque_to_the_caller() {
    let h = harness(BasicService).await;

    let err = h
        .client
        .sum(&Context::background(), i64::MAX, 1)
        .await
        .unwrap_err();
    let status = err.status().expect("remote status");
    assert_eq!(status.code(), Code::Internal);
    assert_eq!(status.message(), "internal server error");
    assert!(!err.to_string().contains("overflow"));
}

#[tokio::test]
async fn undecodable_payload_is_opaque_internal() {
    let h = harness(BasicService).await;

    let result = h.conn.call(pb::METHOD_SUM, Metadata::new(), None, vec![1, 2, 3]).await;
    match result {
        Err(addsvc_fabric::error::Error::Status(status)) => {
            assert_eq!(status.code(), Code::Internal);
            assert_eq!(status.message(), "internal server error");
        }
        other => panic!("Expected Internal, got {:?}", other),
    }

    // The connection keeps serving well-formed calls
    assert_eq!(h.client.sum(&Context::background(), 2, 3).await.unwrap(), 5);
}

#[tokio::test]
async fn concurrent_calls_share_one_connection() {
    let h = harness(BasicService).await;
    let ctx = Context::background();

    let calls = (0..64i64).map(|i| {
        let client = h.client.clone();
        let ctx = ctx.clone();
        async move { (i, client.sum(&ctx, i, i).await) }
    });

    for (i, res) in futures::future::join_all(calls).await {
        assert_eq!(res.unwrap(), i * 2);
    }
}

struct Stalled;

#[async_trait::async_trait]
impl AddService for Stalled {
    async fn sum(&self, _ctx: &Context, _a: i64, _b: i64) -> Result<i64> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(0)
    }

    async fn concat(&self, _ctx: &Context, a: &str, b: &str) -> Result<String> {
        Ok(format!("{a}{b}"))
    }
}

#[tokio::test]
async fn deadline_cuts_a_stalled_call_short() {
    let h = harness(Stalled).await;
    let started = Instant::now();

    let ctx = Context::background().with_timeout(Duration::from_millis(150));
    let err = h.client.sum(&ctx, 1, 1).await.unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(5));
    let deadline_hit = match err.status() {
        Some(status) => status.code() == Code::DeadlineExceeded,
        None => err.kind() == ErrorKind::Transport,
    };
    assert!(deadline_hit, "unexpected error: {err}");

    // Other calls on the same connection still work
    assert_eq!(h.client.concat(&Context::background(), "x", "y").await.unwrap(), "xy");
}

#[tokio::test]
async fn server_gone_is_a_transport_error() {
    let addr = serve(BasicService).await;
    let conn = Connection::tcp(addr).await.unwrap();
    let client = make_rpc_client(conn.clone(), Arc::new(LogTracer));
    conn.close();

    let err = client.sum(&Context::background(), 1, 2).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
}

#[derive(Default)]
struct RecordingTracer {
    spans: Mutex<Vec<(String, SpanKind, Option<u128>, u128)>>,
}

impl Tracer for RecordingTracer {
    fn start_span(&self, operation: &str, kind: SpanKind, parent: Option<&TraceContext>) -> Span {
        let span = Span::new(operation, kind, parent, tracing::Span::none());
        self.spans.lock().unwrap().push((
            operation.to_string(),
            kind,
            parent.map(|p| p.trace_id()),
            span.context().trace_id(),
        ));
        span
    }

    fn finish_span(&self, _span: Span, _error: Option<&Error>) {}
}

#[tokio::test]
async fn trace_context_crosses_the_wire() {
    let listener = TcpTransportListener::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let server_tracer = Arc::new(RecordingTracer::default());
    let server = make_rpc_server(Endpoints::new(BasicService, server_tracer.clone()));
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move { server.serve(listener, token).await });

    let conn = Connection::tcp(addr).await.unwrap();
    let client_tracer = Arc::new(RecordingTracer::default());
    let client = make_rpc_client(conn.clone(), client_tracer.clone());
    assert_eq!(client.sum(&Context::background(), 1, 1).await.unwrap(), 2);

    let client_spans = client_tracer.spans.lock().unwrap().clone();
    let server_spans = server_tracer.spans.lock().unwrap().clone();
    assert_eq!(client_spans.len(), 1);
    assert_eq!(server_spans.len(), 1);

    let (client_op, client_kind, client_parent, client_trace) = &client_spans[0];
    assert_eq!(client_op, "Sum");
    assert_eq!(*client_kind, SpanKind::Client);
    assert!(client_parent.is_none());

    let (server_op, server_kind, server_parent, server_trace) = &server_spans[0];
    assert_eq!(server_op, "Sum");
    assert_eq!(*server_kind, SpanKind::Server);
    assert_eq!(*server_parent, Some(*client_trace));
    assert_eq!(server_trace, client_trace);

    conn.close();
    shutdown.cancel();
}

#[tokio::test]
async fn unix_socket_transport_serves_the_same_endpoints() {
    let path = std::env::temp_dir().join(format!("addsvc_e2e_{}.sock", std::process::id()));
    let _ = std::fs::remove_file(&path);

    let listener = UnixTransportListener::bind(&path).await.unwrap();
    let server = make_rpc_server(Endpoints::new(BasicService, Arc::new(LogTracer)));
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move { server.serve(listener, token).await });

    let conn = Connection::unix(&path).await.unwrap();
    let client = make_rpc_client(conn.clone(), Arc::new(LogTracer));
    assert_eq!(client.concat(&Context::background(), "uni", "x").await.unwrap(), "unix");

    conn.close();
    shutdown.cancel();
}
