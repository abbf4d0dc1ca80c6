//! Trace propagation and span middleware.
//!
//! A [`TraceContext`] identifies the active span and travels between
//! processes as a W3C `traceparent` value. A [`Tracer`] starts and finishes
//! spans; [`trace_server`] and [`trace_client`] wrap an endpoint with a span
//! named after the operation.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use rand::Rng;
use tracing::Instrument;

use crate::context::Context;
use crate::endpoint::{Endpoint, Failer, Middleware};
use crate::error::Error;

const TRACEPARENT_VERSION: &str = "00";
const FLAG_SAMPLED: u8 = 0x01;

/// Identity of a span that can be propagated to a remote peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceContext {
    trace_id: u128,
    span_id: u64,
    sampled: bool,
}

impl TraceContext {
    /// Start a new trace with a fresh root span
    pub fn new_root() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            trace_id: rng.gen::<u128>().max(1),
            span_id: rng.gen::<u64>().max(1),
            sampled: true,
        }
    }

    /// New span id within the same trace
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: rand::thread_rng().gen::<u64>().max(1),
            sampled: self.sampled,
        }
    }

    pub fn trace_id(&self) -> u128 {
        self.trace_id
    }

    pub fn span_id(&self) -> u64 {
        self.span_id
    }

    pub fn is_sampled(&self) -> bool {
        self.sampled
    }

    pub fn to_traceparent(&self) -> String {
        let flags = if self.sampled { FLAG_SAMPLED } else { 0 };
        format!(
            "{}-{:032x}-{:016x}-{:02x}",
            TRACEPARENT_VERSION, self.trace_id, self.span_id, flags
        )
    }

    /// Parse a `traceparent` header. Malformed or all-zero ids yield `None`.
    pub fn from_traceparent(value: &str) -> Option<Self> {
        let mut parts = value.trim().split('-');
        let version = parts.next()?;
        let trace_id = parts.next()?;
        let span_id = parts.next()?;
        let flags = parts.next()?;

        if version != TRACEPARENT_VERSION
            || parts.next().is_some()
            || trace_id.len() != 32
            || span_id.len() != 16
            || flags.len() != 2
        {
            return None;
        }

        let trace_id = u128::from_str_radix(trace_id, 16).ok()?;
        let span_id = u64::from_str_radix(span_id, 16).ok()?;
        let flags = u8::from_str_radix(flags, 16).ok()?;

        if trace_id == 0 || span_id == 0 {
            return None;
        }

        Some(Self {
            trace_id,
            span_id,
            sampled: flags & FLAG_SAMPLED != 0,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    Server,
    Client,
}

impl SpanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanKind::Server => "server",
            SpanKind::Client => "client",
        }
    }
}

impl fmt::Display for SpanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A started span. Handed back to the tracer to finish it.
#[derive(Debug)]
pub struct Span {
    operation: String,
    kind: SpanKind,
    context: TraceContext,
    parent: Option<TraceContext>,
    started: Instant,
    inner: tracing::Span,
}

impl Span {
    pub fn new(
        operation: &str,
        kind: SpanKind,
        parent: Option<&TraceContext>,
        inner: tracing::Span,
    ) -> Self {
        let context = match parent {
            Some(parent) => parent.child(),
            None => TraceContext::new_root(),
        };
        Self {
            operation: operation.to_string(),
            kind,
            context,
            parent: parent.copied(),
            started: Instant::now(),
            inner,
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn kind(&self) -> SpanKind {
        self.kind
    }

    pub fn context(&self) -> &TraceContext {
        &self.context
    }

    pub fn parent(&self) -> Option<&TraceContext> {
        self.parent.as_ref()
    }

    /// `tracing` span that events emitted during the call are recorded under
    pub fn tracing_span(&self) -> &tracing::Span {
        &self.inner
    }
}

/// Tracing backend the endpoint middleware reports to
pub trait Tracer: Send + Sync {
    fn start_span(&self, operation: &str, kind: SpanKind, parent: Option<&TraceContext>) -> Span;

    fn finish_span(&self, span: Span, error: Option<&Error>);
}

/// Tracer that records spans through the `tracing` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTracer;

impl Tracer for LogTracer {
    fn start_span(&self, operation: &str, kind: SpanKind, parent: Option<&TraceContext>) -> Span {
        let inner = tracing::info_span!(
            "rpc",
            operation = %operation,
            kind = kind.as_str(),
            trace_id = tracing::field::Empty,
            span_id = tracing::field::Empty,
        );
        let span = Span::new(operation, kind, parent, inner);
        span.inner
            .record("trace_id", format!("{:032x}", span.context.trace_id).as_str());
        span.inner
            .record("span_id", format!("{:016x}", span.context.span_id).as_str());
        span
    }

    fn finish_span(&self, span: Span, error: Option<&Error>) {
        let _entered = span.inner.enter();
        let elapsed_us = span.started.elapsed().as_micros() as u64;
        match error {
            Some(err) => tracing::debug!(elapsed_us, error = %err, "span finished with error"),
            None => tracing::debug!(elapsed_us, "span finished"),
        }
    }
}

/// Server-side span middleware: joins the propagated trace if there is one.
/// A response carrying a business error finishes its span as failed.
pub fn trace_server<Req, Res>(tracer: Arc<dyn Tracer>, operation: &'static str) -> Middleware<Req, Res>
where
    Req: Send + 'static,
    Res: Failer + Send + 'static,
{
    traced(tracer, operation, SpanKind::Server)
}

/// Client-side span middleware: the outbound call carries the new span's context
pub fn trace_client<Req, Res>(tracer: Arc<dyn Tracer>, operation: &'static str) -> Middleware<Req, Res>
where
    Req: Send + 'static,
    Res: Failer + Send + 'static,
{
    traced(tracer, operation, SpanKind::Client)
}

fn traced<Req, Res>(tracer: Arc<dyn Tracer>, operation: &'static str, kind: SpanKind) -> Middleware<Req, Res>
where
    Req: Send + 'static,
    Res: Failer + Send + 'static,
{
    Middleware::new(move |next: Endpoint<Req, Res>| {
        let tracer = Arc::clone(&tracer);
        Endpoint::new(move |ctx: Context, request: Req| {
            let tracer = Arc::clone(&tracer);
            let next = next.clone();
            async move {
                let span = tracer.start_span(operation, kind, ctx.trace());
                let ctx = ctx.with_trace(*span.context());
                let result = next
                    .call(ctx, request)
                    .instrument(span.tracing_span().clone())
                    .await;
                let error = match &result {
                    Ok(response) => response.failed(),
                    Err(err) => Some(err),
                };
                tracer.finish_span(span, error);
                result
            }
        })
    })
}
