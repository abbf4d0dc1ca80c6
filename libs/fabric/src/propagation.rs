//! Hooks moving auth and trace context between call contexts and metadata.
//!
//! Server hooks run before decoding and derive the call [`Context`] from
//! inbound metadata. Client hooks run before sending and copy the context
//! into outbound metadata. Neither validates tokens.

use std::sync::Arc;

use addsvc_core::{Context, TraceContext};

use crate::metadata::{Metadata, TRACEPARENT};

/// Derives the server call context from inbound metadata
pub type ServerBefore = Arc<dyn Fn(Context, &Metadata) -> Context + Send + Sync>;

/// Writes the client call context into outbound metadata
pub type ClientBefore = Arc<dyn Fn(&Context, &mut Metadata) + Send + Sync>;

/// Move an `authorization: Bearer` token into the context
pub fn extract_token() -> ServerBefore {
    Arc::new(|ctx: Context, metadata: &Metadata| match metadata.bearer_token() {
        Some(token) => ctx.with_token(token),
        None => ctx,
    })
}

/// Copy the context token into `authorization` metadata
pub fn inject_token() -> ClientBefore {
    Arc::new(|ctx: &Context, metadata: &mut Metadata| {
        if let Some(token) = ctx.token() {
            metadata.set_bearer_token(token);
        }
    })
}

/// Adopt the caller's `traceparent` as the parent trace
pub fn extract_trace() -> ServerBefore {
    Arc::new(|ctx: Context, metadata: &Metadata| {
        let Some(value) = metadata.get(TRACEPARENT) else {
            return ctx;
        };
        match TraceContext::from_traceparent(value) {
            Some(trace) => ctx.with_trace(trace),
            None => {
                tracing::debug!(traceparent = value, "ignoring malformed trace context");
                ctx
            }
        }
    })
}

/// Write the active trace as `traceparent` metadata
pub fn inject_trace() -> ClientBefore {
    Arc::new(|ctx: &Context, metadata: &mut Metadata| {
        if let Some(trace) = ctx.trace() {
            metadata.insert(TRACEPARENT, trace.to_traceparent());
        }
    })
}
