//! addsvc core - call context, error taxonomy and the endpoint abstraction
//!
//! Everything here is transport independent. The fabric crate moves bytes,
//! the service crates bind domain operations to endpoints built from these
//! types.

pub mod context;
pub mod endpoint;
pub mod error;
pub mod status;
pub mod trace;

pub use context::Context;
pub use endpoint::{chain, Endpoint, Failer, Middleware};
pub use error::{BoxError, Error, ErrorKind, Result};
pub use status::{Code, Status};
pub use trace::{trace_client, trace_server, LogTracer, Span, SpanKind, TraceContext, Tracer};
