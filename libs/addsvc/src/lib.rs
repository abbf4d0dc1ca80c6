//! addsvc - a small arithmetic service exposed over the fabric RPC transport
//!
//! Layers, innermost first: the [`service::AddService`] implementation, the
//! [`endpoints`] wrapping each method in an endpoint with its middleware, and
//! the [`transport`] binding those endpoints to wire messages.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use addsvc::service::AddService;
//! use addsvc::transport::make_rpc_client;
//! use addsvc_core::{Context, LogTracer};
//! use addsvc_fabric::Connection;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let conn = Connection::tcp("127.0.0.1:8081".parse()?).await?;
//! let client = make_rpc_client(conn.clone(), Arc::new(LogTracer));
//!
//! let ctx = Context::background().with_token("t0k3n");
//! assert_eq!(client.sum(&ctx, 2, 3).await?, 5);
//! conn.close();
//! # Ok(())
//! # }
//! ```

pub mod endpoints;
pub mod pb;
pub mod responses;
pub mod service;
pub mod transport;

pub use endpoints::Endpoints;
pub use service::{AddService, AuthRequired, BasicService, LoggingMiddleware, API_VERSION};
