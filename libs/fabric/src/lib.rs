//! addsvc Fabric - transport, codec and RPC plumbing
//!
//! Provides framed transports (TCP, Unix sockets), a bincode codec, and the
//! request/response machinery that binds endpoints to the wire on both the
//! server and the client side.
//!
//! # Example
//!
//! ```no_run
//! use addsvc_core::{Context, Error};
//! use addsvc_fabric::client::{Connection, RemoteEndpoint};
//! use addsvc_fabric::propagation::inject_token;
//!
//! fn identity(value: String) -> Result<String, Error> {
//!     Ok(value)
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let conn = Connection::tcp("127.0.0.1:8081".parse()?).await?;
//! let echo = RemoteEndpoint::new(conn.clone(), "echo.Echo/Say", identity, identity)
//!     .before(inject_token())
//!     .endpoint();
//!
//! let _reply = echo
//!     .call(Context::background().with_token("t0k3n"), "hello".to_string())
//!     .await?;
//! conn.close();
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod client;
pub mod codec;
pub mod error;
pub mod frame;
pub mod metadata;
pub mod propagation;
pub mod server;
pub mod transport;

// Re-exports for convenience
pub use channel::Channel;
pub use client::{Connection, ConnectionConfig, RemoteEndpoint};
pub use error::{Error, Result};
pub use metadata::Metadata;
pub use server::{EndpointHandler, Handler, Server, ServerConfig};
