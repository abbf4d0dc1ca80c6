//! addsvc: serves the add service over TCP or a Unix socket.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use addsvc::service::{AddService, AuthRequired, BasicService, LoggingMiddleware};
use addsvc::transport::rpc::make_rpc_server_with_config;
use addsvc::Endpoints;
use addsvc_core::LogTracer;
use addsvc_fabric::transport::{TcpTransportListener, UnixTransportListener};
use addsvc_fabric::ServerConfig;
use anyhow::Context as _;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

mod logging;

/// Arithmetic RPC service
#[derive(Parser, Debug)]
#[command(name = "addsvc")]
#[command(about = "Serves Sum and Concat over the fabric RPC transport")]
struct Args {
    /// TCP address to listen on
    #[arg(long, env = "ADDSVC_LISTEN", default_value = "127.0.0.1:8081")]
    listen: SocketAddr,

    /// Listen on this Unix socket instead of TCP
    #[arg(long, env = "ADDSVC_UNIX_SOCKET")]
    unix_socket: Option<PathBuf>,

    /// Reject calls that carry no bearer token
    #[arg(long, env = "ADDSVC_REQUIRE_TOKEN")]
    require_token: bool,

    /// Requests executed concurrently per connection
    #[arg(long, env = "ADDSVC_MAX_IN_FLIGHT", default_value_t = 256)]
    max_in_flight: usize,

    /// Emit logs as JSON
    #[arg(long, env = "ADDSVC_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(args.log_json);

    let svc: Arc<dyn AddService> = if args.require_token {
        Arc::new(LoggingMiddleware::new(AuthRequired::new(BasicService::new())))
    } else {
        Arc::new(LoggingMiddleware::new(BasicService::new()))
    };

    let config = ServerConfig {
        max_in_flight: args.max_in_flight.max(1),
        ..ServerConfig::default()
    };
    let server = make_rpc_server_with_config(Endpoints::new(svc, Arc::new(LogTracer)), config);

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(shutdown.clone()));

    match &args.unix_socket {
        Some(path) => {
            let listener = UnixTransportListener::bind(path)
                .await
                .with_context(|| format!("failed to bind {}", path.display()))?;
            info!(path = %path.display(), require_token = args.require_token, "addsvc listening");
            server.serve(listener, shutdown).await?;
        }
        None => {
            let listener = TcpTransportListener::bind(args.listen)
                .await
                .with_context(|| format!("failed to bind {}", args.listen))?;
            info!(addr = %listener.local_addr()?, require_token = args.require_token, "addsvc listening");
            server.serve(listener, shutdown).await?;
        }
    }

    info!("addsvc stopped");
    Ok(())
}

async fn cancel_on_ctrl_c(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("interrupt received, shutting down"),
        Err(e) => tracing::warn!(error = %e, "cannot listen for interrupt, shutting down"),
    }
    shutdown.cancel();
}
