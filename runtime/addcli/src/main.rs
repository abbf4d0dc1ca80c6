//! addcli: command line client for addsvc.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use addsvc::service::AddService;
use addsvc::transport::make_rpc_client;
use addsvc_core::{Context, LogTracer};
use addsvc_fabric::transport::{TcpTransport, UnixTransport};
use addsvc_fabric::Connection;
use anyhow::anyhow;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Call Sum or Concat on a running addsvc
#[derive(Parser, Debug)]
#[command(name = "addcli")]
#[command(about = "Command line client for addsvc")]
struct Args {
    /// Server address: host:port, or unix:<path> for a Unix socket
    #[arg(long, env = "ADDSVC_SERVER", default_value = "127.0.0.1:8081")]
    server: ServerAddr,

    /// sum, concat
    #[arg(long, default_value = "sum")]
    method: String,

    /// Bearer token sent with the call
    #[arg(long, env = "ADDSVC_TOKEN")]
    token: Option<String>,

    /// Call timeout in milliseconds, also bounding the dial and each write
    #[arg(long, default_value_t = 5000)]
    timeout: u64,

    #[arg(allow_negative_numbers = true)]
    a: String,

    #[arg(allow_negative_numbers = true)]
    b: String,
}

#[derive(Debug, Clone, PartialEq)]
enum ServerAddr {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

impl FromStr for ServerAddr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix("unix:") {
            Some("") => Err("unix socket path is empty".to_string()),
            Some(path) => Ok(ServerAddr::Unix(PathBuf::from(path))),
            None => s
                .parse()
                .map(ServerAddr::Tcp)
                .map_err(|e| format!("invalid server address {s:?}: {e}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Method {
    Sum,
    Concat,
}

impl FromStr for Method {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "sum" => Ok(Method::Sum),
            "concat" => Ok(Method::Concat),
            other => Err(anyhow!("invalid method {other:?}")),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    match run(args).await {
        Ok(line) => {
            println!("{line}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<String> {
    let method: Method = args.method.parse()?;

    let timeout = Duration::from_millis(args.timeout);
    let conn = dial(&args.server, timeout)
        .await
        .map_err(|e| anyhow!("failed to dial server {:?}: {e}", args.server))?;
    let client = make_rpc_client(conn.clone(), Arc::new(LogTracer));

    let mut ctx = Context::background().with_timeout(timeout);
    if let Some(token) = &args.token {
        ctx = ctx.with_token(token.as_str());
    }

    let line = match method {
        Method::Sum => {
            let (a, b) = parse_operands(&args.a, &args.b)?;
            let res = client.sum(&ctx, a, b).await;
            res.map(|res| format_sum(a, b, res))
        }
        Method::Concat => {
            let res = client.concat(&ctx, &args.a, &args.b).await;
            res.map(|res| format_concat(&args.a, &args.b, &res))
        }
    };

    conn.close();
    Ok(line?)
}

async fn dial(server: &ServerAddr, timeout: Duration) -> addsvc_fabric::Result<Connection> {
    let conn = match server {
        ServerAddr::Tcp(addr) => {
            let transport = TcpTransport::builder()
                .address(*addr)
                .connect_timeout(timeout)
                .send_timeout(timeout)
                .connect()
                .await?;
            Connection::new(transport)
        }
        ServerAddr::Unix(path) => {
            let transport = UnixTransport::builder()
                .path(path)
                .connect_timeout(timeout)
                .send_timeout(timeout)
                .connect()
                .await?;
            Connection::new(transport)
        }
    };
    Ok(conn)
}

fn parse_operands(a: &str, b: &str) -> anyhow::Result<(i64, i64)> {
    let parse = |s: &str| {
        s.parse::<i64>()
            .map_err(|e| anyhow!("invalid integer {s:?}: {e}"))
    };
    match (parse(a), parse(b)) {
        (Ok(a), Ok(b)) => Ok((a, b)),
        (Err(e), _) | (_, Err(e)) => Err(e),
    }
}

fn format_sum(a: i64, b: i64, res: i64) -> String {
    format!("{a} + {b} = {res}")
}

fn format_concat(a: &str, b: &str, res: &str) -> String {
    format!("{a:?} + {b:?} = {res:?}")
}
