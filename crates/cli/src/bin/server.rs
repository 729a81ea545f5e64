//! Server entrypoint: binds a listening socket and serves the demo registry.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]

use std::io::{self, Write};
use std::net::{IpAddr, SocketAddr};

use clap::Parser;
use tracing::info;

use trustsock_cli::{config, services};
use trustsock_rpc::{Authenticator, Dispatcher, RpcServer, ServerConfig};

#[derive(Clone, Debug, Parser)]
#[command(version, about = "Trusted RPC server", long_about = None)]
struct Args {
    /// Host to bind.
    #[arg(long, default_value = "127.0.0.1", env = "TRUSTSOCK_HOST")]
    host: String,

    /// Port to listen on (0 for an OS-assigned port).
    #[arg(long, default_value_t = 8888, env = "TRUSTSOCK_PORT")]
    port: u16,
}

#[tokio::main]
async fn main() -> trustsock_rpc::Result<()> {
    config::load_dotenv();
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let host: IpAddr = args
        .host
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid host: {e}")))?;
    let addr = SocketAddr::new(host, args.port);

    let token = config::trust_token_from_env();
    if token.is_none() {
        info!("no {} configured, handshakes will fail", config::TRUST_ID_ENV);
    }

    let mut server = RpcServer::bind(
        addr,
        Authenticator::new(token),
        Dispatcher::new(services::demo_registry()),
        ServerConfig::default(),
    )
    .await?;
    let local = server.local_addr()?;

    // Machine-readable line consumed by supervising processes and tests.
    println!("SERVING_ON::{}::{}", local.ip(), local.port());
    io::stdout().flush()?;

    if let Some(handle) = server.shutdown_handle() {
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("received interrupt, shutting down");
            handle.shutdown();
        });
    }

    server.serve().await
}
