//! Demo client entrypoint: exercises the async, error, and sync call paths.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]

use std::net::{IpAddr, SocketAddr};

use clap::Parser;
use serde_json::{Map, json};

use trustsock_cli::config;
use trustsock_rpc::RpcClient;

#[derive(Clone, Debug, Parser)]
#[command(version, about = "Trusted RPC demo client", long_about = None)]
struct Args {
    /// Server host.
    #[arg(long, default_value = "127.0.0.1", env = "TRUSTSOCK_HOST")]
    host: String,

    /// Server port.
    #[arg(long, default_value_t = 8888, env = "TRUSTSOCK_PORT")]
    port: u16,
}

#[tokio::main]
async fn main() -> trustsock_rpc::Result<()> {
    config::load_dotenv();
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let host: IpAddr = args.host.parse().map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid host: {e}"),
        )
    })?;
    let addr = SocketAddr::new(host, args.port);

    let client = RpcClient::new(addr, config::trust_token_from_env());
    client.connect().await?;

    // Two calls in flight at once; the fast one resolves while the slow one
    // is still pending on the same connection.
    let (greeting, long_task) = tokio::join!(
        client.call_async("greet", vec![json!("Alice")], Map::new()),
        client.call_async("long_running_task", vec![json!(2)], Map::new()),
    );
    println!("async 'greet' result: {}", greeting?);
    println!("async 'long_running_task' result: {}", long_task?);

    match client
        .call_async("non_existent_function", Vec::new(), Map::new())
        .await
    {
        Err(fault) => println!("async error test successful: {fault}"),
        Ok(value) => println!("unexpected success: {value}"),
    }
    client.close().await;

    // Blocking adapter driven from inside this runtime: the call runs on an
    // isolated thread with its own scheduler and connection.
    println!("--- testing sync call ---");
    let sync_client = RpcClient::new(addr, config::trust_token_from_env());
    let result = sync_client.call_sync("greet", vec![json!("Bob")], Map::new())?;
    println!("sync 'greet' result: {result}");

    match sync_client.call_sync("greet", vec![json!(123)], Map::new()) {
        Err(fault) => println!("sync error test successful: {fault}"),
        Ok(value) => println!("unexpected success: {value}"),
    }

    Ok(())
}
