//! Trusted RPC transport over TCP.
//!
//! Two peers share a secret trust token. Before any application traffic
//! flows, a challenge–response handshake proves both sides know the secret
//! without ever sending it. After the handshake, the connection carries
//! length-prefixed, correlation-ID-tagged JSON requests and responses,
//! multiplexed over one socket with many calls in flight at once.
//!
//! # Features
//!
//! - **Mutual trust**: single-use random challenge, SHA-256 digest response,
//!   constant-time verification
//! - **Multiplexing**: background listener correlates responses to calls by
//!   ID; arrival order is irrelevant
//! - **Sync adapter**: blocking callers bridge onto the async transport,
//!   with a thread-isolated escape hatch from inside a running runtime
//! - **Fault isolation**: a faulting method fails its call, never the
//!   connection
//!
//! # Example
//!
//! ```no_run
//! use serde_json::{Map, json};
//! use trustsock_rpc::{
//!     Authenticator, Dispatcher, MethodRegistry, RpcClient, RpcServer, ServerConfig, TrustToken,
//! };
//!
//! async fn example() -> trustsock_rpc::Result<()> {
//!     let token = || Some(TrustToken::new("shared-secret"));
//!
//!     let mut registry = MethodRegistry::new();
//!     registry.register_sync("greet", |args, _kwargs| {
//!         Ok(json!(format!("Hello, {}!", args[0].as_str().unwrap_or("?"))))
//!     });
//!
//!     let server = RpcServer::bind(
//!         "127.0.0.1:0".parse().unwrap(),
//!         Authenticator::new(token()),
//!         Dispatcher::new(registry),
//!         ServerConfig::default(),
//!     )
//!     .await?;
//!     let addr = server.local_addr()?;
//!     tokio::spawn(server.serve());
//!
//!     let client = RpcClient::new(addr, token());
//!     let greeting = client
//!         .call_async("greet", vec![json!("World")], Map::new())
//!         .await?;
//!     println!("{greeting}");
//!     client.close().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod transport;

// Re-export commonly used types
pub use dispatch::{Dispatcher, MethodRegistry, MethodResult, ServiceError};
pub use error::{
    CodecError, ConnectionError, Error, HandshakeError, ProtocolError, RemoteError, Result,
};
pub use protocol::{
    framing::FrameCodec,
    handshake::{Authenticator, Role, TrustToken},
    message::{CallParams, RpcRequest, RpcResponse},
};
pub use transport::{
    client::RpcClient,
    server::{RpcServer, ServerConfig, ShutdownHandle},
};

// Re-export dependencies that are part of our public API
pub use bytes::Bytes;
