//! Transport layer for the trusted RPC framework.
//!
//! This module owns the TCP plumbing on both sides: the client multiplexer
//! with its background listener, and the server accept loop with its
//! per-connection handlers.

pub mod client;
pub mod server;

pub use client::RpcClient;
pub use server::{RpcServer, ServerConfig, ShutdownHandle};
