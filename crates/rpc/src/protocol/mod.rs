//! Protocol layer for the trusted RPC transport.
//!
//! This module contains the core protocol definitions including:
//! - Length-prefixed framing
//! - The mutual-trust handshake
//! - Wire message types and the JSON codec

pub mod codec;
pub mod framing;
pub mod handshake;
pub mod message;

pub use framing::{FRAME_HEADER_SIZE, FrameCodec, MAX_FRAME_SIZE};
pub use handshake::{Authenticator, Role, TrustToken};
pub use message::{CallParams, RpcRequest, RpcResponse};
