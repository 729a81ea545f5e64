//! JSON codec for RPC payloads.
//!
//! RPC payloads are UTF-8 JSON; handshake payloads bypass this module and
//! travel as raw frames.

use crate::error::{CodecError, Result};
use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};

/// Encode a message into JSON bytes.
///
/// # Errors
///
/// Returns an error if the message cannot be serialized.
pub fn encode<T: Serialize>(msg: &T) -> Result<Bytes> {
    serde_json::to_vec(msg)
        .map(Bytes::from)
        .map_err(|e| CodecError::SerializationFailed(e.to_string()).into())
}

/// Decode JSON bytes into a message.
///
/// # Errors
///
/// Returns an error if the data is not valid JSON for the target type.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    serde_json::from_slice(data)
        .map_err(|e| CodecError::DeserializationFailed(e.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::{RpcRequest, RpcResponse};
    use serde_json::{Map, json};

    #[test]
    fn test_encode_decode() {
        let request = RpcRequest::new("greet", vec![json!("Alice")], Map::new());

        let encoded = encode(&request).unwrap();
        let decoded: RpcRequest = decode(&encoded).unwrap();

        assert_eq!(decoded.id, request.id);
        assert_eq!(decoded.method, request.method);
        assert_eq!(decoded.params.args, request.params.args);
    }

    #[test]
    fn test_decode_error() {
        let result: Result<RpcResponse> = decode(b"not json at all");
        assert!(result.is_err());
    }
}
