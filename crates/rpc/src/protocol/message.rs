//! Wire message types for the RPC phase.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// One RPC call as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Client-generated correlation ID. Never reused while a call is live.
    pub id: Uuid,
    /// Name of the registered method to invoke.
    pub method: String,
    /// Positional and keyword arguments.
    #[serde(default)]
    pub params: CallParams,
}

impl RpcRequest {
    /// Build a request with a fresh correlation ID.
    #[must_use]
    pub fn new(method: impl Into<String>, args: Vec<Value>, kwargs: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method: method.into(),
            params: CallParams { args, kwargs },
        }
    }
}

/// Call arguments; both parts default to empty when absent on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallParams {
    /// Ordered positional arguments.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Keyword arguments.
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

/// The server's answer to one request.
///
/// Exactly one of `result`/`error` is meaningful; `id` is null only when the
/// request could not be parsed at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Correlation ID echoed from the request, or null for unparseable input.
    pub id: Option<Uuid>,
    /// Return value on success, null otherwise.
    pub result: Option<Value>,
    /// Rendered `"Kind: message"` fault on failure, null otherwise.
    pub error: Option<String>,
}

impl RpcResponse {
    /// Build a success response.
    #[must_use]
    pub const fn success(id: Uuid, result: Value) -> Self {
        Self {
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Build a failure response carrying a rendered fault.
    #[must_use]
    pub fn failure(id: Option<Uuid>, error: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_without_params_defaults_to_empty() {
        let raw = r#"{"id":"67e55044-10b1-426f-9247-bb680e5fe0c8","method":"greet"}"#;
        let request: RpcRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(request.method, "greet");
        assert!(request.params.args.is_empty());
        assert!(request.params.kwargs.is_empty());
    }

    #[test]
    fn request_serializes_args_and_kwargs() {
        let mut kwargs = Map::new();
        kwargs.insert("polite".to_owned(), json!(true));
        let request = RpcRequest::new("greet", vec![json!("Alice")], kwargs);

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["method"], json!("greet"));
        assert_eq!(value["params"]["args"], json!(["Alice"]));
        assert_eq!(value["params"]["kwargs"]["polite"], json!(true));
    }

    #[test]
    fn response_renders_explicit_nulls() {
        let response = RpcResponse::failure(None, "ParseError: bad request");
        let raw = serde_json::to_string(&response).unwrap();
        assert!(raw.contains(r#""id":null"#));
        assert!(raw.contains(r#""result":null"#));
    }

    #[test]
    fn success_and_failure_are_mutually_exclusive() {
        let id = Uuid::new_v4();
        let ok = RpcResponse::success(id, json!(42));
        assert_eq!(ok.result, Some(json!(42)));
        assert_eq!(ok.error, None);

        let failed = RpcResponse::failure(Some(id), "TypeError: bad argument");
        assert_eq!(failed.result, None);
        assert_eq!(failed.error.as_deref(), Some("TypeError: bad argument"));
    }
}
