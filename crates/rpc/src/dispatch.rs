//! Server-side call dispatch.
//!
//! A [`MethodRegistry`] maps method names to callables; the [`Dispatcher`]
//! decodes one request payload, invokes the named method, and encodes the
//! outcome. It always produces a well-formed response frame, even when the
//! call itself fails, so a faulting method never tears down the connection.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::protocol::codec;
use crate::protocol::message::{RpcRequest, RpcResponse};

/// Typed application fault raised by a registered method.
///
/// Rendered as `"Kind: message"` at the wire boundary.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    /// Fault category, e.g. `TypeError`.
    pub kind: String,
    /// Human-readable fault description.
    pub message: String,
}

impl ServiceError {
    /// Build a fault with an arbitrary kind.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Build a `TypeError` fault.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }

    /// Build a `NameError` fault.
    pub fn name_error(message: impl Into<String>) -> Self {
        Self::new("NameError", message)
    }
}

/// Outcome of one method invocation.
pub type MethodResult = std::result::Result<Value, ServiceError>;

/// Boxed future returned by a registered method.
pub type MethodFuture = BoxFuture<'static, MethodResult>;

/// A registered callable: positional args and keyword args in, value out.
pub type Method = Arc<dyn Fn(Vec<Value>, Map<String, Value>) -> MethodFuture + Send + Sync>;

/// Externally supplied mapping from method name to callable.
#[derive(Clone, Default)]
pub struct MethodRegistry {
    methods: HashMap<String, Method>,
}

impl MethodRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an asynchronous method under `name`.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, method: F)
    where
        F: Fn(Vec<Value>, Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MethodResult> + Send + 'static,
    {
        self.methods.insert(
            name.into(),
            Arc::new(move |args, kwargs| -> MethodFuture { Box::pin(method(args, kwargs)) }),
        );
    }

    /// Register a synchronous method under `name`.
    pub fn register_sync<F>(&mut self, name: impl Into<String>, method: F)
    where
        F: Fn(Vec<Value>, Map<String, Value>) -> MethodResult + Send + Sync + 'static,
    {
        self.methods.insert(
            name.into(),
            Arc::new(move |args, kwargs| -> MethodFuture {
                let result = method(args, kwargs);
                Box::pin(std::future::ready(result))
            }),
        );
    }

    /// Look up a method by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    /// Number of registered methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Whether the registry has no methods.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Decodes requests, invokes registered methods, encodes responses.
pub struct Dispatcher {
    registry: MethodRegistry,
}

impl Dispatcher {
    /// Create a dispatcher over a registry.
    #[must_use]
    pub fn new(registry: MethodRegistry) -> Self {
        Self { registry }
    }

    /// Handle one request payload, always yielding a response payload.
    pub async fn dispatch(&self, request: &[u8]) -> Bytes {
        let response = self.dispatch_inner(request).await;
        match codec::encode(&response) {
            Ok(payload) => payload,
            Err(e) => {
                // Responses are built from JSON values, so this should be
                // unreachable; answer with a static fallback either way.
                warn!(error = %e, "failed to encode response");
                Bytes::from_static(
                    br#"{"id":null,"result":null,"error":"InternalError: response encoding failed"}"#,
                )
            }
        }
    }

    async fn dispatch_inner(&self, request: &[u8]) -> RpcResponse {
        let request: RpcRequest = match serde_json::from_slice(request) {
            Ok(request) => request,
            Err(e) => return RpcResponse::failure(None, format!("ParseError: {e}")),
        };

        let Some(method) = self.registry.get(&request.method) else {
            return RpcResponse::failure(
                Some(request.id),
                ServiceError::name_error(format!("Method '{}' not found.", request.method))
                    .to_string(),
            );
        };

        debug!(method = %request.method, id = %request.id, "dispatching call");
        match (method.as_ref())(request.params.args, request.params.kwargs).await {
            Ok(result) => RpcResponse::success(request.id, result),
            Err(fault) => RpcResponse::failure(Some(request.id), fault.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn greeting_registry() -> MethodRegistry {
        let mut registry = MethodRegistry::new();
        registry.register_sync("greet", |args, kwargs| {
            let name = args
                .first()
                .cloned()
                .or_else(|| kwargs.get("name").cloned());
            match name {
                Some(Value::String(name)) => Ok(json!(format!("Hello, {name}!"))),
                _ => Err(ServiceError::type_error("Name must be a string")),
            }
        });
        registry.register("echo", |args, _kwargs| async move {
            Ok(Value::Array(args))
        });
        registry
    }

    async fn roundtrip(dispatcher: &Dispatcher, request: &RpcRequest) -> RpcResponse {
        let payload = codec::encode(request).unwrap();
        codec::decode(&dispatcher.dispatch(&payload).await).unwrap()
    }

    #[tokio::test]
    async fn dispatches_sync_method() {
        let dispatcher = Dispatcher::new(greeting_registry());
        let request = RpcRequest::new("greet", vec![json!("Tester")], Map::new());

        let response = roundtrip(&dispatcher, &request).await;
        assert_eq!(response.id, Some(request.id));
        assert_eq!(response.result, Some(json!("Hello, Tester!")));
        assert_eq!(response.error, None);
    }

    #[tokio::test]
    async fn dispatches_async_method() {
        let dispatcher = Dispatcher::new(greeting_registry());
        let request = RpcRequest::new("echo", vec![json!(1), json!(2)], Map::new());

        let response = roundtrip(&dispatcher, &request).await;
        assert_eq!(response.result, Some(json!([1, 2])));
    }

    #[tokio::test]
    async fn keyword_arguments_reach_the_method() {
        let dispatcher = Dispatcher::new(greeting_registry());
        let mut kwargs = Map::new();
        kwargs.insert("name".to_owned(), json!("Kw"));
        let request = RpcRequest::new("greet", Vec::new(), kwargs);

        let response = roundtrip(&dispatcher, &request).await;
        assert_eq!(response.result, Some(json!("Hello, Kw!")));
    }

    #[tokio::test]
    async fn unknown_method_renders_name_error() {
        let dispatcher = Dispatcher::new(greeting_registry());
        let request = RpcRequest::new("no_such_method", Vec::new(), Map::new());

        let response = roundtrip(&dispatcher, &request).await;
        assert_eq!(response.id, Some(request.id));
        assert_eq!(response.result, None);
        assert_eq!(
            response.error.as_deref(),
            Some("NameError: Method 'no_such_method' not found.")
        );
    }

    #[tokio::test]
    async fn method_fault_renders_kind_and_message() {
        let dispatcher = Dispatcher::new(greeting_registry());
        let request = RpcRequest::new("greet", vec![json!(12345)], Map::new());

        let response = roundtrip(&dispatcher, &request).await;
        assert_eq!(
            response.error.as_deref(),
            Some("TypeError: Name must be a string")
        );
    }

    #[tokio::test]
    async fn unparseable_request_gets_null_id() {
        let dispatcher = Dispatcher::new(greeting_registry());

        let response: RpcResponse =
            codec::decode(&dispatcher.dispatch(b"definitely not json").await).unwrap();
        assert_eq!(response.id, None);
        assert_eq!(response.result, None);
        assert!(response.error.unwrap().starts_with("ParseError: "));
    }
}
