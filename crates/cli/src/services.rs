//! Demo methods served by the server entrypoint.

use std::time::Duration;

use serde_json::{Map, Value, json};
use tracing::info;
use trustsock_rpc::{MethodRegistry, MethodResult, ServiceError};

/// Build the registry of demo methods.
#[must_use]
pub fn demo_registry() -> MethodRegistry {
    let mut registry = MethodRegistry::new();
    registry.register_sync("greet", greet);
    registry.register("long_running_task", long_running_task);
    registry
}

/// Greet by name; the name may be positional or the `name` keyword.
fn greet(args: Vec<Value>, kwargs: Map<String, Value>) -> MethodResult {
    let name = args.first().cloned().or_else(|| kwargs.get("name").cloned());
    match name {
        Some(Value::String(name)) => Ok(json!(format!("Hello, {name}!"))),
        _ => Err(ServiceError::type_error("Name must be a string")),
    }
}

/// Sleep for the requested number of seconds, then report completion.
async fn long_running_task(args: Vec<Value>, kwargs: Map<String, Value>) -> MethodResult {
    let seconds = args
        .first()
        .cloned()
        .or_else(|| kwargs.get("seconds").cloned())
        .as_ref()
        .and_then(Value::as_u64)
        .ok_or_else(|| ServiceError::type_error("Seconds must be an integer"))?;

    info!(seconds, "starting long task");
    tokio::time::sleep(Duration::from_secs(seconds)).await;
    info!(seconds, "long task finished");

    Ok(json!(format!("Task completed after {seconds} seconds.")))
}
