//! End-to-end tests over loopback TCP: handshake, multiplexing, close
//! semantics, and the blocking adapter.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value, json};
use tokio_test::assert_ok;

use trustsock_rpc::{
    Authenticator, ConnectionError, Dispatcher, Error, HandshakeError, MethodRegistry, RpcClient,
    RpcServer, ServerConfig, ServiceError, TrustToken,
};

const TEST_TOKEN: &str = "test-secret-id-12345";
const WRONG_TOKEN: &str = "wrong-id-67890";

fn test_registry() -> MethodRegistry {
    let mut registry = MethodRegistry::new();
    registry.register_sync("greet", |args, _kwargs| match args.first() {
        Some(Value::String(name)) => Ok(json!(format!("Hello, {name}!"))),
        _ => Err(ServiceError::type_error("Name must be a string")),
    });
    registry.register("long_running_task", |args: Vec<Value>, _kwargs| async move {
        let seconds = args.first().and_then(Value::as_u64).unwrap_or(1);
        tokio::time::sleep(Duration::from_secs(seconds)).await;
        Ok(json!(format!("Task completed after {seconds} seconds.")))
    });
    registry
}

async fn start_server(token: Option<&str>) -> SocketAddr {
    let addr = trustsock_util::port_allocator::allocate_socket_addr();
    let server = RpcServer::bind(
        addr,
        Authenticator::new(token.map(TrustToken::new)),
        Dispatcher::new(test_registry()),
        ServerConfig::default(),
    )
    .await
    .unwrap();
    let local = server.local_addr().unwrap();
    tokio::spawn(server.serve());
    local
}

fn client_for(addr: SocketAddr, token: Option<&str>) -> RpcClient {
    RpcClient::new(addr, token.map(TrustToken::new))
}

#[tokio::test]
async fn greet_roundtrip() {
    let addr = start_server(Some(TEST_TOKEN)).await;
    let client = client_for(addr, Some(TEST_TOKEN));

    let result = client
        .call_async("greet", vec![json!("Tester")], Map::new())
        .await
        .unwrap();
    assert_eq!(result, json!("Hello, Tester!"));

    client.close().await;
}

#[tokio::test]
async fn connect_is_idempotent() {
    let addr = start_server(Some(TEST_TOKEN)).await;
    let client = client_for(addr, Some(TEST_TOKEN));

    assert_ok!(client.connect().await);
    assert_ok!(client.connect().await);

    let result = client
        .call_async("greet", vec![json!("Again")], Map::new())
        .await
        .unwrap();
    assert_eq!(result, json!("Hello, Again!"));

    client.close().await;
}

#[tokio::test]
async fn concurrent_calls_resolve_out_of_order() {
    let addr = start_server(Some(TEST_TOKEN)).await;
    let client = Arc::new(client_for(addr, Some(TEST_TOKEN)));
    client.connect().await.unwrap();

    // The slow call goes out first and is still pending when the fast call
    // comes back: correlation is by ID, not arrival order.
    let long_call = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            client
                .call_async("long_running_task", vec![json!(2)], Map::new())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let greeting = client
        .call_async("greet", vec![json!("Tester")], Map::new())
        .await
        .unwrap();
    assert_eq!(greeting, json!("Hello, Tester!"));
    assert!(!long_call.is_finished());

    let long_result = long_call.await.unwrap().unwrap();
    assert_eq!(long_result, json!("Task completed after 2 seconds."));

    client.close().await;
}

#[tokio::test]
async fn unknown_method_is_a_remote_fault() {
    let addr = start_server(Some(TEST_TOKEN)).await;
    let client = client_for(addr, Some(TEST_TOKEN));

    let err = client
        .call_async("no_such_method", Vec::new(), Map::new())
        .await
        .unwrap_err();
    match err {
        Error::Remote(fault) => {
            assert_eq!(fault.kind, "NameError");
            assert_eq!(
                fault.to_string(),
                "NameError: Method 'no_such_method' not found."
            );
        }
        other => panic!("expected remote fault, got {other:?}"),
    }

    // The connection survives per-call faults.
    let result = client
        .call_async("greet", vec![json!("Still")], Map::new())
        .await
        .unwrap();
    assert_eq!(result, json!("Hello, Still!"));

    client.close().await;
}

#[tokio::test]
async fn type_fault_propagates_verbatim() {
    let addr = start_server(Some(TEST_TOKEN)).await;
    let client = client_for(addr, Some(TEST_TOKEN));

    let err = client
        .call_async("greet", vec![json!(12345)], Map::new())
        .await
        .unwrap_err();
    match err {
        Error::Remote(fault) => {
            assert_eq!(fault.to_string(), "TypeError: Name must be a string");
        }
        other => panic!("expected remote fault, got {other:?}"),
    }

    client.close().await;
}

#[tokio::test]
async fn close_fails_pending_calls_and_empties_the_table() {
    let addr = start_server(Some(TEST_TOKEN)).await;
    let client = Arc::new(client_for(addr, Some(TEST_TOKEN)));
    client.connect().await.unwrap();

    let pending_call = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            client
                .call_async("long_running_task", vec![json!(5)], Map::new())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(client.pending_calls().await, 1);

    client.close().await;

    let err = pending_call.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Connection(ConnectionError::Closed)));
    assert_eq!(client.pending_calls().await, 0);
}

#[tokio::test]
async fn close_is_idempotent() {
    let addr = start_server(Some(TEST_TOKEN)).await;
    let client = client_for(addr, Some(TEST_TOKEN));
    client.connect().await.unwrap();

    client.close().await;
    client.close().await;
}

#[tokio::test]
async fn mismatched_tokens_are_rejected() {
    let addr = start_server(Some(TEST_TOKEN)).await;
    let client = client_for(addr, Some(WRONG_TOKEN));

    let err = client.connect().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Handshake(HandshakeError::Rejected)
    ));

    // The failed attempt leaves the client disconnected, not half-open.
    assert_eq!(client.pending_calls().await, 0);
}

#[tokio::test]
async fn client_without_token_fails_locally() {
    let addr = start_server(Some(TEST_TOKEN)).await;
    let client = client_for(addr, None);

    let err = client.connect().await.unwrap_err();
    match err {
        Error::Handshake(fault) => {
            assert_eq!(fault.to_string(), "client secret not configured");
        }
        other => panic!("expected handshake fault, got {other:?}"),
    }
}

#[tokio::test]
async fn server_binds_os_assigned_port() {
    let server = RpcServer::bind(
        "127.0.0.1:0".parse().unwrap(),
        Authenticator::new(Some(TrustToken::new(TEST_TOKEN))),
        Dispatcher::new(test_registry()),
        ServerConfig::default(),
    )
    .await
    .unwrap();

    let local = server.local_addr().unwrap();
    assert_ne!(local.port(), 0);

    tokio::spawn(server.serve());

    let client = client_for(local, Some(TEST_TOKEN));
    assert_ok!(client.connect().await);
    client.close().await;
}

#[test]
fn call_sync_outside_any_runtime() {
    // The server still needs a runtime of its own; the adapter under test
    // runs on this plain thread with no ambient scheduler.
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let addr = runtime.block_on(start_server(Some(TEST_TOKEN)));

    let client = client_for(addr, Some(TEST_TOKEN));
    let result = client
        .call_sync("greet", vec![json!("Bob")], Map::new())
        .unwrap();
    assert_eq!(result, json!("Hello, Bob!"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn call_sync_inside_a_runtime_uses_the_thread_escape() {
    let addr = start_server(Some(TEST_TOKEN)).await;
    let client = client_for(addr, Some(TEST_TOKEN));

    let result = tokio::task::spawn_blocking(move || {
        client.call_sync("greet", vec![json!("SyncTester")], Map::new())
    })
    .await
    .unwrap()
    .unwrap();
    assert_eq!(result, json!("Hello, SyncTester!"));
}

#[test]
fn call_sync_propagates_remote_faults() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let addr = runtime.block_on(start_server(Some(TEST_TOKEN)));

    let client = client_for(addr, Some(TEST_TOKEN));
    let err = client
        .call_sync("greet", vec![json!(123)], Map::new())
        .unwrap_err();
    match err {
        Error::Remote(fault) => {
            assert_eq!(fault.to_string(), "TypeError: Name must be a string");
        }
        other => panic!("expected remote fault, got {other:?}"),
    }
}
