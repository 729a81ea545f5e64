//! RPC client: connection ownership and call multiplexing.
//!
//! After a successful handshake the client owns the connection. A background
//! listener task routes every inbound response to the call that issued it
//! via the pending-call table; callers only insert a completion handle and
//! await it, so the listener is the sole remover on the response path.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::{Map, Value};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{CodecError, ConnectionError, Error, Result};
use crate::protocol::codec;
use crate::protocol::framing::FrameCodec;
use crate::protocol::handshake::{Authenticator, Role, TrustToken};
use crate::protocol::message::{RpcRequest, RpcResponse};

/// Completion handle for one in-flight call.
type ResponseSender = oneshot::Sender<Result<Value>>;

/// Pending-call table shared between callers and the listener task.
type PendingCalls = Arc<DashMap<Uuid, ResponseSender>>;

/// Write half of the framed connection.
type FrameSink = SplitSink<Framed<TcpStream, FrameCodec>, Bytes>;

/// Live connection state; present only between `connect` and `close`.
struct Connection {
    sink: Arc<Mutex<FrameSink>>,
    pending: PendingCalls,
    listener: JoinHandle<()>,
}

/// Client-side RPC multiplexer over a single trusted connection.
///
/// Many calls may be in flight at once; responses are matched purely by
/// correlation ID, never by arrival order.
pub struct RpcClient {
    addr: SocketAddr,
    authenticator: Authenticator,
    connection: Mutex<Option<Connection>>,
}

impl RpcClient {
    /// Create a client for `addr` with an optional configured trust token.
    #[must_use]
    pub fn new(addr: SocketAddr, token: Option<TrustToken>) -> Self {
        Self {
            addr,
            authenticator: Authenticator::new(token),
            connection: Mutex::new(None),
        }
    }

    /// A disconnected twin of this client for the sync escape hatch.
    ///
    /// Shares the address and token but none of the connection state.
    fn isolated(&self) -> Self {
        Self {
            addr: self.addr,
            authenticator: self.authenticator.clone(),
            connection: Mutex::new(None),
        }
    }

    /// Open the transport, run the trust handshake, start the listener.
    ///
    /// Idempotent: returns immediately if already connected. On any failure
    /// the client remains disconnected.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault if no token is configured (before any
    /// connection attempt), a connection fault if the dial fails, and a
    /// handshake fault if the server rejects us.
    pub async fn connect(&self) -> Result<()> {
        let mut connection = self.connection.lock().await;
        if connection.is_some() {
            return Ok(());
        }

        // Configuration faults are local; never touch the network for them.
        self.authenticator.require_token(Role::Client)?;

        let stream = TcpStream::connect(self.addr)
            .await
            .map_err(|e| ConnectionError::ConnectFailed {
                addr: self.addr,
                source: e,
            })?;

        let mut framed = Framed::new(stream, FrameCodec::new());
        self.authenticator.handshake_client(&mut framed).await?;

        let (sink, stream) = framed.split();
        let pending: PendingCalls = Arc::new(DashMap::new());
        let listener = tokio::spawn(listen_for_responses(stream, Arc::clone(&pending)));

        *connection = Some(Connection {
            sink: Arc::new(Mutex::new(sink)),
            pending,
            listener,
        });
        debug!(addr = %self.addr, "connected, connection trusted");
        Ok(())
    }

    /// Issue a call and await its response.
    ///
    /// Connects first if not already connected. Concurrent callers are
    /// serialized only while their frame hits the wire; waiting for
    /// responses is independent per call.
    ///
    /// # Errors
    ///
    /// Propagates connect/handshake faults, I/O faults while sending, a
    /// [`crate::error::RemoteError`] when the server reports a per-call
    /// fault, and a connection fault when the connection closes while the
    /// call is outstanding.
    pub async fn call_async(
        &self,
        method: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value> {
        self.connect().await?;

        let request = RpcRequest::new(method, args, kwargs);
        let payload = codec::encode(&request)?;

        let (sink, pending) = {
            let connection = self.connection.lock().await;
            let connection = connection
                .as_ref()
                .ok_or(Error::Connection(ConnectionError::Closed))?;
            (
                Arc::clone(&connection.sink),
                Arc::clone(&connection.pending),
            )
        };

        let (response_tx, response_rx) = oneshot::channel();
        pending.insert(request.id, response_tx);
        debug!(method, id = %request.id, in_flight = pending.len(), "issuing call");

        // One writer at a time; a frame is never interleaved with another.
        {
            let mut sink = sink.lock().await;
            if let Err(e) = sink.send(payload).await {
                pending.remove(&request.id);
                return Err(e.into());
            }
        }

        // A dropped sender means the connection was closed underneath us.
        response_rx
            .await
            .map_err(|_| Error::Connection(ConnectionError::Closed))?
    }

    /// Blocking adapter for callers outside the async domain.
    ///
    /// Outside any tokio runtime this drives connect → call → close on a
    /// private scheduler and returns the result directly. From inside a
    /// running runtime it instead runs an isolated client on its own OS
    /// thread and scheduler (sharing no connection state with the caller's
    /// runtime) and blocks until that thread finishes.
    ///
    /// # Errors
    ///
    /// Propagates whatever fault the underlying async call produced.
    pub fn call_sync(
        &self,
        method: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value> {
        if tokio::runtime::Handle::try_current().is_ok() {
            let client = self.isolated();
            let method = method.to_owned();
            let worker = std::thread::spawn(move || -> Result<Value> {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()?;
                runtime.block_on(client.drive_sync(&method, args, kwargs))
            });
            match worker.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            }
        } else {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(self.drive_sync(method, args, kwargs))
        }
    }

    /// Connect, call, then close, keeping the close on the error path too.
    async fn drive_sync(
        &self,
        method: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value> {
        self.connect().await?;
        let result = self.call_async(method, args, kwargs).await;
        self.close().await;
        result
    }

    /// Close the transport and fail every still-pending call.
    ///
    /// Idempotent. Cancelling the listener task is cooperative and treated
    /// as non-fatal.
    pub async fn close(&self) {
        let mut connection = self.connection.lock().await;
        if let Some(connection) = connection.take() {
            connection.listener.abort();
            {
                let mut sink = connection.sink.lock().await;
                let _ = sink.close().await;
            }
            // Dropping the senders resolves every awaiting caller with a
            // closed-connection fault.
            connection.pending.clear();
            debug!("client connection closed");
        }
    }

    /// Number of calls currently awaiting a response.
    pub async fn pending_calls(&self) -> usize {
        self.connection
            .lock()
            .await
            .as_ref()
            .map_or(0, |connection| connection.pending.len())
    }
}

/// Background listener: routes responses to pending calls until the
/// connection dies.
async fn listen_for_responses(
    mut stream: SplitStream<Framed<TcpStream, FrameCodec>>,
    pending: PendingCalls,
) {
    loop {
        match stream.next().await {
            Some(Ok(payload)) => {
                let response: RpcResponse = match codec::decode(&payload) {
                    Ok(response) => response,
                    Err(e) => {
                        // Request/response alignment can no longer be
                        // trusted; the whole connection is poisoned.
                        warn!(error = %e, "unparseable response, failing all pending calls");
                        let fault = match &e {
                            Error::Codec(codec_error) => codec_error.clone(),
                            other => CodecError::DeserializationFailed(other.to_string()),
                        };
                        fail_all_pending(&pending, || Error::Codec(fault.clone()));
                        break;
                    }
                };
                resolve(&pending, response);
            }
            Some(Err(e)) => {
                warn!(error = %e, "connection lost mid-frame");
                fail_all_pending(&pending, || Error::Connection(ConnectionError::Closed));
                break;
            }
            None => {
                debug!("server closed the connection");
                fail_all_pending(&pending, || Error::Connection(ConnectionError::Closed));
                break;
            }
        }
    }
}

/// Complete the pending call matching `response`, if any.
fn resolve(pending: &DashMap<Uuid, ResponseSender>, response: RpcResponse) {
    let Some(id) = response.id else {
        warn!("discarding response with null id");
        return;
    };
    let Some((_, response_tx)) = pending.remove(&id) else {
        // Late or unmatched response; nothing is waiting for it.
        warn!(%id, "discarding response for unknown call");
        return;
    };

    let outcome = match response.error {
        Some(rendered) => Err(Error::Remote(crate::error::RemoteError::from_wire(
            &rendered,
        ))),
        None => Ok(response.result.unwrap_or(Value::Null)),
    };
    let _ = response_tx.send(outcome);
}

/// Resolve every pending call with a fault and empty the table.
fn fail_all_pending<F>(pending: &DashMap<Uuid, ResponseSender>, fault: F)
where
    F: Fn() -> Error,
{
    let ids: Vec<Uuid> = pending.iter().map(|entry| *entry.key()).collect();
    for id in ids {
        if let Some((_, response_tx)) = pending.remove(&id) {
            let _ = response_tx.send(Err(fault()));
        }
    }
}
