//! RPC server: accept loop and per-connection orchestration.
//!
//! Each accepted connection runs the server side of the trust handshake,
//! then loops reading request frames until the peer closes or framing
//! breaks. Requests are dispatched on their own tasks so one slow method
//! never holds up later requests on the same connection; response frames
//! funnel through a single writer task so they cannot interleave.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::protocol::framing::{FrameCodec, MAX_FRAME_SIZE};
use crate::protocol::handshake::Authenticator;

/// Configuration for the RPC server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Maximum accepted frame size.
    pub max_frame_size: usize,
    /// Depth of the per-connection response queue.
    pub response_queue_depth: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            max_frame_size: MAX_FRAME_SIZE,
            response_queue_depth: 64,
        }
    }
}

/// Trigger for stopping a running server's accept loop.
pub struct ShutdownHandle(oneshot::Sender<()>);

impl ShutdownHandle {
    /// Stop accepting connections; in-flight connections finish on their own.
    pub fn shutdown(self) {
        let _ = self.0.send(());
    }
}

/// RPC server that listens for incoming trusted connections.
pub struct RpcServer {
    listener: TcpListener,
    authenticator: Arc<Authenticator>,
    dispatcher: Arc<Dispatcher>,
    config: ServerConfig,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_rx: oneshot::Receiver<()>,
}

impl RpcServer {
    /// Bind the listening socket.
    ///
    /// Binding port 0 asks the OS for a free port; use [`Self::local_addr`]
    /// to discover it.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(
        addr: SocketAddr,
        authenticator: Authenticator,
        dispatcher: Dispatcher,
        config: ServerConfig,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        Ok(Self {
            listener,
            authenticator: Arc::new(authenticator),
            dispatcher: Arc::new(dispatcher),
            config,
            shutdown_tx: Some(shutdown_tx),
            shutdown_rx,
        })
    }

    /// The address this server is bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be queried.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Take the shutdown trigger for this server.
    ///
    /// Returns `None` if it was already taken.
    pub fn shutdown_handle(&mut self) -> Option<ShutdownHandle> {
        self.shutdown_tx.take().map(ShutdownHandle)
    }

    /// Accept and serve connections until shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the bound address cannot be queried; accept
    /// failures are logged and the loop continues.
    pub async fn serve(self) -> Result<()> {
        let addr = self.listener.local_addr()?;
        info!(%addr, "RPC server listening");

        let listener = self.listener;
        let mut shutdown_rx = self.shutdown_rx;
        let semaphore = Arc::new(Semaphore::new(self.config.max_connections));

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            match Arc::clone(&semaphore).try_acquire_owned() {
                                Ok(permit) => {
                                    let authenticator = Arc::clone(&self.authenticator);
                                    let dispatcher = Arc::clone(&self.dispatcher);
                                    let config = self.config.clone();
                                    tokio::spawn(async move {
                                        if let Err(e) =
                                            handle_connection(stream, peer, authenticator, dispatcher, config).await
                                        {
                                            warn!(%peer, error = %e, "connection ended with error");
                                        }
                                        drop(permit);
                                    });
                                }
                                Err(_) => {
                                    warn!(%peer, "connection limit reached, dropping connection");
                                }
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }
                _ = &mut shutdown_rx => {
                    info!("server shutdown requested");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Serve one accepted connection: handshake, then the request loop.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    authenticator: Arc<Authenticator>,
    dispatcher: Arc<Dispatcher>,
    config: ServerConfig,
) -> Result<()> {
    debug!(%peer, "accepted connection");

    let mut framed = Framed::new(
        stream,
        FrameCodec::new().with_max_frame_size(config.max_frame_size),
    );

    // An untrusted peer never reaches the RPC phase.
    authenticator.handshake_server(&mut framed).await?;
    debug!(%peer, "connection trusted, entering RPC phase");

    let (mut sink, mut stream) = framed.split();
    let (reply_tx, mut reply_rx) = mpsc::channel::<Bytes>(config.response_queue_depth);

    // Single writer: response frames never interleave.
    let writer = tokio::spawn(async move {
        while let Some(payload) = reply_rx.recv().await {
            if let Err(e) = sink.send(payload).await {
                warn!(error = %e, "failed to write response");
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(request) => {
                // Each request runs on its own task; responses go out in
                // completion order, matched client-side by correlation ID.
                let dispatcher = Arc::clone(&dispatcher);
                let reply_tx = reply_tx.clone();
                tokio::spawn(async move {
                    let response = dispatcher.dispatch(&request).await;
                    let _ = reply_tx.send(response).await;
                });
            }
            Err(e) => {
                warn!(%peer, error = %e, "frame error, closing connection");
                break;
            }
        }
    }

    // Let in-flight dispatches drain before the writer closes the sink.
    drop(reply_tx);
    let _ = writer.await;

    debug!(%peer, "connection closed");
    Ok(())
}
