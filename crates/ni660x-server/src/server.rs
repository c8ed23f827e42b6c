//! TCP server.
//!
//! Accepts connections and serves each one on its own task. Requests on a
//! connection are handled in order; the coordinator call itself runs on the
//! blocking pool because stopping a generator joins its thread.

use std::future::Future;
use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::ServerError;
use crate::protocol::{codes, Response, RpcError};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 9000;

/// JSON-RPC server bound to a TCP socket.
pub struct RpcServer {
    listener: TcpListener,
    dispatcher: Dispatcher,
}

impl RpcServer {
    /// Bind to `addr`.
    pub async fn bind(addr: impl ToSocketAddrs, dispatcher: Dispatcher) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await?;
        info!("RPC server listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            dispatcher,
        })
    }

    /// Bound address. Useful after binding port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the process exits.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` completes. Open connections are left to finish
    /// their current request.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((socket, addr)) => {
                            let dispatcher = self.dispatcher.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_client(socket, addr, dispatcher).await {
                                    warn!("Client {} error: {}", addr, e);
                                }
                            });
                        }
                        Err(e) => error!("Accept error: {}", e),
                    }
                }
                _ = &mut shutdown => {
                    info!("RPC server shutting down");
                    return Ok(());
                }
            }
        }
    }
}

impl std::fmt::Debug for RpcServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcServer")
            .field("addr", &self.listener.local_addr().ok())
            .finish()
    }
}

async fn handle_client(
    socket: TcpStream,
    addr: SocketAddr,
    dispatcher: Dispatcher,
) -> Result<(), ServerError> {
    info!("Client connected: {}", addr);
    let (reader, mut writer) = socket.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        debug!(client = %addr, bytes = line.len(), "Request received");

        let handler = dispatcher.clone();
        let response = match tokio::task::spawn_blocking(move || handler.handle_line(&line)).await {
            Ok(response) => response,
            Err(e) => {
                error!("Request handler failed: {}", e);
                Response::failure(
                    serde_json::Value::Null,
                    RpcError::new(codes::INTERNAL_ERROR, "Request handler failed"),
                )
            }
        };

        let mut encoded = serde_json::to_vec(&response)?;
        encoded.push(b'\n');
        writer.write_all(&encoded).await?;
    }

    info!("Client {} disconnected", addr);
    Ok(())
}
