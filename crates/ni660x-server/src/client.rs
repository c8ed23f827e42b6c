//! Async client for the control server.

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::error::ServerError;
use crate::protocol::{Request, Response};

/// One connection to an [`RpcServer`](crate::RpcServer).
///
/// Calls are sequential: each waits for its reply before returning.
pub struct RpcClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    next_id: u64,
}

impl RpcClient {
    /// Connect to `addr`.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ServerError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            lines: BufReader::new(reader).lines(),
            writer,
            next_id: 1,
        })
    }

    /// Call `method`. `params` is an array (positional) or an object (named).
    pub async fn call(&mut self, method: &str, params: Value) -> Result<Value, ServerError> {
        let id = self.next_id;
        self.next_id += 1;

        let request = Request::new(id, method, params);
        let mut encoded = serde_json::to_vec(&request)?;
        encoded.push(b'\n');
        self.writer.write_all(&encoded).await?;
        debug!(id, method, "Request sent");

        let line = self
            .lines
            .next_line()
            .await?
            .ok_or(ServerError::ConnectionClosed)?;
        let response: Response = serde_json::from_str(&line)?;
        if response.id != Value::from(id) {
            return Err(ServerError::IdMismatch {
                expected: id,
                got: response.id,
            });
        }
        Ok(response.into_result()?)
    }

    /// Send a raw line and return the raw reply. For testing malformed input.
    pub async fn call_raw(&mut self, line: &str) -> Result<Response, ServerError> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        let reply = self
            .lines
            .next_line()
            .await?
            .ok_or(ServerError::ConnectionClosed)?;
        Ok(serde_json::from_str(&reply)?)
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("peer", &self.writer.peer_addr().ok())
            .field("next_id", &self.next_id)
            .finish()
    }
}
