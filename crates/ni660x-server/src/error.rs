//! Transport-level errors of the server and client.

use thiserror::Error;

use crate::protocol::RpcError;

/// Errors raised while serving or calling over TCP.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Socket failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Message could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The remote call returned an error object.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// Peer closed the connection before replying.
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// Reply did not match the pending request.
    #[error("Response id {got} does not match request id {expected}")]
    IdMismatch {
        /// Id sent.
        expected: u64,
        /// Id received.
        got: serde_json::Value,
    },
}
