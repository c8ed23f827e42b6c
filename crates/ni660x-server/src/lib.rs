//! Remote control of a [`CountingApp`](ni660x_core::CountingApp).
//!
//! Every coordinator operation is callable by name over newline-delimited
//! JSON-RPC 2.0 on TCP. Arguments and results are plain JSON: numbers,
//! strings, booleans, arrays and objects.
//!
//! ```text
//! -> {"jsonrpc":"2.0","method":"start_all","params":[100,0.01,0.01],"id":1}
//! <- {"jsonrpc":"2.0","result":null,"id":1}
//! -> {"jsonrpc":"2.0","method":"get_channel_data","params":{"name":"ct1","start":-10},"id":2}
//! <- {"jsonrpc":"2.0","result":[812.0,809.0,...],"id":2}
//! ```
//!
//! Introspection follows the XML-RPC convention: `system.listMethods`,
//! `system.methodHelp` and `system.methodSignature`.

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod error_mapping;
pub mod methods;
pub mod protocol;
pub mod server;

pub use client::RpcClient;
pub use dispatcher::Dispatcher;
pub use error::ServerError;
pub use error_mapping::{map_counting_error, CountingResultExt};
pub use protocol::{codes, Request, Response, RpcError};
pub use server::{RpcServer, DEFAULT_PORT};
