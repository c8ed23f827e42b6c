//! JSON-RPC 2.0 wire types.
//!
//! One request per line, one response per line, UTF-8 JSON. Only single
//! requests are supported (no batches). Every request receives a response;
//! a missing `id` is echoed back as `null`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Protocol version carried in every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Error codes.
///
/// Negative codes are the JSON-RPC transport errors. Positive codes are
/// application errors raised by the coordinator.
pub mod codes {
    /// Invalid JSON.
    pub const PARSE_ERROR: i64 = -32700;
    /// JSON is not a valid request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// Unknown method.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Missing, extra or mistyped parameters.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Server-side failure unrelated to the request.
    pub const INTERNAL_ERROR: i64 = -32603;

    /// Unconfigured channel name.
    pub const NOT_FOUND: i64 = 1;
    /// Hardware resource failure.
    pub const RESOURCE: i64 = 2;
    /// Invalid configuration.
    pub const CONFIGURATION: i64 = 3;
}

/// A method call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Must be `"2.0"`.
    pub jsonrpc: String,
    /// Method name.
    pub method: String,
    /// Positional array or named object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Correlation id echoed in the response.
    #[serde(default)]
    pub id: Value,
}

impl Request {
    /// Build a request.
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params: Some(params),
            id: Value::from(id),
        }
    }
}

/// Error object of a failed call.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("RPC error {code}: {message}")]
pub struct RpcError {
    /// See [`codes`].
    pub code: i64,
    /// Human readable description.
    pub message: String,
    /// Structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Error without details.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured details.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Invalid JSON.
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(codes::PARSE_ERROR, message)
    }

    /// Not a request object.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_REQUEST, message)
    }

    /// Unknown method.
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            codes::METHOD_NOT_FOUND,
            format!("Method '{}' not found", method),
        )
    }

    /// Bad parameters.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, message)
    }
}

/// Reply to a [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Result on success. Operations without a value return `null`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    /// Id of the request.
    #[serde(default)]
    pub id: Value,
}

impl Response {
    /// Successful reply.
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Failed reply.
    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }

    /// Result value or error. A missing result means `null`.
    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}
