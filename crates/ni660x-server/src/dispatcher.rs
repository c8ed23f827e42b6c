//! Request dispatch onto the shared [`CountingApp`].

use std::sync::Arc;

use ni660x_core::CountingApp;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info_span, warn};

use crate::error_mapping::CountingResultExt;
use crate::methods::{self, Params, METHODS};
use crate::protocol::{codes, Request, Response, RpcError, JSONRPC_VERSION};

/// Routes JSON-RPC calls to the coordinator.
///
/// Cheap to clone; clones share the application. Read-only methods take the
/// read lock, control methods the write lock, so each call is atomic with
/// respect to the others.
#[derive(Clone)]
pub struct Dispatcher {
    app: Arc<RwLock<CountingApp>>,
}

impl Dispatcher {
    /// Serve `app`.
    pub fn new(app: Arc<RwLock<CountingApp>>) -> Self {
        Self { app }
    }

    /// Shared application handle.
    pub fn app(&self) -> &Arc<RwLock<CountingApp>> {
        &self.app
    }

    /// Parse and handle one line of input.
    pub fn handle_line(&self, line: &str) -> Response {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                return Response::failure(
                    Value::Null,
                    RpcError::parse_error(format!("Parse error: {}", e)),
                )
            }
        };
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        match serde_json::from_value::<Request>(value) {
            Ok(request) => self.handle(request),
            Err(e) => Response::failure(
                id,
                RpcError::invalid_request(format!("Invalid request: {}", e)),
            ),
        }
    }

    /// Handle a decoded request.
    pub fn handle(&self, request: Request) -> Response {
        let Request {
            jsonrpc,
            method,
            params,
            id,
        } = request;

        if jsonrpc != JSONRPC_VERSION {
            return Response::failure(
                id,
                RpcError::invalid_request(format!("Unsupported jsonrpc version '{}'", jsonrpc)),
            );
        }

        let span = info_span!("rpc", method = %method);
        let _enter = span.enter();

        match self.call(&method, params) {
            Ok(result) => {
                debug!("Call succeeded");
                Response::success(id, result)
            }
            Err(error) => {
                warn!(code = error.code, error = %error.message, "Call failed");
                Response::failure(id, error)
            }
        }
    }

    /// Invoke `method` with raw params.
    pub fn call(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
        let spec = methods::find(method).ok_or_else(|| RpcError::method_not_found(method))?;
        let params = Params::bind(spec, params)?;

        match spec.name {
            "start_channels" => {
                let samples: usize = params.get(0)?;
                let started = self.app.write().start_channels(samples).map_rpc_err()?;
                to_value(started)
            }
            "start_timer" => {
                let (samples, high, low, delay) = timing(&params)?;
                self.app
                    .write()
                    .start_timer(samples, high, low, delay)
                    .map_rpc_err()?;
                Ok(Value::Null)
            }
            "start_all" => {
                let (samples, high, low, delay) = timing(&params)?;
                self.app
                    .write()
                    .start_all(samples, high, low, delay)
                    .map_rpc_err()?;
                Ok(Value::Null)
            }
            "stop" => {
                self.app.write().stop().map_rpc_err()?;
                Ok(Value::Null)
            }
            "get_all_data" => keyed(self.app.read().get_all_data()),
            "get_names" => to_value(self.app.read().get_names()),
            "get_channel_data" => {
                let name: String = params.get(0)?;
                let start: i64 = params.get(1)?;
                let end: i64 = params.get(2)?;
                let data = self
                    .app
                    .read()
                    .get_channel_data(&name, start, end)
                    .map_rpc_err()?;
                to_value(data)
            }
            "set_channels_enabled" => {
                let names: Vec<String> = params.get(0)?;
                let enabled: bool = params.get(1)?;
                self.app
                    .write()
                    .set_channels_enabled(&names, enabled)
                    .map_rpc_err()?;
                Ok(Value::Null)
            }
            "get_channels_enabled" => keyed(self.app.read().get_channels_enabled()),
            "get_samples_readies" => to_value(self.app.read().get_samples_readies()),
            "is_done" => to_value(self.app.read().is_done()),
            "get_state" => to_value(self.app.read().state().to_string()),
            "system.listMethods" => {
                let mut names: Vec<&str> = METHODS.iter().map(|m| m.name).collect();
                names.sort_unstable();
                to_value(names)
            }
            "system.methodHelp" => {
                let target: String = params.get(0)?;
                let spec =
                    methods::find(&target).ok_or_else(|| RpcError::method_not_found(&target))?;
                to_value(spec.help_text())
            }
            "system.methodSignature" => {
                let target: String = params.get(0)?;
                let spec =
                    methods::find(&target).ok_or_else(|| RpcError::method_not_found(&target))?;
                Ok(spec.signature())
            }
            other => Err(RpcError::method_not_found(other)),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

fn timing(params: &Params) -> Result<(usize, f64, f64, f64), RpcError> {
    Ok((params.get(0)?, params.get(1)?, params.get(2)?, params.get(3)?))
}

fn to_value<T: Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value)
        .map_err(|e| RpcError::new(codes::INTERNAL_ERROR, format!("Failed to encode result: {}", e)))
}

/// JSON object keeping the order of `entries`.
fn keyed<T: Serialize>(entries: Vec<(String, T)>) -> Result<Value, RpcError> {
    let mut map = Map::with_capacity(entries.len());
    for (name, value) in entries {
        map.insert(name, to_value(value)?);
    }
    Ok(Value::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ni660x_core::{AppConfig, ConnectionsConfig, CounterConfig, TimerConfig};
    use ni660x_driver_mock::MockBoard;
    use serde_json::json;

    fn dispatcher() -> (Dispatcher, MockBoard) {
        dispatcher_with(&["ct1", "ct2"])
    }

    fn dispatcher_with(names: &[&str]) -> (Dispatcher, MockBoard) {
        let config = AppConfig {
            connections: ConnectionsConfig {
                from: "/Dev1/Ctr7InternalOutput".to_string(),
                to: vec!["/Dev1/PFI38".to_string()],
            },
            timer: TimerConfig {
                channel: "Dev1/ctr7".to_string(),
            },
            counters: names
                .iter()
                .enumerate()
                .map(|(i, name)| CounterConfig {
                    name: name.to_string(),
                    channel: format!("Dev1/ctr{}", i),
                    gate: "/Dev1/PFI38".to_string(),
                    source: "/Dev1/PFI39".to_string(),
                })
                .collect(),
        };
        let board = MockBoard::new();
        let app = CountingApp::open(config, &board).unwrap();
        (Dispatcher::new(Arc::new(RwLock::new(app))), board)
    }

    #[test]
    fn test_get_names() {
        let (dispatcher, _board) = dispatcher();
        assert_eq!(dispatcher.call("get_names", None).unwrap(), json!(["ct1", "ct2"]));
    }

    #[test]
    fn test_enable_flags_round_trip() {
        let (dispatcher, _board) = dispatcher();
        dispatcher
            .call("set_channels_enabled", Some(json!([["ct2"], false])))
            .unwrap();
        assert_eq!(
            dispatcher.call("get_channels_enabled", None).unwrap(),
            json!({"ct1": true, "ct2": false})
        );

        dispatcher
            .call("set_channels_enabled", Some(json!({})))
            .unwrap();
        assert_eq!(
            dispatcher.call("get_channels_enabled", None).unwrap(),
            json!({"ct1": true, "ct2": true})
        );
    }

    #[test]
    fn test_unknown_channel_is_not_found() {
        let (dispatcher, _board) = dispatcher();
        let err = dispatcher
            .call("get_channel_data", Some(json!(["nope"])))
            .unwrap_err();
        assert_eq!(err.code, codes::NOT_FOUND);

        let err = dispatcher
            .call("set_channels_enabled", Some(json!([["ct1", "nope"], false])))
            .unwrap_err();
        assert_eq!(err.code, codes::NOT_FOUND);
        assert_eq!(
            dispatcher.call("get_channels_enabled", None).unwrap(),
            json!({"ct1": true, "ct2": true})
        );
    }

    #[test]
    fn test_start_channels_and_readies() {
        let (dispatcher, _board) = dispatcher();
        let started = dispatcher
            .call("start_channels", Some(json!([5])))
            .unwrap();
        assert_eq!(started, json!(["ct1", "ct2"]));
        assert_eq!(dispatcher.call("get_samples_readies", None).unwrap(), json!(0));
        assert_eq!(dispatcher.call("get_state", None).unwrap(), json!("armed"));
        assert_eq!(dispatcher.call("stop", None).unwrap(), Value::Null);
        assert_eq!(dispatcher.call("stop", None).unwrap(), Value::Null);
    }

    #[test]
    fn test_invalid_timing_is_resource_error() {
        let (dispatcher, _board) = dispatcher();
        let err = dispatcher
            .call("start_timer", Some(json!([10, -0.01, 0.01])))
            .unwrap_err();
        assert_eq!(err.code, codes::RESOURCE);
        assert_eq!(err.data.unwrap()["kind"], "invalid_parameter");
    }

    #[test]
    fn test_handle_line_errors() {
        let (dispatcher, _board) = dispatcher();

        let response = dispatcher.handle_line("{not json");
        assert_eq!(response.error.unwrap().code, codes::PARSE_ERROR);

        let response = dispatcher.handle_line(r#"{"jsonrpc":"2.0","id":3}"#);
        let error = response.error.unwrap();
        assert_eq!(error.code, codes::INVALID_REQUEST);
        assert_eq!(response.id, json!(3));

        let response = dispatcher.handle_line(r#"{"jsonrpc":"1.0","method":"stop","id":4}"#);
        assert_eq!(response.error.unwrap().code, codes::INVALID_REQUEST);

        let response = dispatcher.handle_line(r#"{"jsonrpc":"2.0","method":"launch","id":5}"#);
        assert_eq!(response.error.unwrap().code, codes::METHOD_NOT_FOUND);
    }

    #[test]
    fn test_introspection() {
        let (dispatcher, _board) = dispatcher();
        let names = dispatcher.call("system.listMethods", None).unwrap();
        let names: Vec<String> = serde_json::from_value(names).unwrap();
        assert!(names.contains(&"start_all".to_string()));
        assert!(names.contains(&"system.methodHelp".to_string()));

        let help = dispatcher
            .call("system.methodHelp", Some(json!(["start_all"])))
            .unwrap();
        assert!(help.as_str().unwrap().contains("initial_delay=0"));

        let signature = dispatcher
            .call("system.methodSignature", Some(json!({"method": "is_done"})))
            .unwrap();
        assert_eq!(signature, json!([["boolean"]]));
    }

    fn keys(value: &Value) -> Vec<String> {
        value
            .as_object()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_result_maps_follow_configuration_order() {
        let (dispatcher, _board) = dispatcher_with(&["zeta", "alpha", "mid"]);
        let enabled = dispatcher.call("get_channels_enabled", None).unwrap();
        assert_eq!(keys(&enabled), vec!["zeta", "alpha", "mid"]);

        dispatcher.call("start_channels", Some(json!([2]))).unwrap();
        let data = dispatcher.call("get_all_data", None).unwrap();
        assert_eq!(keys(&data), vec!["zeta", "alpha", "mid"]);
        assert_eq!(data["alpha"], json!([]));
    }

    #[test]
    fn test_huge_sample_count_arms_channels() {
        let (dispatcher, board) = dispatcher();
        let started = dispatcher
            .call("start_channels", Some(json!([u64::MAX])))
            .unwrap();
        assert_eq!(started, json!(["ct1", "ct2"]));
        assert_eq!(board.armed_counters(), 2);

        dispatcher
            .call("start_channels", Some(json!([1u64 << 50])))
            .unwrap();
        dispatcher.call("stop", None).unwrap();
        assert_eq!(board.armed_counters(), 0);
    }
}
