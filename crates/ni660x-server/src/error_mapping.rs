//! Mapping from [`CountingError`] to JSON-RPC error objects.
//!
//! | error | code |
//! |-------|------|
//! | `NotFound` | 1 |
//! | `Resource`, `ChannelStart`, `Closed` | 2 |
//! | `Configuration` | 3 |
//!
//! `data` carries the fields a client needs to react without parsing the
//! message: the channel name, the failing resource and its kind, and for a
//! partial start the channels left armed.

use ni660x_core::{CountingError, ResourceError};
use serde_json::json;

use crate::protocol::{codes, RpcError};

fn resource_data(err: &ResourceError) -> serde_json::Value {
    json!({
        "resource": err.resource,
        "kind": err.kind.to_string(),
    })
}

/// Map a coordinator error to an RPC error.
pub fn map_counting_error(err: CountingError) -> RpcError {
    let message = err.to_string();
    match err {
        CountingError::NotFound(name) => {
            RpcError::new(codes::NOT_FOUND, message).with_data(json!({ "name": name }))
        }
        CountingError::Resource(source) => {
            RpcError::new(codes::RESOURCE, message).with_data(resource_data(&source))
        }
        CountingError::ChannelStart {
            channel,
            started,
            source,
        } => {
            let mut data = resource_data(&source);
            data["channel"] = json!(channel);
            data["started"] = json!(started);
            RpcError::new(codes::RESOURCE, message).with_data(data)
        }
        CountingError::Closed => RpcError::new(codes::RESOURCE, message),
        CountingError::Configuration(_) => RpcError::new(codes::CONFIGURATION, message),
    }
}

/// Convert `Result<T, CountingError>` into `Result<T, RpcError>`.
pub trait CountingResultExt<T> {
    /// Map the error with [`map_counting_error`].
    fn map_rpc_err(self) -> Result<T, RpcError>;
}

impl<T> CountingResultExt<T> for Result<T, CountingError> {
    fn map_rpc_err(self) -> Result<T, RpcError> {
        self.map_err(map_counting_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ni660x_core::ResourceErrorKind;

    #[test]
    fn test_not_found_maps_to_code_1() {
        let err = map_counting_error(CountingError::NotFound("ct9".to_string()));
        assert_eq!(err.code, 1);
        assert_eq!(err.data.unwrap()["name"], "ct9");
    }

    #[test]
    fn test_resource_maps_to_code_2() {
        let err = map_counting_error(CountingError::Resource(ResourceError::busy(
            "Dev1/ctr0",
            "reserved",
        )));
        assert_eq!(err.code, 2);
        let data = err.data.unwrap();
        assert_eq!(data["resource"], "Dev1/ctr0");
        assert_eq!(data["kind"], "busy");
    }

    #[test]
    fn test_channel_start_reports_started() {
        let err = map_counting_error(CountingError::ChannelStart {
            channel: "b".to_string(),
            started: vec!["a".to_string()],
            source: ResourceError::new("Dev1/ctr1", ResourceErrorKind::Hardware, "boom"),
        });
        assert_eq!(err.code, 2);
        let data = err.data.unwrap();
        assert_eq!(data["channel"], "b");
        assert_eq!(data["started"], json!(["a"]));
        assert_eq!(data["kind"], "hardware");
    }

    #[test]
    fn test_closed_maps_to_code_2() {
        let err = map_counting_error(CountingError::Closed);
        assert_eq!(err.code, 2);
        assert!(err.message.contains("closed"));
    }

    #[test]
    fn test_configuration_maps_to_code_3() {
        let result: Result<(), CountingError> =
            Err(CountingError::Configuration("no counters".to_string()));
        let err = result.map_rpc_err().unwrap_err();
        assert_eq!(err.code, 3);
        assert!(err.message.contains("no counters"));
    }
}
