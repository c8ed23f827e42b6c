//! Method table and parameter binding.
//!
//! Every remote method is described once in [`METHODS`]: its parameters (in
//! positional order, with defaults) and a help line. The dispatcher binds
//! request parameters against this table and the introspection methods
//! render it.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::protocol::RpcError;

/// One parameter of a remote method.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    /// Name accepted in named-parameter form.
    pub name: &'static str,
    /// Type label used by `system.methodSignature`.
    pub ty: &'static str,
    /// Default applied when the parameter is omitted, as JSON text.
    /// `None` marks the parameter as required.
    pub default: Option<&'static str>,
}

const fn required(name: &'static str, ty: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        ty,
        default: None,
    }
}

const fn optional(name: &'static str, ty: &'static str, default: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        ty,
        default: Some(default),
    }
}

/// A remote method.
#[derive(Debug, Clone, Copy)]
pub struct MethodSpec {
    /// Method name.
    pub name: &'static str,
    /// Parameters in positional order.
    pub params: &'static [ParamSpec],
    /// Type label of the result.
    pub returns: &'static str,
    /// One-line description.
    pub help: &'static str,
}

impl MethodSpec {
    /// XML-RPC style signature: `[[returns, param types...]]`.
    pub fn signature(&self) -> Value {
        let mut signature = vec![Value::from(self.returns)];
        signature.extend(self.params.iter().map(|p| Value::from(p.ty)));
        Value::Array(vec![Value::Array(signature)])
    }

    /// Help text with the call form and defaults.
    pub fn help_text(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| match p.default {
                Some(default) => format!("{}={}", p.name, default),
                None => p.name.to_string(),
            })
            .collect();
        format!("{}({}) -> {}\n\n{}", self.name, params.join(", "), self.returns, self.help)
    }
}

const TIMING: &[ParamSpec] = &[
    required("samples", "int"),
    required("high_time", "double"),
    required("low_time", "double"),
    optional("initial_delay", "double", "0"),
];

/// Every method served, including introspection.
pub const METHODS: &[MethodSpec] = &[
    MethodSpec {
        name: "start_channels",
        params: &[required("samples", "int")],
        returns: "array",
        help: "Arm every enabled channel for `samples` samples. Returns the started names.",
    },
    MethodSpec {
        name: "start_timer",
        params: TIMING,
        returns: "nil",
        help: "Start only the gate generator.",
    },
    MethodSpec {
        name: "start_all",
        params: TIMING,
        returns: "nil",
        help: "Arm the enabled channels, then start the gate generator.",
    },
    MethodSpec {
        name: "stop",
        params: &[],
        returns: "nil",
        help: "Stop the gate generator, then every channel.",
    },
    MethodSpec {
        name: "get_all_data",
        params: &[],
        returns: "struct",
        help: "Data of every channel started in the current run, keyed by name.",
    },
    MethodSpec {
        name: "get_names",
        params: &[],
        returns: "array",
        help: "Names of every configured channel, in configuration order.",
    },
    MethodSpec {
        name: "get_channel_data",
        params: &[
            required("name", "string"),
            optional("start", "int", "0"),
            optional("end", "int", "-1"),
        ],
        returns: "array",
        help: "Slice of one channel's data. Negative indices count from the end.",
    },
    MethodSpec {
        name: "set_channels_enabled",
        params: &[
            optional("names", "array", "[]"),
            optional("enabled", "boolean", "true"),
        ],
        returns: "nil",
        help: "Set the enabled flag of the named channels, or of all channels when `names` is empty.",
    },
    MethodSpec {
        name: "get_channels_enabled",
        params: &[],
        returns: "struct",
        help: "Enabled flag of every configured channel.",
    },
    MethodSpec {
        name: "get_samples_readies",
        params: &[],
        returns: "int",
        help: "Samples readable on every started channel (minimum across channels).",
    },
    MethodSpec {
        name: "is_done",
        params: &[],
        returns: "boolean",
        help: "True once the gate train is exhausted or stopped.",
    },
    MethodSpec {
        name: "get_state",
        params: &[],
        returns: "string",
        help: "Run state: idle, armed, running or draining.",
    },
    MethodSpec {
        name: "system.listMethods",
        params: &[],
        returns: "array",
        help: "Names of every method served.",
    },
    MethodSpec {
        name: "system.methodHelp",
        params: &[required("method", "string")],
        returns: "string",
        help: "Help text of a method.",
    },
    MethodSpec {
        name: "system.methodSignature",
        params: &[required("method", "string")],
        returns: "array",
        help: "Signatures of a method as [[returns, params...]].",
    },
];

/// Look up a method by name.
pub fn find(name: &str) -> Option<&'static MethodSpec> {
    METHODS.iter().find(|m| m.name == name)
}

/// Request parameters bound against a [`MethodSpec`].
#[derive(Debug)]
pub struct Params {
    spec: &'static MethodSpec,
    values: Vec<Option<Value>>,
}

impl Params {
    /// Bind positional (array) or named (object) parameters.
    ///
    /// Rejects extra positional values, unknown names and missing required
    /// parameters.
    pub fn bind(spec: &'static MethodSpec, params: Option<Value>) -> Result<Self, RpcError> {
        let mut values: Vec<Option<Value>> = vec![None; spec.params.len()];
        match params {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => {
                if items.len() > spec.params.len() {
                    return Err(RpcError::invalid_params(format!(
                        "{} takes at most {} parameters, got {}",
                        spec.name,
                        spec.params.len(),
                        items.len()
                    )));
                }
                for (slot, item) in values.iter_mut().zip(items) {
                    *slot = Some(item);
                }
            }
            Some(Value::Object(map)) => bind_named(spec, map, &mut values)?,
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "params must be an array or an object",
                ))
            }
        }

        for (slot, param) in values.iter_mut().zip(spec.params) {
            if slot.is_some() {
                continue;
            }
            match param.default {
                Some(default) => {
                    let value = serde_json::from_str(default).map_err(|e| {
                        RpcError::new(
                            crate::protocol::codes::INTERNAL_ERROR,
                            format!("bad default for {}.{}: {}", spec.name, param.name, e),
                        )
                    })?;
                    *slot = Some(value);
                }
                None => {
                    return Err(RpcError::invalid_params(format!(
                        "{}: missing required parameter '{}'",
                        spec.name, param.name
                    )))
                }
            }
        }

        Ok(Self { spec, values })
    }

    /// Deserialize the parameter at `index`.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T, RpcError> {
        let param = self.spec.params.get(index).ok_or_else(|| {
            RpcError::invalid_params(format!("{}: no parameter #{}", self.spec.name, index))
        })?;
        let value = self
            .values
            .get(index)
            .cloned()
            .flatten()
            .unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| {
            RpcError::invalid_params(format!(
                "{}: parameter '{}' must be {}: {}",
                self.spec.name, param.name, param.ty, e
            ))
        })
    }
}

fn bind_named(
    spec: &MethodSpec,
    map: Map<String, Value>,
    values: &mut [Option<Value>],
) -> Result<(), RpcError> {
    for (name, value) in map {
        let index = spec
            .params
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| {
                RpcError::invalid_params(format!("{}: unknown parameter '{}'", spec.name, name))
            })?;
        values[index] = Some(value);
    }
    Ok(())
}
