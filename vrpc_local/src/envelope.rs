//! The JSON messages exchanged with the call channel.
//!
//! ```text
//! CallEnvelope   { targetId: string, method: string, data: { "_1": any, "_2": any, ... } }
//! ResultEnvelope { data: { r: any } | { e: string } }
//! CallbackMsg    { id: string, data: { "_1": any, ... } }
//! ```
//!
//! Positional keys are one-based. They are always ordered by their numeric suffix,
//! `_2` sorts before `_10`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{VrpcError, VrpcResult};

// -------------------------------------------------------------------------------------------------------

/// Reserved method name for constructing a remote instance
pub const CREATE_METHOD: &str = "__create__";

/// Reserved method name for disposing of a remote instance
pub const DELETE_METHOD: &str = "__delete__";

// -------------------------------------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEnvelope {
    /// class name for `__create__` and static calls, instance id otherwise
    pub target_id: String,
    pub method: String,
    pub data: Map<String, Value>,
}

impl CallEnvelope {
    pub fn new(target_id: impl Into<String>, method: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            target_id: target_id.into(),
            method: method.into(),
            data,
        }
    }

    pub fn to_json(&self) -> VrpcResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// -------------------------------------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ResultData {
    #[serde(default)]
    pub r: Value,
    #[serde(default)]
    pub e: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ResultEnvelope {
    pub data: ResultData,
}

impl ResultEnvelope {
    pub fn parse(json: &str) -> VrpcResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// `Err` carries the remote error text; an empty `e` counts as success.
    pub fn into_outcome(self) -> Result<Value, String> {
        self.data.into_outcome()
    }
}

impl ResultData {
    pub fn into_outcome(self) -> Result<Value, String> {
        match self.e {
            None | Some(Value::Null) => Ok(self.r),
            Some(Value::String(message)) if message.is_empty() => Ok(self.r),
            Some(Value::String(message)) => Err(message),
            Some(other) => Err(other.to_string()),
        }
    }
}

// -------------------------------------------------------------------------------------------------------

/// An asynchronous message from the remote side addressed to a registered handler
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallbackMsg {
    pub id: String,
    pub data: Map<String, Value>,
}

impl CallbackMsg {
    pub fn parse(json: &str) -> VrpcResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> VrpcResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// -------------------------------------------------------------------------------------------------------

pub fn positional_key(index: usize) -> String {
    format!("_{}", index + 1)
}

pub fn positional_data(values: impl IntoIterator<Item = Value>) -> Map<String, Value> {
    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| (positional_key(index), value))
        .collect()
}

/// Rebuilds the argument list from `_1.._N` keys. Keys without a numeric suffix are skipped.
pub fn positional_args(data: Map<String, Value>) -> Vec<Value> {
    let mut indexed: Vec<(u64, Value)> = data
        .into_iter()
        .filter_map(|(key, value)| {
            let position = key.strip_prefix('_')?.parse::<u64>().ok()?;
            Some((position, value))
        })
        .collect();
    indexed.sort_by_key(|(position, _)| *position);
    indexed.into_iter().map(|(_, value)| value).collect()
}

// -------------------------------------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum FunctionListing {
    Wrapped { functions: Vec<String> },
    Bare(Vec<String>),
}

/// Accepts `{"functions": [...]}` as well as a bare array of names.
pub fn parse_function_listing(json: &str) -> VrpcResult<Vec<String>> {
    let listing: FunctionListing = serde_json::from_str(json).map_err(|err| {
        VrpcError::MalformedEnvelope(format!("function listing: {err}"))
    })?;
    Ok(match listing {
        FunctionListing::Wrapped { functions } => functions,
        FunctionListing::Bare(functions) => functions,
    })
}

/// Cuts the overload signature off at the first `-`. A leading `-` is not a boundary.
pub fn strip_overload(name: &str) -> &str {
    match name.find('-') {
        Some(pos) if pos > 0 => &name[..pos],
        _ => name,
    }
}

pub fn unique_method_names<S: AsRef<str>>(functions: &[S]) -> BTreeSet<String> {
    functions
        .iter()
        .map(|name| strip_overload(name.as_ref()).to_string())
        .collect()
}

// -------------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------------
