use std::fmt::Display;

use serde::{Deserialize, Serialize};

// -------------------------------------------------------------------------------------------------------

/// Prefix shared by every callback and emitter id handed to the remote side
pub const CALLBACK_PREFIX: &str = "__f__";

/// Prefix of a deferred call result
pub const PROMISE_PREFIX: &str = "__p__";

// -------------------------------------------------------------------------------------------------------

/// Opaque key under which a local handler is reachable from the remote side.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackId(pub String);

impl CallbackId {
    /// `__f__<function>-<index>-<counter>`, one id per registration
    pub fn one_shot(function: &str, index: usize, counter: u64) -> Self {
        CallbackId(format!("{CALLBACK_PREFIX}{function}-{index}-{counter}"))
    }

    /// `__f__<function>-<index>`, the same slot for every registration at that position
    pub fn emitter(function: &str, index: usize) -> Self {
        CallbackId(format!("{CALLBACK_PREFIX}{function}-{index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CallbackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CallbackId {
    fn from(id: &str) -> Self {
        CallbackId(id.to_string())
    }
}

// -------------------------------------------------------------------------------------------------------

/// Identifier of a remote instance. The channel owns the instance, a proxy only refers to it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub String);

impl InstanceId {
    /// Accepts the shapes bindings actually return for `__create__`: strings, and numeric handles.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) if !s.is_empty() => Some(InstanceId(s.clone())),
            serde_json::Value::Number(n) => Some(InstanceId(n.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
