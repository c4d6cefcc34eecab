use crate::ids::CallbackId;

// -------------------------------------------------------------------------------------------------------

/// Failures surfaced by the proxy layer.
///
/// Construction and invocation errors go back to the immediate caller.
/// Errors on the dispatch path only ever reach the callback sink, which logs them.
#[derive(Debug, thiserror::Error)]
pub enum VrpcError {
    /// The channel answered `__create__` with an error envelope.
    #[error("failed to construct remote instance of `{class_name}`: {message}")]
    Construction { class_name: String, message: String },

    /// A member or static call answered with `data.e`. Displays the remote text verbatim.
    #[error("{0}")]
    RemoteInvocation(String),

    /// The invoke counter wrapped around onto an id that is still pending.
    #[error("callback id {0} is still registered")]
    DuplicateCallbackId(CallbackId),

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("`{class_name}` has no member function `{method}`")]
    UnknownMethod { class_name: String, method: String },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("promise {0} was not settled in time")]
    PromiseTimeout(String),

    #[error("promise {0} was dropped before it settled")]
    PromiseDropped(String),

    #[error("call channel failure: {0:#}")]
    Channel(anyhow::Error),
}

impl From<serde_json::Error> for VrpcError {
    fn from(err: serde_json::Error) -> Self {
        VrpcError::MalformedEnvelope(err.to_string())
    }
}

pub type VrpcResult<T> = Result<T, VrpcError>;
