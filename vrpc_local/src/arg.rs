use std::sync::Arc;

use ractor::ActorRef;
use serde_json::Value;

use crate::actor::EmitterEvent;

// -------------------------------------------------------------------------------------------------------

/// Invoked once with the positional arguments of the first matching callback message.
pub type CallbackFn = Box<dyn FnOnce(Vec<Value>) + Send + 'static>;

/// Invoked for every matching callback message with the registered context and the arguments.
pub type EmitterFn = Arc<dyn Fn(&str, Vec<Value>) + Send + Sync + 'static>;

// -------------------------------------------------------------------------------------------------------

/// A single argument of a remote call.
///
/// Callables are never inferred from the shape of a value, the caller states what it passes.
/// A two-element JSON array is always `Plain`.
pub enum Arg {
    Plain(Value),
    /// a function the remote side may call (at most) once
    Callback(CallbackFn),
    /// a handler the remote side may call any number of times, together with its context
    Emitter(EmitterFn, String),
}

impl Arg {
    pub fn plain(value: impl Into<Value>) -> Self {
        Arg::Plain(value.into())
    }

    pub fn callback<F>(f: F) -> Self
    where
        F: FnOnce(Vec<Value>) + Send + 'static,
    {
        Arg::Callback(Box::new(f))
    }

    pub fn emitter<F>(f: F, context: impl Into<String>) -> Self
    where
        F: Fn(&str, Vec<Value>) + Send + Sync + 'static,
    {
        Arg::Emitter(Arc::new(f), context.into())
    }

    /// An emitter that forwards every firing to an actor as an [`EmitterEvent`].
    pub fn actor(actor_ref: ActorRef<EmitterEvent>, context: impl Into<String>) -> Self {
        Arg::emitter(
            move |context, args| {
                let event = EmitterEvent {
                    context: context.to_string(),
                    args,
                };
                if let Err(err) = actor_ref.send_message(event) {
                    tracing::error!("Failed to forward emitter event to actor: {}", err);
                }
            },
            context,
        )
    }

    pub fn is_plain(&self) -> bool {
        matches!(self, Arg::Plain(_))
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Plain(value)
    }
}

impl std::fmt::Debug for Arg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arg::Plain(value) => f.debug_tuple("Plain").field(value).finish(),
            Arg::Callback(_) => f.write_str("Callback(..)"),
            Arg::Emitter(_, context) => f.debug_tuple("Emitter").field(&"..").field(context).finish(),
        }
    }
}
