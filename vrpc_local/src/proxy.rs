use std::{collections::BTreeMap, sync::Arc};

use serde_json::Value;

use crate::{
    arg::Arg,
    channel::CallChannel,
    envelope::{CallEnvelope, ResultEnvelope},
    error::{VrpcError, VrpcResult},
    ids::{CallbackId, InstanceId, PROMISE_PREFIX},
    router::CallbackRouter,
};

// -------------------------------------------------------------------------------------------------------

type Invoker = Box<dyn Fn(&CallbackRouter, Vec<Arg>) -> VrpcResult<Value> + Send + Sync>;

/// Local stand-in for one remote instance.
///
/// The method table is fixed when the proxy is created, from the member functions the
/// channel reported for the class. Dropping a proxy does not touch the remote instance.
pub struct Proxy {
    class_name: String,
    instance_id: InstanceId,
    router: Arc<CallbackRouter>,
    methods: BTreeMap<String, Invoker>,
}

impl Proxy {
    pub(crate) fn new(
        class_name: String,
        instance_id: InstanceId,
        router: Arc<CallbackRouter>,
        method_names: impl IntoIterator<Item = String>,
    ) -> Self {
        let methods = method_names
            .into_iter()
            .map(|name| {
                let target = instance_id.clone();
                let method = name.clone();
                let invoker: Invoker = Box::new(move |router: &CallbackRouter, args: Vec<Arg>| {
                    invoke(router, target.as_str(), &method, args)
                });
                (name, invoker)
            })
            .collect();

        Proxy {
            class_name,
            instance_id,
            router,
            methods,
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    /// The collapsed member functions, sorted.
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    /// Calls a member function and blocks until the channel answers.
    pub fn call(&self, method: &str, args: Vec<Arg>) -> VrpcResult<Value> {
        let invoker = self.methods.get(method).ok_or_else(|| VrpcError::UnknownMethod {
            class_name: self.class_name.clone(),
            method: method.to_string(),
        })?;
        invoker(&self.router, args)
    }

    /// Like [`Proxy::call`], but a deferred (`__p__`) result is awaited until it settles.
    pub async fn call_async(&self, method: &str, args: Vec<Arg>) -> VrpcResult<Value> {
        match self.call(method, args)? {
            Value::String(promise) if promise.starts_with(PROMISE_PREFIX) => {
                tracing::debug!("{}::{} returned deferred result {}", self.class_name, method, promise);
                self.router.await_promise(&promise).await
            }
            value => Ok(value),
        }
    }

    /// Drops the emitter registered for argument `index` of `method`.
    pub fn off(&self, method: &str, index: usize) -> bool {
        self.router.unregister_emitter(&CallbackId::emitter(method, index))
    }
}

impl std::fmt::Debug for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proxy")
            .field("class_name", &self.class_name)
            .field("instance_id", &self.instance_id)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

// -------------------------------------------------------------------------------------------------------

fn invoke(router: &CallbackRouter, target: &str, method: &str, args: Vec<Arg>) -> VrpcResult<Value> {
    let packed = router.pack(method, args)?;
    let envelope = CallEnvelope::new(target, method, packed.data);

    let outcome = transmit(router.channel().as_ref(), &envelope).and_then(|result| {
        result
            .into_outcome()
            .map_err(VrpcError::RemoteInvocation)
    });
    if outcome.is_err() {
        router.withdraw(&packed.callbacks);
    }
    outcome
}

/// Sends one envelope through the channel and parses the answer.
pub(crate) fn transmit(channel: &dyn CallChannel, envelope: &CallEnvelope) -> VrpcResult<ResultEnvelope> {
    let json = envelope.to_json()?;
    tracing::debug!("-> {}::{}", envelope.target_id, envelope.method);
    let response = channel.call_remote(&json).map_err(VrpcError::Channel)?;
    ResultEnvelope::parse(&response)
}

// -------------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------------
