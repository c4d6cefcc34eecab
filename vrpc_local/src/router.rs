use std::{
    collections::HashMap,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::oneshot;

use crate::{
    arg::{Arg, CallbackFn, EmitterFn},
    channel::CallChannel,
    config::VrpcConfig,
    envelope::{CallbackMsg, ResultData, positional_args, positional_key},
    error::{VrpcError, VrpcResult},
    ids::{CallbackId, PROMISE_PREFIX},
};

// -------------------------------------------------------------------------------------------------------

/// Arguments after packing, ready to go into a `CallEnvelope`.
#[derive(Debug, Default)]
pub struct PackedArgs {
    pub data: Map<String, Value>,
    /// one-shot ids registered while packing, in argument order
    pub callbacks: Vec<CallbackId>,
}

/// What `dispatch` did with a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatched {
    Callback(CallbackId),
    Emitter(CallbackId),
    Promise(String),
    /// a deferred result arrived before anyone waited for it; it is kept until claimed or expired
    PromiseBuffered(String),
    /// id in neither registry: stale, already fired, or never ours
    Ignored(String),
}

type PromiseOutcome = Result<Value, String>;

#[derive(Default)]
struct Registries {
    callbacks: HashMap<CallbackId, CallbackFn>,
    emitters: HashMap<CallbackId, (EmitterFn, String)>,
    promises: HashMap<String, oneshot::Sender<PromiseOutcome>>,
    /// results without a waiter, each with the instant it expires at
    settled: HashMap<String, (PromiseOutcome, Instant)>,
    /// ids whose waiter timed out; a late result for them is dropped
    abandoned: HashMap<String, Instant>,
}

impl Registries {
    fn buffer(&mut self, promise_id: String, outcome: PromiseOutcome, expires_at: Instant) {
        let now = Instant::now();
        self.settled.retain(|_, (_, deadline)| *deadline > now);
        self.settled.insert(promise_id, (outcome, expires_at));
    }

    fn abandon(&mut self, promise_id: String, expires_at: Instant) {
        let now = Instant::now();
        self.abandoned.retain(|_, deadline| *deadline > now);
        self.abandoned.insert(promise_id, expires_at);
    }

    fn claim(&mut self, promise_id: &str) -> Option<PromiseOutcome> {
        let (outcome, deadline) = self.settled.remove(promise_id)?;
        (deadline > Instant::now()).then_some(outcome)
    }
}

/// Live routers by the address of their channel.
static SHARED_ROUTERS: Mutex<Vec<(usize, Weak<CallbackRouter>)>> = parking_lot::const_mutex(Vec::new());

fn channel_key(channel: &Arc<dyn CallChannel>) -> usize {
    Arc::as_ptr(channel).cast::<()>() as usize
}

// -------------------------------------------------------------------------------------------------------

/// Maps callback and emitter ids to local handlers and routes incoming callback messages.
///
/// There is one router per channel. The first router built for a channel installs itself as
/// the channel's callback sink, later constructions for the same channel return that router
/// for as long as it is alive.
pub struct CallbackRouter {
    channel: Arc<dyn CallChannel>,
    config: VrpcConfig,
    invoke_counter: AtomicU64,
    registries: Mutex<Registries>,
}

impl CallbackRouter {
    pub fn new(channel: Arc<dyn CallChannel>) -> Arc<Self> {
        Self::with_config(channel, VrpcConfig::default())
    }

    /// Returns the live router of `channel`, or subscribes a new one with `config`.
    pub fn with_config(channel: Arc<dyn CallChannel>, config: VrpcConfig) -> Arc<Self> {
        let key = channel_key(&channel);
        let mut shared = SHARED_ROUTERS.lock();
        shared.retain(|(_, router)| router.strong_count() > 0);
        if let Some(router) = shared
            .iter()
            .find(|(channel, _)| *channel == key)
            .and_then(|(_, router)| router.upgrade())
        {
            if router.config.promise_timeout != config.promise_timeout
                || router.config.counter_wrap != config.counter_wrap.max(1)
            {
                tracing::warn!("Channel already has a router, ignoring the new configuration");
            }
            return router;
        }

        let router = Self::subscribe(channel, config);
        shared.push((key, Arc::downgrade(&router)));
        router
    }

    fn subscribe(channel: Arc<dyn CallChannel>, config: VrpcConfig) -> Arc<Self> {
        let config = VrpcConfig {
            counter_wrap: config.counter_wrap.max(1),
            ..config
        };
        let router = Arc::new(CallbackRouter {
            channel: channel.clone(),
            config,
            invoke_counter: AtomicU64::new(0),
            registries: Mutex::new(Registries::default()),
        });

        // the channel holds on to the sink, so it must not keep the router alive
        let weak: Weak<CallbackRouter> = Arc::downgrade(&router);
        channel.on_callback(Box::new(move |raw| {
            let Some(router) = weak.upgrade() else {
                tracing::debug!("Callback arrived after the router was dropped");
                return;
            };
            if let Err(err) = router.dispatch(raw) {
                tracing::warn!("Failed to dispatch callback message: {}", err);
            }
        }));

        tracing::debug!("CallbackRouter subscribed to the call channel");
        router
    }

    pub fn channel(&self) -> &Arc<dyn CallChannel> {
        &self.channel
    }

    pub fn config(&self) -> &VrpcConfig {
        &self.config
    }

    // ---------------------------------------------------------------------------------------------------

    /// Registers a one-shot handler under a fresh, counter-qualified id.
    pub fn register_callback(
        &self,
        function: &str,
        index: usize,
        handler: CallbackFn,
    ) -> VrpcResult<CallbackId> {
        let wrap = self.config.counter_wrap;
        let counter = self
            .invoke_counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| Some((c + 1) % wrap))
            .unwrap_or_else(|c| c);
        let id = CallbackId::one_shot(function, index, counter);

        let mut registries = self.registries.lock();
        if registries.callbacks.contains_key(&id) {
            tracing::error!("Callback id {} is still registered, refusing to overwrite", id);
            return Err(VrpcError::DuplicateCallbackId(id));
        }
        registries.callbacks.insert(id.clone(), handler);
        Ok(id)
    }

    /// Registers a persistent handler at the `(function, index)` slot, replacing any previous one.
    pub fn register_emitter(
        &self,
        function: &str,
        index: usize,
        handler: EmitterFn,
        context: String,
    ) -> CallbackId {
        let id = CallbackId::emitter(function, index);
        let previous = self
            .registries
            .lock()
            .emitters
            .insert(id.clone(), (handler, context));
        if previous.is_some() {
            tracing::debug!("Emitter {} re-registered", id);
        }
        id
    }

    pub fn unregister_emitter(&self, id: &CallbackId) -> bool {
        self.registries.lock().emitters.remove(id).is_some()
    }

    /// Withdraws a one-shot handler that has not fired yet.
    pub fn unregister_callback(&self, id: &CallbackId) -> bool {
        self.registries.lock().callbacks.remove(id).is_some()
    }

    pub fn pending_callbacks(&self) -> usize {
        self.registries.lock().callbacks.len()
    }

    pub fn registered_emitters(&self) -> usize {
        self.registries.lock().emitters.len()
    }

    /// Deferred results waiting to be claimed, expired ones included until the next insert.
    pub fn buffered_promises(&self) -> usize {
        self.registries.lock().settled.len()
    }

    pub fn is_registered(&self, id: &CallbackId) -> bool {
        let registries = self.registries.lock();
        registries.callbacks.contains_key(id) || registries.emitters.contains_key(id)
    }

    // ---------------------------------------------------------------------------------------------------

    /// Replaces callables by registered ids. On failure nothing registered here stays behind.
    pub fn pack(&self, function: &str, args: Vec<Arg>) -> VrpcResult<PackedArgs> {
        let mut packed = PackedArgs::default();
        for (index, arg) in args.into_iter().enumerate() {
            let value = match arg {
                Arg::Plain(value) => value,
                Arg::Callback(handler) => match self.register_callback(function, index, handler) {
                    Ok(id) => {
                        packed.callbacks.push(id.clone());
                        Value::String(id.0)
                    }
                    Err(err) => {
                        self.withdraw(&packed.callbacks);
                        return Err(err);
                    }
                },
                Arg::Emitter(handler, context) => {
                    let id = self.register_emitter(function, index, handler, context);
                    Value::String(id.0)
                }
            };
            packed.data.insert(positional_key(index), value);
        }
        Ok(packed)
    }

    /// Packs arguments that must not contain callables.
    pub fn pack_plain(&self, function: &str, args: Vec<Arg>) -> VrpcResult<Map<String, Value>> {
        let mut data = Map::new();
        for (index, arg) in args.into_iter().enumerate() {
            let Arg::Plain(value) = arg else {
                return Err(VrpcError::Unsupported(format!(
                    "argument {} of `{}`: callbacks and emitters are not supported here",
                    index + 1,
                    function
                )));
            };
            data.insert(positional_key(index), value);
        }
        Ok(data)
    }

    pub(crate) fn withdraw(&self, callbacks: &[CallbackId]) {
        if callbacks.is_empty() {
            return;
        }
        let mut registries = self.registries.lock();
        for id in callbacks {
            registries.callbacks.remove(id);
        }
    }

    // ---------------------------------------------------------------------------------------------------

    /// Routes one raw callback message. Handlers run after the registry lock is released.
    pub fn dispatch(&self, raw: &str) -> VrpcResult<Dispatched> {
        let CallbackMsg { id, data } = CallbackMsg::parse(raw)?;
        let key = CallbackId(id);

        enum Route {
            Callback(CallbackFn),
            Emitter(EmitterFn, String),
            Promise(Option<oneshot::Sender<PromiseOutcome>>),
            Ignored,
        }

        let route = {
            let mut registries = self.registries.lock();
            if let Some(handler) = registries.callbacks.remove(&key) {
                Route::Callback(handler)
            } else if let Some((handler, context)) = registries.emitters.get(&key) {
                Route::Emitter(handler.clone(), context.clone())
            } else if key.as_str().starts_with(PROMISE_PREFIX) {
                if registries.abandoned.remove(key.as_str()).is_some() {
                    tracing::debug!("Dropping result of abandoned promise {}", key);
                    Route::Ignored
                } else {
                    Route::Promise(registries.promises.remove(key.as_str()))
                }
            } else {
                Route::Ignored
            }
        };

        match route {
            Route::Callback(handler) => {
                tracing::debug!("Firing callback {}", key);
                handler(positional_args(data));
                Ok(Dispatched::Callback(key))
            }
            Route::Emitter(handler, context) => {
                tracing::debug!("Firing emitter {} ({})", key, context);
                handler(&context, positional_args(data));
                Ok(Dispatched::Emitter(key))
            }
            Route::Promise(waiter) => {
                let outcome = promise_outcome(data)?;
                match waiter {
                    Some(tx) => {
                        if tx.send(outcome).is_err() {
                            tracing::debug!("Promise {} settled, but nobody is waiting", key);
                        }
                        Ok(Dispatched::Promise(key.0))
                    }
                    None => {
                        let expires_at = Instant::now() + self.config.promise_timeout;
                        self.registries.lock().buffer(key.0.clone(), outcome, expires_at);
                        Ok(Dispatched::PromiseBuffered(key.0))
                    }
                }
            }
            Route::Ignored => {
                tracing::debug!("Ignoring callback message for unknown id {}", key);
                Ok(Dispatched::Ignored(key.0))
            }
        }
    }

    // ---------------------------------------------------------------------------------------------------

    /// Waits for the settlement of a deferred result id (`__p__...`).
    ///
    /// A result buffered for longer than `promise_timeout` is gone. Once a wait times out, a
    /// result that still shows up for the id is dropped.
    pub async fn await_promise(&self, promise_id: &str) -> VrpcResult<Value> {
        let rx = {
            let mut registries = self.registries.lock();
            if let Some(outcome) = registries.claim(promise_id) {
                return outcome.map_err(VrpcError::RemoteInvocation);
            }
            registries.abandoned.remove(promise_id);
            let (tx, rx) = oneshot::channel();
            registries.promises.insert(promise_id.to_string(), tx);
            rx
        };

        match tokio::time::timeout(self.config.promise_timeout, rx).await {
            Ok(Ok(outcome)) => outcome.map_err(VrpcError::RemoteInvocation),
            Ok(Err(_)) => Err(VrpcError::PromiseDropped(promise_id.to_string())),
            Err(_) => {
                let expires_at = Instant::now() + self.config.promise_timeout;
                let mut registries = self.registries.lock();
                registries.promises.remove(promise_id);
                registries.abandon(promise_id.to_string(), expires_at);
                Err(VrpcError::PromiseTimeout(promise_id.to_string()))
            }
        }
    }
}

fn promise_outcome(data: Map<String, Value>) -> VrpcResult<PromiseOutcome> {
    let data: ResultData = serde_json::from_value(Value::Object(data))?;
    Ok(data.into_outcome())
}

// -------------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------------
