//! An in-process binding module exposing `TestClass`.
//!
//! It speaks the raw wire format on its own and only shares the envelope layout
//! with `vrpc_local`, so the tests see exactly what a native binding would send.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use vrpc_local::{CallChannel, CallbackSink, ChannelResult};

// -------------------------------------------------------------------------------------------------------

pub const CLASS_NAME: &str = "TestClass";

const MEMBER_FUNCTIONS: &[&str] = &[
    "getRegistry-",
    "hasCategory-std::string",
    "notifyOnNew-std::function<void(Entry)>",
    "notifyOnRemoved-std::function<void(Entry)>",
    "addEntry-std::string:Entry",
    "removeEntry-std::string",
    "callMeBack-std::function<void(int32_t)>",
    "callMeLater-std::function<void(std::string)>:int32_t",
    "computeLater-int32_t:int32_t",
    "echo-",
    "echo-json",
    "echo-json:json",
];

const STATIC_FUNCTIONS: &[&str] = &["crazy-", "crazy-std::string"];

type SharedSink = Arc<dyn Fn(&str) + Send + Sync + 'static>;

#[derive(Default)]
struct TestClass {
    registry: BTreeMap<String, Vec<Value>>,
    listeners: HashMap<&'static str, String>,
}

#[derive(Default)]
struct BindingState {
    next_instance: u64,
    next_promise: u64,
    instances: HashMap<String, TestClass>,
}

/// Messages the binding wants to emit once its state lock is released.
enum Outgoing {
    Now(String, Value),
    Later(Duration, String, Value),
}

#[derive(Default)]
pub struct TestBinding {
    state: Mutex<BindingState>,
    sink: Mutex<Option<SharedSink>>,
    subscriptions: AtomicUsize,
}

impl TestBinding {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    pub fn instance_count(&self) -> usize {
        self.state.lock().instances.len()
    }

    /// Pushes a raw message into the callback sink, as the binding would on its own.
    pub fn emit_raw(&self, raw: &str) {
        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            sink(raw);
        }
    }

    fn deliver(&self, outgoing: Vec<Outgoing>) {
        let Some(sink) = self.sink.lock().clone() else {
            tracing::warn!("TestBinding: no callback sink installed, dropping {} messages", outgoing.len());
            return;
        };
        for message in outgoing {
            match message {
                Outgoing::Now(id, data) => sink(&callback_json(&id, data)),
                Outgoing::Later(delay, id, data) => {
                    let sink = sink.clone();
                    std::thread::spawn(move || {
                        std::thread::sleep(delay);
                        sink(&callback_json(&id, data));
                    });
                }
            }
        }
    }

    fn call_static(&self, method: &str, args: &[Value]) -> Result<Value, String> {
        match (method, args) {
            ("crazy", []) => Ok(json!("who is crazy?")),
            ("crazy", [Value::String(who)]) => Ok(json!(format!("{who} is crazy!"))),
            _ => Err(format!("Could not find function: {method}")),
        }
    }

    fn call_member(
        &self,
        state: &mut BindingState,
        target: &str,
        method: &str,
        args: Vec<Value>,
        outgoing: &mut Vec<Outgoing>,
    ) -> Result<Value, String> {
        if method == "computeLater" {
            let sum = args.iter().filter_map(Value::as_i64).sum::<i64>();
            state.next_promise += 1;
            let promise = format!("__p__computeLater-{}", state.next_promise);
            outgoing.push(Outgoing::Later(
                Duration::from_millis(20),
                promise.clone(),
                json!({ "r": sum }),
            ));
            return Ok(json!(promise));
        }

        let instance = state
            .instances
            .get_mut(target)
            .ok_or_else(|| format!("Could not find instance: {target}"))?;

        match method {
            "getRegistry" => Ok(json!(instance.registry)),
            "hasCategory" => Ok(json!(instance.registry.contains_key(&string_arg(&args, 0)?))),
            "notifyOnNew" => {
                instance.listeners.insert("new", string_arg(&args, 0)?);
                Ok(Value::Null)
            }
            "notifyOnRemoved" => {
                instance.listeners.insert("removed", string_arg(&args, 0)?);
                Ok(Value::Null)
            }
            "addEntry" => {
                let category = string_arg(&args, 0)?;
                let entry = args.get(1).cloned().unwrap_or(Value::Null);
                let entries = instance.registry.entry(category).or_default();
                entries.push(entry.clone());
                if entries.len() == 1 {
                    if let Some(id) = instance.listeners.get("new") {
                        outgoing.push(Outgoing::Now(id.clone(), json!({ "_1": entry })));
                    }
                }
                Ok(Value::Null)
            }
            "removeEntry" => {
                let category = string_arg(&args, 0)?;
                let Some(entries) = instance.registry.get_mut(&category) else {
                    return Err("Can not remove non-existing category".to_string());
                };
                let entry = entries.pop().unwrap_or(Value::Null);
                if entries.is_empty() {
                    instance.registry.remove(&category);
                    if let Some(id) = instance.listeners.get("removed") {
                        outgoing.push(Outgoing::Now(id.clone(), json!({ "_1": entry.clone() })));
                    }
                }
                Ok(entry)
            }
            "callMeBack" => {
                outgoing.push(Outgoing::Now(string_arg(&args, 0)?, json!({ "_1": 100 })));
                Ok(Value::Null)
            }
            "callMeLater" => {
                let delay = args.get(1).and_then(Value::as_u64).unwrap_or(10);
                outgoing.push(Outgoing::Later(
                    Duration::from_millis(delay),
                    string_arg(&args, 0)?,
                    json!({ "_1": "later", "_2": delay }),
                ));
                Ok(Value::Null)
            }
            "echo" => Ok(Value::Array(args)),
            _ => Err(format!("Could not find function: {method}")),
        }
    }
}

impl CallChannel for TestBinding {
    fn call_remote(&self, envelope: &str) -> ChannelResult<String> {
        let envelope: Value = serde_json::from_str(envelope)?;
        let target = envelope["targetId"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("envelope without targetId"))?
            .to_string();
        let method = envelope["method"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("envelope without method"))?
            .to_string();
        let args = match &envelope["data"] {
            Value::Object(data) => ordered_args(data),
            _ => anyhow::bail!("envelope without data"),
        };

        let mut outgoing = Vec::new();
        let result = {
            let mut state = self.state.lock();
            match (target.as_str(), method.as_str()) {
                (CLASS_NAME, "__create__") => {
                    state.next_instance += 1;
                    let id = format!("{CLASS_NAME}-{}", state.next_instance);
                    let mut instance = TestClass::default();
                    if let Some(Value::Object(registry)) = args.first() {
                        for (category, entries) in registry {
                            if let Value::Array(entries) = entries {
                                instance.registry.insert(category.clone(), entries.clone());
                            }
                        }
                    }
                    state.instances.insert(id.clone(), instance);
                    Ok(json!(id))
                }
                (CLASS_NAME, "__delete__") => string_arg(&args, 0)
                    .map(|id| json!(state.instances.remove(&id).is_some())),
                (CLASS_NAME, method) => self.call_static(method, &args),
                (target, method) => self.call_member(&mut state, target, method, args, &mut outgoing),
            }
        };

        // a synchronous callback fires before the call returns, like the native implementation
        self.deliver(outgoing);

        let response = match result {
            Ok(r) => json!({ "data": { "r": r } }),
            Err(e) => json!({ "data": { "e": e } }),
        };
        Ok(response.to_string())
    }

    fn get_member_functions(&self, class_name: &str) -> ChannelResult<String> {
        if class_name != CLASS_NAME {
            anyhow::bail!("Unknown class: {class_name}");
        }
        Ok(json!({ "functions": MEMBER_FUNCTIONS }).to_string())
    }

    fn on_callback(&self, sink: CallbackSink) {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        *self.sink.lock() = Some(Arc::from(sink));
    }

    fn get_static_functions(&self, class_name: &str) -> ChannelResult<Option<String>> {
        if class_name != CLASS_NAME {
            anyhow::bail!("Unknown class: {class_name}");
        }
        Ok(Some(json!({ "functions": STATIC_FUNCTIONS }).to_string()))
    }

    fn get_classes(&self) -> ChannelResult<Option<String>> {
        Ok(Some(json!([CLASS_NAME]).to_string()))
    }
}

// -------------------------------------------------------------------------------------------------------

fn ordered_args(data: &Map<String, Value>) -> Vec<Value> {
    let mut args: Vec<(usize, Value)> = data
        .iter()
        .filter_map(|(key, value)| Some((key.strip_prefix('_')?.parse().ok()?, value.clone())))
        .collect();
    args.sort_by_key(|(position, _)| *position);
    args.into_iter().map(|(_, value)| value).collect()
}

fn string_arg(args: &[Value], index: usize) -> Result<String, String> {
    args.get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| format!("argument {} must be a string", index + 1))
}

fn callback_json(id: &str, data: Value) -> String {
    json!({ "id": id, "data": data }).to_string()
}
