//! A channel that answers from a script and records what was sent.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use serde_json::Value;

use crate::channel::{CallChannel, CallbackSink, ChannelResult};

#[derive(Default)]
pub struct ScriptedChannel {
    responses: Mutex<VecDeque<String>>,
    sent: Mutex<Vec<Value>>,
    functions: Mutex<HashMap<String, String>>,
    sinks: Mutex<Vec<CallbackSink>>,
}

impl ScriptedChannel {
    pub fn respond(&self, result_json: &str) -> &Self {
        self.responses.lock().push_back(result_json.to_string());
        self
    }

    pub fn with_functions(&self, class_name: &str, listing: &str) -> &Self {
        self.functions
            .lock()
            .insert(class_name.to_string(), listing.to_string());
        self
    }

    pub fn sent(&self) -> Vec<Value> {
        self.sent.lock().clone()
    }

    pub fn subscriptions(&self) -> usize {
        self.sinks.lock().len()
    }

    pub fn emit(&self, raw: &str) {
        for sink in self.sinks.lock().iter() {
            sink(raw);
        }
    }
}

impl CallChannel for ScriptedChannel {
    fn call_remote(&self, envelope: &str) -> ChannelResult<String> {
        self.sent.lock().push(serde_json::from_str(envelope)?);
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("no scripted response left"))
    }

    fn get_member_functions(&self, class_name: &str) -> ChannelResult<String> {
        self.functions
            .lock()
            .get(class_name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown class {}", class_name))
    }

    fn on_callback(&self, sink: CallbackSink) {
        self.sinks.lock().push(sink);
    }
}
