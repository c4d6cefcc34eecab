use std::time::Duration;

// -------------------------------------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VrpcConfig {
    /// the one-shot invoke counter runs through `0..counter_wrap` and then starts over at zero
    pub counter_wrap: u64,
    /// how long `call_async` waits for a deferred result before giving up
    pub promise_timeout: Duration,
}

impl Default for VrpcConfig {
    fn default() -> Self {
        Self {
            counter_wrap: u64::MAX,
            promise_timeout: Duration::from_secs(120),
        }
    }
}

impl VrpcConfig {
    pub fn with_counter_wrap(mut self, counter_wrap: u64) -> Self {
        self.counter_wrap = counter_wrap.max(1);
        self
    }

    pub fn with_promise_timeout(mut self, promise_timeout: Duration) -> Self {
        self.promise_timeout = promise_timeout;
        self
    }
}
