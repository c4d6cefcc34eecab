//! The boundary to the native binding module.

// -------------------------------------------------------------------------------------------------------

pub type ChannelError = anyhow::Error;

pub type ChannelResult<T> = Result<T, ChannelError>;

/// Receives every raw callback message the binding emits, possibly from a foreign thread.
pub type CallbackSink = Box<dyn Fn(&str) + Send + Sync + 'static>;

// -------------------------------------------------------------------------------------------------------

/// What the proxy layer needs from a binding module.
///
/// All calls are synchronous. The binding reports failures of the remote function
/// inside the result envelope (`data.e`); an `Err` here means the channel itself failed.
pub trait CallChannel: Send + Sync {
    /// Executes a serialized `CallEnvelope` and returns the serialized `ResultEnvelope`.
    fn call_remote(&self, envelope: &str) -> ChannelResult<String>;

    /// `{"functions": ["name-signature", ...]}` for the given class.
    fn get_member_functions(&self, class_name: &str) -> ChannelResult<String>;

    /// Installs the sink for asynchronous callback messages. Called once per router.
    fn on_callback(&self, sink: CallbackSink);

    /// Static function listing, same format as `get_member_functions`.
    /// `None` if the binding doesn't expose one.
    fn get_static_functions(&self, _class_name: &str) -> ChannelResult<Option<String>> {
        Ok(None)
    }

    /// JSON array of the class names the binding provides, `None` if unavailable.
    fn get_classes(&self) -> ChannelResult<Option<String>> {
        Ok(None)
    }
}
