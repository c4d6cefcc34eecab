use std::{collections::BTreeSet, sync::Arc};

use serde_json::Value;

use crate::{
    arg::Arg,
    channel::CallChannel,
    config::VrpcConfig,
    envelope::{
        CREATE_METHOD, CallEnvelope, DELETE_METHOD, parse_function_listing, positional_key,
        unique_method_names,
    },
    error::{VrpcError, VrpcResult},
    ids::InstanceId,
    proxy::{Proxy, transmit},
    router::CallbackRouter,
};

// -------------------------------------------------------------------------------------------------------

/// Creates proxies for the classes a binding module exposes through its call channel.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use vrpc_local::{Arg, CallChannel, VrpcLocal};
/// # fn demo(channel: Arc<dyn CallChannel>) -> vrpc_local::VrpcResult<()> {
/// let vrpc = VrpcLocal::new(channel);
/// let test_class = vrpc.create("TestClass", vec![])?;
/// test_class.call("notifyOnNew", vec![Arg::emitter(|event, args| println!("{event}: {args:?}"), "new")])?;
/// let crazy = vrpc.call_static("TestClass", "crazy", vec![Arg::plain("vrpc")])?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct VrpcLocal {
    router: Arc<CallbackRouter>,
}

impl VrpcLocal {
    pub fn new(channel: Arc<dyn CallChannel>) -> Self {
        Self::with_config(channel, VrpcConfig::default())
    }

    pub fn with_config(channel: Arc<dyn CallChannel>, config: VrpcConfig) -> Self {
        Self {
            router: CallbackRouter::with_config(channel, config),
        }
    }

    /// A factory on top of an existing router. [`VrpcLocal::new`] already reuses the live router of
    /// a channel, so this is only needed to share a router that was built directly.
    pub fn with_router(router: Arc<CallbackRouter>) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &Arc<CallbackRouter> {
        &self.router
    }

    fn channel(&self) -> &dyn CallChannel {
        self.router.channel().as_ref()
    }

    // ---------------------------------------------------------------------------------------------------

    /// Constructs a remote instance and returns a proxy exposing the class's member functions.
    pub fn create(&self, class_name: &str, args: Vec<Arg>) -> VrpcResult<Proxy> {
        let packed = self.router.pack(CREATE_METHOD, args)?;
        let envelope = CallEnvelope::new(class_name, CREATE_METHOD, packed.data);

        let construction_failed = |message: String| VrpcError::Construction {
            class_name: class_name.to_string(),
            message,
        };

        let created = transmit(self.channel(), &envelope)
            .and_then(|result| result.into_outcome().map_err(construction_failed))
            .and_then(|r| {
                InstanceId::from_value(&r).ok_or_else(|| {
                    VrpcError::MalformedEnvelope(format!(
                        "`{CREATE_METHOD}` of `{class_name}` returned no instance id: {r}"
                    ))
                })
            })
            .and_then(|instance_id| match self.member_functions(class_name) {
                Ok(methods) => Ok((instance_id, methods)),
                Err(err) => {
                    // the instance exists remotely but can never be reached through a proxy
                    if let Err(delete_err) = self.delete_instance(class_name, &instance_id) {
                        tracing::warn!(
                            "Failed to delete orphaned {} instance {}: {}",
                            class_name,
                            instance_id,
                            delete_err
                        );
                    }
                    Err(err)
                }
            });

        let (instance_id, methods) = match created {
            Ok(created) => created,
            Err(err) => {
                self.router.withdraw(&packed.callbacks);
                return Err(err);
            }
        };

        tracing::info!(
            "Created {} instance {} with {} member functions",
            class_name,
            instance_id,
            methods.len()
        );
        Ok(Proxy::new(
            class_name.to_string(),
            instance_id,
            self.router.clone(),
            methods,
        ))
    }

    /// Calls a static function. Callbacks and emitters are refused before anything is sent.
    pub fn call_static(&self, class_name: &str, function: &str, args: Vec<Arg>) -> VrpcResult<Value> {
        let data = self.router.pack_plain(function, args)?;
        let envelope = CallEnvelope::new(class_name, function, data);
        transmit(self.channel(), &envelope)?
            .into_outcome()
            .map_err(VrpcError::RemoteInvocation)
    }

    /// Disposes of the remote instance behind `proxy`, if the binding supports it.
    pub fn delete(&self, proxy: Proxy) -> VrpcResult<bool> {
        self.delete_instance(proxy.class_name(), proxy.instance_id())
    }

    fn delete_instance(&self, class_name: &str, instance_id: &InstanceId) -> VrpcResult<bool> {
        let mut data = serde_json::Map::new();
        data.insert(positional_key(0), Value::String(instance_id.0.clone()));
        let envelope = CallEnvelope::new(class_name, DELETE_METHOD, data);
        let r = transmit(self.channel(), &envelope)?
            .into_outcome()
            .map_err(VrpcError::RemoteInvocation)?;
        Ok(r.as_bool().unwrap_or(false))
    }

    // ---------------------------------------------------------------------------------------------------

    /// The unique member function names of `class_name`, overload signatures removed.
    pub fn member_functions(&self, class_name: &str) -> VrpcResult<BTreeSet<String>> {
        let listing = self
            .channel()
            .get_member_functions(class_name)
            .map_err(VrpcError::Channel)?;
        Ok(unique_method_names(&parse_function_listing(&listing)?))
    }

    pub fn static_functions(&self, class_name: &str) -> VrpcResult<BTreeSet<String>> {
        let listing = self
            .channel()
            .get_static_functions(class_name)
            .map_err(VrpcError::Channel)?
            .ok_or_else(|| VrpcError::Unsupported("binding lists no static functions".into()))?;
        Ok(unique_method_names(&parse_function_listing(&listing)?))
    }

    pub fn available_classes(&self) -> VrpcResult<Vec<String>> {
        let classes = self
            .channel()
            .get_classes()
            .map_err(VrpcError::Channel)?
            .ok_or_else(|| VrpcError::Unsupported("binding lists no classes".into()))?;
        Ok(serde_json::from_str(&classes)?)
    }
}

// -------------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------------
