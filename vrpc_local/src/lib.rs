//! Local-side proxies for classes living inside an introspectable binding module.
//!
//! Every call is packed into a JSON envelope and sent through a [`CallChannel`].
//! Function-valued arguments become ids the remote side can fire later; the
//! [`CallbackRouter`] routes those firings back to the local handlers.

pub mod actor;
pub mod arg;
pub mod channel;
pub mod config;
pub mod envelope;
pub mod error;
pub mod factory;
pub mod ids;
pub mod proxy;
pub mod router;

#[cfg(test)]
mod testing;

pub use actor::{EmitterEvent, EmitterMailbox};
pub use arg::{Arg, CallbackFn, EmitterFn};
pub use channel::{CallChannel, CallbackSink, ChannelError, ChannelResult};
pub use config::VrpcConfig;
pub use error::{VrpcError, VrpcResult};
pub use factory::VrpcLocal;
pub use ids::{CallbackId, InstanceId};
pub use proxy::Proxy;
pub use router::{CallbackRouter, Dispatched};

// callbacks arrive on whatever thread the binding uses
static_assertions::assert_impl_all!(VrpcLocal: Send, Sync, Clone);
static_assertions::assert_impl_all!(Proxy: Send, Sync);
static_assertions::assert_impl_all!(CallbackRouter: Send, Sync);
static_assertions::assert_impl_all!(Arg: Send);
