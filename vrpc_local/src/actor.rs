use ractor::{Actor, ActorProcessingErr, ActorRef, SpawnErr, concurrency::JoinHandle};
use serde_json::Value;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

// -------------------------------------------------------------------------------------------------------

/// One firing of an emitter, as delivered to an actor registered through [`crate::Arg::actor`].
#[derive(Clone, Debug, PartialEq)]
pub struct EmitterEvent {
    pub context: String,
    pub args: Vec<Value>,
}

// -------------------------------------------------------------------------------------------------------

/// An actor whose mailbox is drained into a channel owned by the caller.
pub struct EmitterMailbox {
    pub rx: UnboundedReceiver<EmitterEvent>,
    pub actor_ref: ActorRef<EmitterEvent>,
}

struct MailboxActor;

struct MailboxActorState {
    tx: UnboundedSender<EmitterEvent>,
}

#[cfg_attr(feature = "async-trait", ractor::async_trait)]
impl Actor for MailboxActor {
    type Msg = EmitterEvent;
    type State = MailboxActorState;
    type Arguments = UnboundedSender<EmitterEvent>;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        tx: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        Ok(MailboxActorState { tx })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match state.tx.send(message) {
            Ok(()) => Ok(()),
            Err(err) => {
                // the receiving side is gone, nobody is listening anymore
                tracing::debug!("EmitterMailbox: receiver dropped, stopping: {}", err);
                myself.stop(None);
                Ok(())
            }
        }
    }
}

impl EmitterMailbox {
    /// Spawns the actor. Must be called from within a tokio runtime.
    pub async fn spawn() -> Result<(EmitterMailbox, JoinHandle<()>), SpawnErr> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<EmitterEvent>();
        let (actor_ref, handle) = Actor::spawn(None, MailboxActor, tx).await?;
        Ok((EmitterMailbox { rx, actor_ref }, handle))
    }
}

// -------------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------------
