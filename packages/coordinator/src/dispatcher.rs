//! Command dispatcher: routes commands received on a topic to local handlers.
//!
//! A forwarding task drains the channel subscription into the dispatcher's
//! mailbox, so a slow handler never stalls the subscription. The actor runs
//! handlers one at a time, which keeps per-subscriber delivery order.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use queue_core::{Command, CommandKind, Topic};
use ractor::{Actor, ActorProcessingErr, ActorRef};

use crate::channel::{CommandChannel, CommandStream};
use crate::error::CoordinatorResult;
use crate::messages::DispatcherMessage;

/// Future returned by a command handler.
pub type CommandFuture = BoxFuture<'static, CoordinatorResult<()>>;

/// Zero-argument async action bound to a command kind.
pub trait CommandHandler: Send + Sync + 'static {
    fn call(&self) -> CommandFuture;
}

impl<F> CommandHandler for F
where
    F: Fn() -> CommandFuture + Send + Sync + 'static,
{
    fn call(&self) -> CommandFuture {
        self()
    }
}

/// Mapping from command kind to handler.
///
/// Built before the dispatcher starts and shared read-only afterwards.
#[derive(Default)]
pub struct CommandHandlerRegistry {
    handlers: HashMap<CommandKind, Arc<dyn CommandHandler>>,
}

impl CommandHandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler. The last registration for a kind wins.
    pub fn register<H: CommandHandler>(&mut self, kind: CommandKind, handler: H) {
        if self.handlers.insert(kind.clone(), Arc::new(handler)).is_some() {
            tracing::debug!("Replaced handler for command {}", kind);
        }
    }

    pub fn get(&self, kind: &CommandKind) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(kind).cloned()
    }

    pub fn kinds(&self) -> Vec<&CommandKind> {
        self.handlers.keys().collect()
    }
}

/// Dispatcher actor arguments.
pub struct DispatcherArgs {
    pub topic: Topic,
    pub handlers: Arc<CommandHandlerRegistry>,
    pub commands: CommandStream,
}

/// State for the dispatcher actor.
pub struct DispatcherState {
    topic: Topic,
    handlers: Arc<CommandHandlerRegistry>,
    forwarder: tokio::task::JoinHandle<()>,
}

/// Dispatcher actor executing handlers for one topic.
pub struct CommandDispatcher;

impl Actor for CommandDispatcher {
    type Msg = DispatcherMessage;
    type State = DispatcherState;
    type Arguments = DispatcherArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Listening for commands on {}", args.topic);

        let mut commands = args.commands;
        let forwarder = tokio::spawn(async move {
            while let Some(raw) = commands.next().await {
                if myself.send_message(DispatcherMessage::Deliver { raw }).is_err() {
                    break;
                }
            }
        });

        Ok(DispatcherState {
            topic: args.topic,
            handlers: args.handlers,
            forwarder,
        })
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.forwarder.abort();
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            DispatcherMessage::Deliver { raw } => {
                let command = match Command::decode(&raw) {
                    Ok(command) => command,
                    Err(e) => {
                        tracing::warn!(
                            "Dropping malformed command {:?} on {}: {}",
                            raw,
                            state.topic,
                            e
                        );
                        return Ok(());
                    }
                };

                let Some(handler) = state.handlers.get(&command.kind) else {
                    tracing::warn!("Dropping unknown command {} on {}", command.kind, state.topic);
                    return Ok(());
                };

                tracing::debug!("Running command {} from {}", command.kind, state.topic);
                if let Err(e) = handler.call().await {
                    tracing::warn!("Command {} failed: {}", command.kind, e);
                }
            }

            DispatcherMessage::Shutdown => {
                myself.stop(None);
            }
        }

        Ok(())
    }
}

/// Subscribe to `topic` and start a dispatcher for it.
pub async fn spawn_dispatcher<C: CommandChannel>(
    channel: &C,
    topic: Topic,
    handlers: Arc<CommandHandlerRegistry>,
) -> CoordinatorResult<ActorRef<DispatcherMessage>> {
    let commands = channel.subscribe(topic).await?;

    let args = DispatcherArgs {
        topic,
        handlers,
        commands,
    };
    let (actor, _handle) = Actor::spawn(None, CommandDispatcher, args).await?;

    Ok(actor)
}
