//! Queue coordination for a fleet of primary and worker processes.
//!
//! Every process runs one [`InstanceCoordinator`]. Workers always consume
//! jobs. A primary consumes only while no worker is alive (when fallback is
//! enabled), and operators can pause or resume consumption remotely through
//! the command channel.
//!
//! # Architecture
//!
//! - `BrokerActor` - Owns the shared job queue and pause flags
//! - `ConsumerActor` - Pulls jobs from the broker and runs processors
//! - `CommandDispatcher` - Routes commands from a topic to handlers
//! - `InstanceCoordinator` - Toggle policy over queue, channel and presence
//!
//! # Usage
//!
//! ```ignore
//! use coordinator::{BrokerConfig, HeartbeatRegistry, InstanceCoordinator, LocalChannel,
//!     LocalQueueController, spawn_broker};
//!
//! let (client, _handle) = spawn_broker(BrokerConfig::new("jobs"), "primary-1").await?;
//! let queue = LocalQueueController::new(client, Duration::from_secs(5));
//! let coordinator = InstanceCoordinator::new(role, queue, LocalChannel::default(), registry);
//! coordinator.initialize().await?;
//! ```

mod broker_actor;
mod broker_client;
mod channel;
pub mod config;
mod consumer_actor;
mod controller;
mod coordinator;
mod dispatcher;
mod error;
mod messages;
mod presence;
mod processor;
mod queue_client;

pub use broker_actor::{BrokerActor, BrokerConfig, BrokerState};
pub use broker_client::{BrokerClient, spawn_broker};
pub use channel::{CommandChannel, CommandStream, LocalChannel};
pub use config::NodeConfig;
pub use consumer_actor::{ConsumerActor, ConsumerArgs, ConsumerState, spawn_consumers};
pub use controller::LocalQueueController;
pub use coordinator::{InstanceCoordinator, ToggleAction, decide_toggle};
pub use dispatcher::{
    CommandDispatcher, CommandFuture, CommandHandler, CommandHandlerRegistry, DispatcherArgs,
    spawn_dispatcher,
};
pub use error::{
    ChannelError, ConfigError, CoordinatorError, CoordinatorResult, PresenceError, QueueError,
};
pub use messages::{BrokerMessage, ConsumerMessage, DispatcherMessage};
pub use presence::{HeartbeatRegistry, PresenceEvent, PresenceRegistry, spawn_heartbeat};
pub use processor::{
    FnProcessor, JobProcessor, JobProcessorRegistry, ProcessorFuture, ProcessorResult,
};
pub use queue_client::QueueClient;

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort};
