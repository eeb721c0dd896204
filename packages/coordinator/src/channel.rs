//! Command channel: broadcast pub/sub over the `WORKER` and `PRIMARY` topics.

use std::future::Future;
use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use queue_core::Topic;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::error::ChannelError;

/// Messages received on one topic, in publish order.
pub type CommandStream = BoxStream<'static, String>;

/// Pub/sub transport for raw command strings.
///
/// Delivery is best effort: a message published while nobody is subscribed
/// is lost, and there is no acknowledgement.
pub trait CommandChannel: Send + Sync + 'static {
    fn publish(
        &self,
        topic: Topic,
        message: String,
    ) -> impl Future<Output = Result<(), ChannelError>> + Send;

    fn subscribe(
        &self,
        topic: Topic,
    ) -> impl Future<Output = Result<CommandStream, ChannelError>> + Send;
}

/// In-process channel backed by one tokio broadcast channel per topic.
#[derive(Clone)]
pub struct LocalChannel {
    topics: Arc<Topics>,
}

struct Topics {
    worker: broadcast::Sender<String>,
    primary: broadcast::Sender<String>,
}

impl LocalChannel {
    /// Create a channel buffering up to `capacity` messages per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (worker, _) = broadcast::channel(capacity);
        let (primary, _) = broadcast::channel(capacity);
        Self {
            topics: Arc::new(Topics { worker, primary }),
        }
    }

    fn sender(&self, topic: Topic) -> &broadcast::Sender<String> {
        match topic {
            Topic::Worker => &self.topics.worker,
            Topic::Primary => &self.topics.primary,
        }
    }
}

impl Default for LocalChannel {
    fn default() -> Self {
        Self::new(256)
    }
}

impl CommandChannel for LocalChannel {
    async fn publish(&self, topic: Topic, message: String) -> Result<(), ChannelError> {
        match self.sender(topic).send(message) {
            Ok(receivers) => tracing::debug!("Published to {} ({} subscribers)", topic, receivers),
            Err(_) => tracing::debug!("Published to {} with no subscribers", topic),
        }
        Ok(())
    }

    async fn subscribe(&self, topic: Topic) -> Result<CommandStream, ChannelError> {
        let rx = self.sender(topic).subscribe();

        let messages = stream::unfold(rx, move |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(message) => return Some((message, rx)),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Subscriber on {} dropped {} commands", topic, skipped);
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        });

        Ok(messages.boxed())
    }
}
