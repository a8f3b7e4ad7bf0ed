use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::{future, stream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use super::{Backbone, BackboneMessage, MessageStream, Subscription};
use crate::error::{HubError, Result};

/// In-process backbone over a broadcast channel
pub struct MemoryBackbone {
    sender: broadcast::Sender<BackboneMessage>,
    available: AtomicBool,
}

impl MemoryBackbone {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: publishes fail while unavailable
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for MemoryBackbone {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl Backbone for MemoryBackbone {
    async fn publish(&self, topic: &str, payload: String) -> Result<usize> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(HubError::BackboneUnavailable(
                "in-memory backbone is offline".to_string(),
            ));
        }

        let message = BackboneMessage {
            topic: topic.to_string(),
            payload,
        };
        // No subscribers is not an error on a fire-and-forget backbone
        Ok(self.sender.send(message).unwrap_or(0))
    }

    async fn subscribe(&self, subscription: &Subscription) -> Result<MessageStream> {
        let receiver = self.sender.subscribe();
        let subscription = subscription.clone();

        let stream = stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(message) => return Some((message, receiver)),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "In-memory subscriber lagged, messages dropped");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        })
        .filter(move |message| future::ready(subscription.matches(&message.topic)));

        Ok(stream.boxed())
    }
}
