use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::{debug, info, warn};

use super::{Backbone, BackboneMessage, MessageStream, Subscription};
use crate::error::Result;

/// Redis pub/sub backbone
///
/// Publishes go through a shared `ConnectionManager`; every subscription
/// opens its own dedicated pub/sub connection, released when the stream
/// is dropped.
#[derive(Clone)]
pub struct RedisBackbone {
    client: Client,
    publisher: ConnectionManager,
}

impl RedisBackbone {
    /// Connect to Redis
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let publisher = ConnectionManager::new(client.clone()).await?;

        info!("Connected to Redis backbone");

        Ok(Self { client, publisher })
    }
}

#[async_trait]
impl Backbone for RedisBackbone {
    async fn publish(&self, topic: &str, payload: String) -> Result<usize> {
        let mut conn = self.publisher.clone();
        let receivers: usize = conn.publish(topic, payload).await?;

        debug!(topic = %topic, receivers, "Published to Redis");
        Ok(receivers)
    }

    async fn subscribe(&self, subscription: &Subscription) -> Result<MessageStream> {
        // Pub/sub needs a dedicated connection, not the multiplexed one
        let mut pubsub = self.client.get_async_pubsub().await?;

        for topic in &subscription.topics {
            pubsub.subscribe(topic).await?;
        }
        for pattern in &subscription.patterns {
            pubsub.psubscribe(pattern).await?;
        }

        info!(
            topics = ?subscription.topics,
            patterns = ?subscription.patterns,
            "Subscribed to Redis backbone"
        );

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let topic = msg.get_channel_name().to_string();
            match msg.get_payload::<String>() {
                Ok(payload) => Some(BackboneMessage { topic, payload }),
                Err(e) => {
                    warn!(topic = %topic, error = ?e, "Failed to read Redis message payload");
                    None
                }
            }
        });

        Ok(stream.boxed())
    }
}
