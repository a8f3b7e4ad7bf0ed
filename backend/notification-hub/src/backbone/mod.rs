//! Publish/subscribe backbone
//!
//! ```text
//! Publisher ── PUBLISH topic payload ──> backbone ──> subscription stream ──> bridge
//! ```
//!
//! The backbone is fire-and-forget: messages published while nobody is
//! subscribed are lost.

mod memory;
mod redis_pubsub;

pub use self::memory::MemoryBackbone;
pub use self::redis_pubsub::RedisBackbone;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::topics;

/// Raw payload received from the backbone
#[derive(Debug, Clone, PartialEq)]
pub struct BackboneMessage {
    pub topic: String,
    pub payload: String,
}

pub type MessageStream = BoxStream<'static, BackboneMessage>;

/// Exact topics plus trailing-`*` patterns to listen on
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Subscription {
    pub topics: Vec<String>,
    pub patterns: Vec<String>,
}

impl Subscription {
    pub fn new(topics: Vec<String>, patterns: Vec<String>) -> Self {
        Self { topics, patterns }
    }

    /// Global topics plus per-recipient patterns
    pub fn defaults() -> Self {
        Self::new(
            topics::default_global_topics(),
            topics::default_recipient_patterns(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty() && self.patterns.is_empty()
    }

    pub fn matches(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| t == topic)
            || self
                .patterns
                .iter()
                .any(|p| topics::pattern_matches(p, topic))
    }
}

#[async_trait]
pub trait Backbone: Send + Sync {
    /// Publish a payload; returns how many subscribers received it
    async fn publish(&self, topic: &str, payload: String) -> Result<usize>;

    /// Open a stream of messages matching `subscription`
    async fn subscribe(&self, subscription: &Subscription) -> Result<MessageStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_matches() {
        let subscription = Subscription::new(
            vec!["breaking_news".to_string()],
            vec!["user_notification:*".to_string()],
        );

        assert!(subscription.matches("breaking_news"));
        assert!(subscription.matches("user_notification:12"));
        assert!(!subscription.matches("system_alert"));
        assert!(!subscription.matches("news_update:1"));
    }

    #[test]
    fn test_default_subscription() {
        let subscription = Subscription::defaults();
        assert!(!subscription.is_empty());
        assert!(subscription.matches("system_alert"));
        assert!(subscription.matches("user_mention:4"));
        assert!(!subscription.matches("news_comment:4"));
    }
}
