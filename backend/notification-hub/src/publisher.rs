//! Publish API
//!
//! Stamps envelopes with send time and topic, then hands them to the
//! backbone. In offline mode nothing leaves the process.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use notification_hub::backbone::RedisBackbone;
//! use notification_hub::Publisher;
//!
//! # async fn run() -> notification_hub::Result<()> {
//! let backbone = RedisBackbone::connect("redis://localhost:6379").await?;
//! let publisher = Publisher::new(Arc::new(backbone));
//!
//! publisher.breaking_news(42, "Title", "Summary").await?;
//! publisher.system_alert("warning", "Degraded search").await?;
//! # Ok(())
//! # }
//! ```

use std::fmt::Display;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::backbone::Backbone;
use crate::envelope::{kinds, Envelope, UserId};
use crate::error::Result;
use crate::metrics;
use crate::topics;

#[derive(Clone)]
pub struct Publisher {
    backbone: Option<Arc<dyn Backbone>>,
    offline: bool,
}

impl Publisher {
    pub fn new(backbone: Arc<dyn Backbone>) -> Self {
        Self {
            backbone: Some(backbone),
            offline: false,
        }
    }

    /// Publisher that logs instead of publishing
    pub fn offline() -> Self {
        Self {
            backbone: None,
            offline: true,
        }
    }

    /// Offline when `test_mode` is set, regardless of the backbone
    pub fn from_test_mode(test_mode: bool, backbone: Option<Arc<dyn Backbone>>) -> Self {
        Self {
            offline: test_mode || backbone.is_none(),
            backbone,
        }
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// Publish `envelope` on `topic`
    ///
    /// Returns the number of backbone subscribers that received it (zero
    /// when offline). Backbone failures are returned to the caller.
    pub async fn publish(&self, topic: &str, mut envelope: Envelope) -> Result<usize> {
        envelope.stamp(topic);
        let payload = envelope.to_json()?;

        let backbone = match &self.backbone {
            Some(backbone) if !self.offline => backbone,
            _ => {
                info!(
                    topic = %topic,
                    kind = %envelope.kind,
                    "Offline mode, notification not published"
                );
                metrics::observe_publish("offline");
                return Ok(0);
            }
        };

        match backbone.publish(topic, payload).await {
            Ok(receivers) => {
                debug!(
                    topic = %topic,
                    kind = %envelope.kind,
                    receivers = receivers,
                    "Notification published"
                );
                metrics::observe_publish("sent");
                Ok(receivers)
            }
            Err(e) => {
                error!(topic = %topic, kind = %envelope.kind, error = %e, "Failed to publish notification");
                metrics::observe_publish("failed");
                Err(e)
            }
        }
    }

    pub async fn breaking_news(&self, news_id: i64, title: &str, summary: &str) -> Result<usize> {
        let envelope = Envelope::new(
            kinds::BREAKING_NEWS,
            json!({
                "news_id": news_id,
                "title": title,
                "summary": summary,
            }),
        );
        self.publish(topics::BREAKING_NEWS, envelope).await
    }

    /// Free-form notice for one recipient
    pub async fn user_notification(
        &self,
        user_id: UserId,
        kind: &str,
        data: Value,
    ) -> Result<usize> {
        let envelope = Envelope::targeted(user_id, kind, data);
        self.publish(&topics::user_notification(user_id), envelope)
            .await
    }

    pub async fn comment_notification(
        &self,
        user_id: UserId,
        news_id: i64,
        comment_id: i64,
        commenter: &str,
    ) -> Result<usize> {
        let envelope = Envelope::targeted(
            user_id,
            kinds::COMMENT_NOTIFICATION,
            json!({
                "news_id": news_id,
                "comment_id": comment_id,
                "commenter": commenter,
            }),
        );
        self.publish(&topics::scoped(topics::USER_COMMENT, user_id), envelope)
            .await
    }

    pub async fn vote_notification(
        &self,
        user_id: UserId,
        target_type: &str,
        target_id: i64,
        vote_type: &str,
    ) -> Result<usize> {
        let envelope = Envelope::targeted(
            user_id,
            kinds::VOTE_NOTIFICATION,
            json!({
                "target_type": target_type,
                "target_id": target_id,
                "vote_type": vote_type,
            }),
        );
        self.publish(&topics::scoped(topics::USER_VOTE, user_id), envelope)
            .await
    }

    pub async fn mention_notification(
        &self,
        user_id: UserId,
        news_id: i64,
        comment_id: i64,
        mentioned_by: &str,
    ) -> Result<usize> {
        let envelope = Envelope::targeted(
            user_id,
            kinds::MENTION_NOTIFICATION,
            json!({
                "news_id": news_id,
                "comment_id": comment_id,
                "mentioned_by": mentioned_by,
            }),
        );
        self.publish(&topics::scoped(topics::USER_MENTION, user_id), envelope)
            .await
    }

    pub async fn system_alert(&self, level: &str, message: &str) -> Result<usize> {
        let envelope = Envelope::new(
            kinds::SYSTEM_ALERT,
            json!({ "level": level, "message": message }),
        );
        self.publish(topics::SYSTEM_ALERT, envelope).await
    }

    /// Announce planned downtime on the system alert topic
    pub async fn maintenance_notice(
        &self,
        message: &str,
        scheduled_at: DateTime<Utc>,
        duration_minutes: u32,
    ) -> Result<usize> {
        let envelope = Envelope::new(
            kinds::MAINTENANCE_NOTICE,
            json!({
                "message": message,
                "scheduled_at": scheduled_at,
                "duration_minutes": duration_minutes,
            }),
        );
        self.publish(topics::SYSTEM_ALERT, envelope).await
    }

    pub async fn trending_update(&self, items: Value) -> Result<usize> {
        let envelope = Envelope::new(kinds::TRENDING_UPDATE, json!({ "items": items }));
        self.publish(topics::TRENDING_UPDATES, envelope).await
    }

    pub async fn live_statistics(&self, stats: Value) -> Result<usize> {
        let envelope = Envelope::new(kinds::LIVE_STATS, stats);
        self.publish(topics::LIVE_STATS, envelope).await
    }

    /// Progress is clamped to 100
    pub async fn video_processing_progress(
        &self,
        user_id: UserId,
        video_id: i64,
        progress: u8,
        status: &str,
    ) -> Result<usize> {
        let envelope = Envelope::targeted(
            user_id,
            kinds::VIDEO_PROCESSING_PROGRESS,
            json!({
                "video_id": video_id,
                "progress": progress.min(100),
                "status": status,
            }),
        );
        self.publish(&topics::user_notification(user_id), envelope)
            .await
    }

    pub async fn user_followed(
        &self,
        user_id: UserId,
        follower_id: UserId,
        follower_name: &str,
    ) -> Result<usize> {
        let envelope = Envelope::targeted(
            user_id,
            kinds::USER_FOLLOWED,
            json!({
                "follower_id": follower_id,
                "follower_name": follower_name,
            }),
        );
        self.publish(&topics::user_notification(user_id), envelope)
            .await
    }

    pub async fn user_unfollowed(&self, user_id: UserId, follower_id: UserId) -> Result<usize> {
        let envelope = Envelope::targeted(
            user_id,
            kinds::USER_UNFOLLOWED,
            json!({ "follower_id": follower_id }),
        );
        self.publish(&topics::user_notification(user_id), envelope)
            .await
    }

    pub async fn category_alert(
        &self,
        category_id: i64,
        title: &str,
        message: &str,
    ) -> Result<usize> {
        let envelope = Envelope::new(
            kinds::CATEGORY_ALERT,
            json!({
                "category_id": category_id,
                "title": title,
                "message": message,
            }),
        );
        self.publish(&topics::scoped(topics::CATEGORY_UPDATE, category_id), envelope)
            .await
    }

    pub async fn news_update(&self, news_id: i64, data: Value) -> Result<usize> {
        let envelope = Envelope::new(kinds::NEWS_UPDATE, data);
        self.publish(&topics::news_update(news_id), envelope).await
    }

    pub async fn news_comment(&self, news_id: i64, data: Value) -> Result<usize> {
        let envelope = Envelope::new(kinds::NEWS_COMMENT, data);
        self.publish(&topics::news_comment(news_id), envelope).await
    }

    /// Event on an arbitrary entity channel, e.g. `video_votes:{id}`
    pub async fn entity_event(
        &self,
        base: &str,
        id: impl Display,
        kind: &str,
        data: Value,
    ) -> Result<usize> {
        let envelope = Envelope::new(kind, data);
        self.publish(&topics::scoped(base, id), envelope).await
    }
}
