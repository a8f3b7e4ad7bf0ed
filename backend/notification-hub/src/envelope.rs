/// Notification envelope: the record that travels over the backbone and
/// down to live clients.
///
/// Wire shape: `{"type", "user_id"?, "data", "timestamp", "channel"}`.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stable identity of a connected recipient
pub type UserId = u64;

/// Well-known envelope kinds
pub mod kinds {
    pub const BREAKING_NEWS: &str = "breaking_news";
    pub const WELCOME: &str = "welcome";
    pub const LOCALIZED_NOTIFICATION: &str = "localized_notification";
    pub const LOCALIZED_BROADCAST: &str = "localized_broadcast";
    pub const SYSTEM_ALERT: &str = "system_alert";
    pub const MAINTENANCE_NOTICE: &str = "maintenance_notice";
    pub const COMMENT_NOTIFICATION: &str = "comment_notification";
    pub const VOTE_NOTIFICATION: &str = "vote_notification";
    pub const MENTION_NOTIFICATION: &str = "mention_notification";
    pub const TRENDING_UPDATE: &str = "trending_update";
    pub const LIVE_STATS: &str = "live_stats";
    pub const VIDEO_PROCESSING_PROGRESS: &str = "video_processing_progress";
    pub const USER_FOLLOWED: &str = "user_followed";
    pub const USER_UNFOLLOWED: &str = "user_unfollowed";
    pub const CATEGORY_ALERT: &str = "category_alert";
    pub const NEWS_UPDATE: &str = "news_update";
    pub const NEWS_COMMENT: &str = "news_comment";
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    /// Discriminator, e.g. `breaking_news`
    #[serde(rename = "type")]
    pub kind: String,

    /// Single recipient; `None` means every connected recipient
    #[serde(rename = "user_id", default, skip_serializing_if = "Option::is_none")]
    pub target: Option<UserId>,

    #[serde(rename = "data", default)]
    pub payload: Value,

    /// Overwritten by the publisher at send time
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Topic the envelope travelled on; overwritten by the publisher
    #[serde(rename = "channel", default)]
    pub topic: String,
}

impl Envelope {
    /// Create a broadcast envelope
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            target: None,
            payload,
            timestamp: Utc::now(),
            topic: String::new(),
        }
    }

    /// Create an envelope addressed to one recipient
    pub fn targeted(user_id: UserId, kind: impl Into<String>, payload: Value) -> Self {
        Self::new(kind, payload).with_target(user_id)
    }

    pub fn with_target(mut self, user_id: UserId) -> Self {
        self.target = Some(user_id);
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn is_broadcast(&self) -> bool {
        self.target.is_none()
    }

    /// Set send time and travel topic
    pub fn stamp(&mut self, topic: &str) {
        self.timestamp = Utc::now();
        self.topic = topic.to_string();
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_field_names() {
        let mut envelope = Envelope::targeted(42, kinds::SYSTEM_ALERT, json!({"message": "m1"}));
        envelope.stamp("system_alert");

        let value: Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "system_alert");
        assert_eq!(value["user_id"], 42);
        assert_eq!(value["data"]["message"], "m1");
        assert_eq!(value["channel"], "system_alert");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_broadcast_omits_user_id() {
        let envelope = Envelope::new(kinds::BREAKING_NEWS, json!({}));
        assert!(envelope.is_broadcast());

        let json = envelope.to_json().unwrap();
        assert!(!json.contains("user_id"));
    }

    #[test]
    fn test_round_trip_preserves_routing_fields() {
        let envelope = Envelope::targeted(7, "profile_update", json!({"field": "avatar"}))
            .with_topic("user_notification:7");

        let decoded = Envelope::from_json(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(decoded.kind, envelope.kind);
        assert_eq!(decoded.target, envelope.target);
        assert_eq!(decoded.payload, envelope.payload);
        assert_eq!(decoded.topic, envelope.topic);
    }

    #[test]
    fn test_decode_tolerates_missing_optional_fields() {
        let decoded = Envelope::from_json(r#"{"type":"breaking_news"}"#).unwrap();
        assert_eq!(decoded.kind, "breaking_news");
        assert_eq!(decoded.target, None);
        assert_eq!(decoded.payload, Value::Null);
        assert!(decoded.topic.is_empty());
    }

    #[test]
    fn test_decode_rejects_missing_type() {
        assert!(Envelope::from_json(r#"{"data":{}}"#).is_err());
        assert!(Envelope::from_json("not json").is_err());
    }
}
