//! Round trips through a live Redis
//!
//! Run with: cargo test --test redis_integration_test -- --ignored

use std::sync::Arc;
use std::time::Duration;

use notification_hub::config::HubConfig;
use notification_hub::{ChannelConnection, Envelope, Hub, Publisher, RedisBackbone};
use serde_json::json;

const REDIS_URL: &str = "redis://127.0.0.1:6379";

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_breaking_news_round_trip() {
    let backbone = Arc::new(
        RedisBackbone::connect(REDIS_URL)
            .await
            .expect("Failed to connect to Redis"),
    );
    let hub = Hub::builder(HubConfig::default())
        .with_backbone(backbone.clone())
        .start()
        .await
        .expect("Failed to start hub");

    let (connection, mut rx) = ChannelConnection::boxed();
    hub.handle().register(21, connection, "en").await.unwrap();
    let welcome = rx.recv().await.unwrap();
    assert!(welcome.contains("welcome"));

    let publisher = Publisher::new(backbone);
    let receivers = publisher
        .breaking_news(1001, "Headline", "Summary")
        .await
        .expect("Failed to publish");
    assert!(receivers > 0, "No subscribers received the message");

    let text = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out")
        .expect("connection closed");
    let envelope = Envelope::from_json(&text).unwrap();
    assert_eq!(envelope.kind, "breaking_news");
    assert_eq!(envelope.topic, "breaking_news");
    assert_eq!(envelope.payload["news_id"], 1001);

    hub.close().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_pattern_subscription_targets_recipient() {
    let backbone = Arc::new(RedisBackbone::connect(REDIS_URL).await.unwrap());
    let hub = Hub::builder(HubConfig::default())
        .with_backbone(backbone.clone())
        .start()
        .await
        .unwrap();

    let (connection, mut rx) = ChannelConnection::boxed();
    hub.handle().register(22, connection, "en").await.unwrap();
    rx.recv().await.unwrap();

    Publisher::new(backbone)
        .user_notification(22, "profile_update", json!({"field": "avatar"}))
        .await
        .unwrap();

    let text = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out")
        .expect("connection closed");
    let envelope = Envelope::from_json(&text).unwrap();
    assert_eq!(envelope.target, Some(22));
    assert_eq!(envelope.topic, "user_notification:22");

    hub.close().await.unwrap();
}
