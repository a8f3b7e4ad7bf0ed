//! Backbone topic names
//!
//! Global topics are fixed strings; scoped topics follow `{base}:{id}`.

use std::fmt::Display;

pub const BREAKING_NEWS: &str = "breaking_news";
pub const SYSTEM_ALERT: &str = "system_alert";
pub const TRENDING_UPDATES: &str = "trending_updates";
pub const LIVE_STATS: &str = "live_stats";

/// Channel recorded on envelopes the hub writes without a backbone hop
pub const DIRECT: &str = "direct";

pub const USER_NOTIFICATION: &str = "user_notification";
pub const USER_COMMENT: &str = "user_comment";
pub const USER_VOTE: &str = "user_vote";
pub const USER_MENTION: &str = "user_mention";
pub const NEWS_UPDATE: &str = "news_update";
pub const NEWS_COMMENT: &str = "news_comment";
pub const CATEGORY_UPDATE: &str = "category_update";

/// Build a scoped topic
///
/// # Example
///
/// ```
/// use notification_hub::topics::scoped;
///
/// assert_eq!(scoped("video_votes", 12), "video_votes:12");
/// ```
pub fn scoped(base: &str, id: impl Display) -> String {
    format!("{}:{}", base, id)
}

pub fn user_notification(user_id: impl Display) -> String {
    scoped(USER_NOTIFICATION, user_id)
}

pub fn news_update(news_id: impl Display) -> String {
    scoped(NEWS_UPDATE, news_id)
}

pub fn news_comment(news_id: impl Display) -> String {
    scoped(NEWS_COMMENT, news_id)
}

/// Pattern matching every scoped topic of `base`
pub fn all_scoped(base: &str) -> String {
    format!("{}:*", base)
}

/// Split a scoped topic into base and id
pub fn parse_scoped(topic: &str) -> Option<(&str, &str)> {
    let (base, id) = topic.split_once(':')?;
    if base.is_empty() || id.is_empty() {
        return None;
    }
    Some((base, id))
}

/// Glob match supporting a single trailing `*`
pub fn pattern_matches(pattern: &str, topic: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => topic.starts_with(prefix),
        None => pattern == topic,
    }
}

pub fn default_global_topics() -> Vec<String> {
    [BREAKING_NEWS, SYSTEM_ALERT, TRENDING_UPDATES, LIVE_STATS]
        .iter()
        .map(|t| t.to_string())
        .collect()
}

pub fn default_recipient_patterns() -> Vec<String> {
    [USER_NOTIFICATION, USER_COMMENT, USER_VOTE, USER_MENTION]
        .iter()
        .map(|base| all_scoped(base))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_topics() {
        assert_eq!(user_notification(7), "user_notification:7");
        assert_eq!(news_update(15), "news_update:15");
        assert_eq!(news_comment("abc"), "news_comment:abc");
        assert_eq!(scoped(USER_VOTE, 3), "user_vote:3");
    }

    #[test]
    fn test_parse_scoped() {
        assert_eq!(parse_scoped("user_comment:9"), Some(("user_comment", "9")));
        assert_eq!(parse_scoped("video_votes:1:2"), Some(("video_votes", "1:2")));
        assert_eq!(parse_scoped("breaking_news"), None);
        assert_eq!(parse_scoped(":9"), None);
        assert_eq!(parse_scoped("user_comment:"), None);
    }

    #[test]
    fn test_pattern_matches() {
        assert!(pattern_matches("user_notification:*", "user_notification:7"));
        assert!(!pattern_matches("user_notification:*", "user_vote:7"));
        assert!(pattern_matches("system_alert", "system_alert"));
        assert!(!pattern_matches("system_alert", "system_alert:1"));
        assert!(pattern_matches("*", "anything"));
    }

    #[test]
    fn test_defaults_include_required_globals() {
        let globals = default_global_topics();
        assert!(globals.contains(&BREAKING_NEWS.to_string()));
        assert!(globals.contains(&SYSTEM_ALERT.to_string()));

        let patterns = default_recipient_patterns();
        assert!(patterns.contains(&"user_notification:*".to_string()));
    }
}
