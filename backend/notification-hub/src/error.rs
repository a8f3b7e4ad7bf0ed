//! Error types for the notification hub

use thiserror::Error;

use crate::connection::ConnectionError;

/// Notification hub errors
#[derive(Error, Debug)]
pub enum HubError {
    /// Redis connection or operation error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Envelope serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backbone could not accept the publish
    #[error("Backbone unavailable: {0}")]
    BackboneUnavailable(String),

    /// Hub is draining or stopped
    #[error("Hub is shutting down")]
    ShuttingDown,

    /// Closing or writing a live connection failed
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// A background task panicked or was cancelled
    #[error("Hub task failed: {0}")]
    Task(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, HubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HubError::BackboneUnavailable("redis down".to_string());
        assert_eq!(err.to_string(), "Backbone unavailable: redis down");

        assert_eq!(HubError::ShuttingDown.to_string(), "Hub is shutting down");
    }

    #[test]
    fn test_error_from_serde() {
        let json_err = serde_json::from_str::<String>("invalid json");
        assert!(json_err.is_err());

        let err: HubError = json_err.unwrap_err().into();
        assert!(matches!(err, HubError::Serialization(_)));
    }

    #[test]
    fn test_error_from_connection() {
        let err: HubError = ConnectionError::Closed.into();
        assert!(matches!(err, HubError::Connection(ConnectionError::Closed)));
        assert_eq!(err.to_string(), "Connection error: connection closed");
    }
}
