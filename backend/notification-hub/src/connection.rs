//! Live transport handles owned by the hub
//!
//! A connection is handed to the hub on registration and from then on only
//! the hub loop writes to or closes it.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    #[error("connection closed")]
    Closed,

    #[error("write timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),
}

/// A writable, closable transport to one recipient
#[async_trait]
pub trait Connection: Send {
    /// Write one JSON-encoded envelope
    async fn send(&mut self, text: String) -> Result<(), ConnectionError>;

    async fn close(&mut self) -> Result<(), ConnectionError>;
}

pub type BoxedConnection = Box<dyn Connection>;

/// Write with an upper bound; a timeout is reported as a failed write
pub(crate) async fn send_with_timeout(
    connection: &mut BoxedConnection,
    text: String,
    limit: Duration,
) -> Result<(), ConnectionError> {
    match tokio::time::timeout(limit, connection.send(text)).await {
        Ok(result) => result,
        Err(_) => Err(ConnectionError::Timeout(limit)),
    }
}

/// Connection backed by an unbounded channel
///
/// The receiving half observes `None` once the hub closes the connection.
pub struct ChannelConnection {
    sender: Option<mpsc::UnboundedSender<String>>,
}

impl ChannelConnection {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { sender: Some(tx) }, rx)
    }

    pub fn boxed() -> (BoxedConnection, mpsc::UnboundedReceiver<String>) {
        let (connection, rx) = Self::new();
        (Box::new(connection), rx)
    }
}

#[async_trait]
impl Connection for ChannelConnection {
    async fn send(&mut self, text: String) -> Result<(), ConnectionError> {
        match &self.sender {
            Some(sender) => sender.send(text).map_err(|_| ConnectionError::Closed),
            None => Err(ConnectionError::Closed),
        }
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        match self.sender.take() {
            Some(_) => Ok(()),
            None => Err(ConnectionError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_connection_send() {
        let (mut connection, mut rx) = ChannelConnection::new();
        connection.send("hello".to_string()).await.unwrap();
        assert_eq!(rx.recv().await, Some("hello".to_string()));
    }

    #[tokio::test]
    async fn test_channel_connection_close_ends_stream() {
        let (mut connection, mut rx) = ChannelConnection::new();
        connection.close().await.unwrap();

        assert_eq!(rx.recv().await, None);
        assert_eq!(
            connection.send("late".to_string()).await,
            Err(ConnectionError::Closed)
        );
        assert_eq!(connection.close().await, Err(ConnectionError::Closed));
    }

    #[tokio::test]
    async fn test_send_fails_when_receiver_dropped() {
        let (mut connection, rx) = ChannelConnection::new();
        drop(rx);
        assert_eq!(
            connection.send("lost".to_string()).await,
            Err(ConnectionError::Closed)
        );
    }

    struct Stalled;

    #[async_trait]
    impl Connection for Stalled {
        async fn send(&mut self, _text: String) -> Result<(), ConnectionError> {
            std::future::pending::<()>().await;
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ConnectionError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_send_with_timeout_reports_stall() {
        let mut connection: BoxedConnection = Box::new(Stalled);
        let limit = Duration::from_millis(20);
        let result = send_with_timeout(&mut connection, "x".to_string(), limit).await;
        assert_eq!(result, Err(ConnectionError::Timeout(limit)));
    }
}
