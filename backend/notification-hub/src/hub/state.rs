use std::fmt;

use serde::Serialize;
use tokio::sync::watch;

/// Lifecycle of the hub loop
///
/// `Running -> Draining` when shutdown is signalled, `Draining -> Stopped`
/// once the loop function has returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HubState {
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for HubState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubState::Running => write!(f, "running"),
            HubState::Draining => write!(f, "draining"),
            HubState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Resolves once the hub has left `Running` (or the state sender is gone)
pub(crate) async fn cancelled(state: &mut watch::Receiver<HubState>) {
    loop {
        if *state.borrow_and_update() != HubState::Running {
            return;
        }
        if state.changed().await.is_err() {
            return;
        }
    }
}

/// Resolves once `stop` has been set to true (or its sender is gone)
pub(crate) async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_state_display() {
        assert_eq!(HubState::Running.to_string(), "running");
        assert_eq!(HubState::Draining.to_string(), "draining");
        assert_eq!(HubState::Stopped.to_string(), "stopped");
        assert_eq!(serde_json::to_string(&HubState::Draining).unwrap(), "\"draining\"");
    }

    #[tokio::test]
    async fn test_cancelled_waits_for_transition() {
        let (tx, mut rx) = watch::channel(HubState::Running);

        let pending = tokio::time::timeout(Duration::from_millis(20), cancelled(&mut rx)).await;
        assert!(pending.is_err());

        tx.send_replace(HubState::Draining);
        tokio::time::timeout(Duration::from_secs(1), cancelled(&mut rx))
            .await
            .expect("cancellation should be observed");
    }

    #[tokio::test]
    async fn test_cancelled_when_sender_dropped() {
        let (tx, mut rx) = watch::channel(HubState::Running);
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), cancelled(&mut rx))
            .await
            .expect("dropped sender counts as cancellation");
    }

    #[tokio::test]
    async fn test_stop_requested() {
        let (tx, mut rx) = watch::channel(false);
        tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(1), stop_requested(&mut rx))
            .await
            .expect("stop should be observed");
    }
}
