//! Ordered teardown of a running hub
//!
//! 1. stop the bridge
//! 2. signal cancellation to the loop
//! 3. wait for the loop, bounded; it abandons any command in flight
//! 4. close every remaining connection
//! 5. release the input queue, closing connections of pending registrations
//!
//! Every step runs even when an earlier one failed; the first failure is
//! returned at the end.

use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::event_loop::StoppedLoop;
use super::state::HubState;
use crate::bridge::BridgeHandle;
use crate::connection::BoxedConnection;
use crate::envelope::UserId;
use crate::error::{HubError, Result};
use crate::metrics;

/// Background tasks of a started hub; taken exactly once by shutdown
pub(crate) struct RunningTasks {
    pub bridge: Option<BridgeHandle>,
    pub event_loop: JoinHandle<StoppedLoop>,
}

pub(crate) async fn shutdown(
    tasks: RunningTasks,
    state: &watch::Sender<HubState>,
    limit: Duration,
) -> Result<()> {
    info!("Shutting down notification hub...");
    let mut first_error: Option<HubError> = None;

    if let Some(bridge) = tasks.bridge {
        if let Err(e) = bridge.stop(limit).await {
            error!(error = %e, "Backbone bridge failed");
            first_error.get_or_insert(e);
        }
    }

    state.send_replace(HubState::Draining);

    let mut event_loop = tasks.event_loop;
    let stopped = match tokio::time::timeout(limit, &mut event_loop).await {
        Ok(Ok(stopped)) => Some(stopped),
        Ok(Err(e)) => {
            error!(error = %e, "Hub loop task failed");
            first_error.get_or_insert(HubError::Task(e.to_string()));
            None
        }
        Err(_) => {
            warn!(
                timeout_secs = limit.as_secs(),
                "Hub loop did not stop within timeout, aborting"
            );
            event_loop.abort();
            // Registry goes down with the task, its connections unclosed
            first_error.get_or_insert(HubError::Task(
                "hub loop aborted after shutdown timeout, connections dropped unclosed".to_string(),
            ));
            None
        }
    };

    state.send_replace(HubState::Stopped);

    if let Some(StoppedLoop {
        mut registry,
        retired,
        mut commands,
    }) = stopped
    {
        let mut remaining: Vec<(UserId, BoxedConnection)> = registry
            .drain()
            .map(|(user_id, entry)| (user_id, entry.connection))
            .collect();
        if !remaining.is_empty() {
            let closed = remaining.len();
            for result in close_all(&mut remaining, limit).await {
                if let Err(e) = result {
                    first_error.get_or_insert(e);
                }
            }
            info!(closed = closed, "Closed remaining connections");
        }

        // Already out of the registry or never in it, so failures are only logged
        let mut leftovers: Vec<(UserId, BoxedConnection)> = retired
            .into_iter()
            .map(|(user_id, entry)| (user_id, entry.connection))
            .collect();
        let retired_count = leftovers.len();

        commands.close();
        while let Ok(command) = commands.try_recv() {
            if let Some(pending) = command.into_connection() {
                leftovers.push(pending);
            }
        }
        if !leftovers.is_empty() {
            close_all(&mut leftovers, limit).await;
            debug!(
                retired = retired_count,
                pending = leftovers.len() - retired_count,
                "Closed connections outside the registry"
            );
        }
    }

    metrics::set_connected_clients(0);

    match first_error {
        Some(e) => {
            warn!(error = %e, "Notification hub stopped with errors");
            Err(e)
        }
        None => {
            info!("Notification hub stopped");
            Ok(())
        }
    }
}

/// Close concurrently, each bounded by `limit`
async fn close_all(
    connections: &mut [(UserId, BoxedConnection)],
    limit: Duration,
) -> Vec<Result<()>> {
    join_all(
        connections
            .iter_mut()
            .map(|(user_id, connection)| close_connection(*user_id, connection, limit)),
    )
    .await
}

async fn close_connection(
    user_id: UserId,
    connection: &mut BoxedConnection,
    limit: Duration,
) -> Result<()> {
    match tokio::time::timeout(limit, connection.close()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            warn!(user_id = user_id, error = %e, "Failed to close connection");
            Err(e.into())
        }
        Err(_) => {
            warn!(user_id = user_id, "Timed out closing connection");
            Err(HubError::Task(format!(
                "closing connection of user {} timed out",
                user_id
            )))
        }
    }
}
