//! Backbone bridge
//!
//! Reads the backbone subscription stream, decodes each payload into an
//! [`Envelope`] and hands it to the hub loop. It never touches the registry.

use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backbone::{BackboneMessage, MessageStream};
use crate::envelope::Envelope;
use crate::error::{HubError, Result};
use crate::hub::command::Command;
use crate::hub::state::{self, HubState};
use crate::metrics;

pub(crate) struct BridgeHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub(crate) fn spawn(
    stream: MessageStream,
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<HubState>,
) -> BridgeHandle {
    let (stop, stop_rx) = watch::channel(false);
    let task = tokio::spawn(run(stream, commands, state, stop_rx));
    BridgeHandle { stop, task }
}

impl BridgeHandle {
    /// Stop reading from the backbone and wait for the task, bounded by `limit`
    ///
    /// The subscription is released when the task drops its stream. A
    /// timeout is logged and the task aborted; only a panic is an error.
    pub async fn stop(self, limit: Duration) -> Result<()> {
        self.stop.send_replace(true);

        let mut task = self.task;
        match tokio::time::timeout(limit, &mut task).await {
            Ok(Ok(())) => {
                debug!("Backbone bridge shut down gracefully");
                Ok(())
            }
            Ok(Err(e)) if e.is_panic() => Err(HubError::Task(format!("bridge panicked: {}", e))),
            Ok(Err(_)) => Ok(()),
            Err(_) => {
                warn!(
                    timeout_ms = limit.as_millis() as u64,
                    "Backbone bridge did not stop within timeout, aborting"
                );
                task.abort();
                Ok(())
            }
        }
    }
}

async fn run(
    mut stream: MessageStream,
    commands: mpsc::Sender<Command>,
    mut state: watch::Receiver<HubState>,
    mut stop: watch::Receiver<bool>,
) {
    info!("Backbone bridge started");

    loop {
        let message = tokio::select! {
            biased;

            _ = state::stop_requested(&mut stop) => break,
            _ = state::cancelled(&mut state) => break,
            message = stream.next() => match message {
                Some(message) => message,
                None => {
                    warn!("Backbone subscription stream ended");
                    break;
                }
            },
        };

        let envelope = match decode(&message) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(
                    topic = %message.topic,
                    error = %e,
                    "Dropping undecodable backbone message"
                );
                metrics::observe_bridge_message("decode_failed");
                continue;
            }
        };

        // A full queue must not outlive shutdown
        let permit = tokio::select! {
            biased;

            _ = state::stop_requested(&mut stop) => break,
            _ = state::cancelled(&mut state) => break,
            permit = commands.reserve() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        debug!(topic = %message.topic, kind = %envelope.kind, "Forwarding backbone message");
        permit.send(Command::Deliver(envelope));
        metrics::observe_bridge_message("forwarded");
    }

    info!("Backbone bridge stopped");
}

/// Decode a payload, recording the topic it arrived on when the sender left it empty
fn decode(message: &BackboneMessage) -> std::result::Result<Envelope, serde_json::Error> {
    let mut envelope = Envelope::from_json(&message.payload)?;
    if envelope.topic.is_empty() {
        envelope.topic = message.topic.clone();
    }
    Ok(envelope)
}
