//! The hub loop: sole owner of the registry
//!
//! ```text
//! HubHandle ──┐
//!             ├──> mpsc<Command> ──> HubLoop ──> Registry ──> Connection::send
//! Bridge ─────┘                        ▲
//!                                      └── watch<HubState> (cancellation)
//! ```

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace, warn};

use super::command::Command;
use super::registry::{ConnectionEntry, ConnectionId, Registry};
use super::state::{self, HubState};
use crate::connection::{send_with_timeout, BoxedConnection, ConnectionError};
use crate::envelope::{kinds, Envelope, UserId};
use crate::localizer::{localize, Localizer};
use crate::metrics;
use crate::topics;

/// Message key used for the greeting sent on registration
pub const WELCOME_KEY: &str = "notifications.welcome";

pub(crate) struct HubLoop {
    registry: Registry,
    /// Left the registry, not yet closed
    retired: Vec<(UserId, ConnectionEntry)>,
    commands: mpsc::Receiver<Command>,
    state: watch::Receiver<HubState>,
    localizer: Option<Arc<dyn Localizer>>,
    fallback_language: String,
    write_timeout: Duration,
}

/// What the loop hands back to the shutdown controller
pub(crate) struct StoppedLoop {
    pub registry: Registry,
    pub retired: Vec<(UserId, ConnectionEntry)>,
    pub commands: mpsc::Receiver<Command>,
}

impl HubLoop {
    pub fn new(
        commands: mpsc::Receiver<Command>,
        state: watch::Receiver<HubState>,
        localizer: Option<Arc<dyn Localizer>>,
        fallback_language: String,
        write_timeout: Duration,
    ) -> Self {
        Self {
            registry: Registry::new(),
            retired: Vec::new(),
            commands,
            state,
            localizer,
            fallback_language,
            write_timeout,
        }
    }

    /// Process commands until cancellation is observed
    ///
    /// Cancellation is checked first on every iteration, so once the hub
    /// leaves `Running` no further command is applied. A command still in
    /// flight is abandoned, leaving its connections in the registry or the
    /// retired list for the shutdown controller to close.
    pub async fn run(mut self) -> StoppedLoop {
        info!("Hub loop started");

        loop {
            tokio::select! {
                biased;

                _ = state::cancelled(&mut self.state) => {
                    debug!("Hub loop observed cancellation");
                    break;
                }

                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_until_cancelled(command).await {
                            break;
                        }
                    }
                    None => {
                        debug!("Hub command queue closed");
                        break;
                    }
                },
            }
        }

        info!(
            registered = self.registry.len(),
            retired = self.retired.len(),
            "Hub loop stopped"
        );
        StoppedLoop {
            registry: self.registry,
            retired: self.retired,
            commands: self.commands,
        }
    }

    /// Returns false when cancellation interrupted the command
    ///
    /// The command is polled first, so a registration is always in the
    /// registry before it can be abandoned.
    async fn handle_until_cancelled(&mut self, command: Command) -> bool {
        let mut lifecycle = self.state.clone();

        tokio::select! {
            biased;

            _ = self.handle(command) => true,

            _ = state::cancelled(&mut lifecycle) => {
                warn!("Hub loop cancelled with a command in flight");
                false
            }
        }
    }

    async fn handle(&mut self, command: Command) {
        trace!(command = command.name(), "Handling hub command");

        match command {
            Command::Register {
                user_id,
                connection_id,
                connection,
                language,
            } => {
                self.register(user_id, connection_id, connection, language)
                    .await
            }
            Command::Unregister { user_id } => self.unregister(user_id, None).await,
            Command::UnregisterConnection {
                user_id,
                connection_id,
            } => self.unregister(user_id, Some(connection_id)).await,
            Command::Deliver(envelope) => self.deliver(envelope).await,
            Command::Localized { target, key, data } => match target {
                Some(user_id) => self.localized_to_one(user_id, &key, &data).await,
                None => self.localized_broadcast(&key, &data).await,
            },
            Command::ConnectedUsers { responder } => {
                // Caller may have given up waiting
                let _ = responder.send(self.registry.user_ids());
            }
        }
    }

    async fn register(
        &mut self,
        user_id: UserId,
        connection_id: ConnectionId,
        connection: BoxedConnection,
        language: String,
    ) {
        let entry = ConnectionEntry {
            connection_id,
            connection,
            language: language.clone(),
            connected_at: Utc::now(),
        };

        match self.registry.insert(user_id, entry) {
            Some(previous) => {
                warn!(
                    user_id = user_id,
                    previous_connection = %previous.connection_id,
                    connection_id = %connection_id,
                    "Recipient registered again, closing previous connection"
                );
                self.retired.push((user_id, previous));
                metrics::observe_registration("replaced");
            }
            None => metrics::observe_registration("accepted"),
        }
        metrics::set_connected_clients(self.registry.len());

        info!(
            user_id = user_id,
            connection_id = %connection_id,
            language = %language,
            total = self.registry.len(),
            "Recipient registered"
        );
        self.close_retired().await;

        let message = self.resolve(&language, WELCOME_KEY, &json!({ "user_id": user_id }));
        let welcome = Envelope::targeted(
            user_id,
            kinds::WELCOME,
            json!({ "message": message, "language": language }),
        )
        .with_topic(topics::DIRECT);
        self.deliver(welcome).await;
    }

    async fn unregister(&mut self, user_id: UserId, connection_id: Option<ConnectionId>) {
        let removed = match connection_id {
            Some(connection_id) => self.registry.remove_if(user_id, connection_id),
            None => self.registry.remove(user_id),
        };

        let Some(entry) = removed else {
            debug!(user_id = user_id, "Nothing to unregister");
            return;
        };

        metrics::set_connected_clients(self.registry.len());
        info!(
            user_id = user_id,
            connection_id = %entry.connection_id,
            connected_secs = (Utc::now() - entry.connected_at).num_seconds(),
            total = self.registry.len(),
            "Recipient unregistered"
        );

        self.retired.push((user_id, entry));
        self.close_retired().await;
    }

    async fn deliver(&mut self, envelope: Envelope) {
        let text = match envelope.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!(kind = %envelope.kind, error = %e, "Failed to encode envelope");
                return;
            }
        };

        match envelope.target {
            Some(user_id) => {
                if !self.registry.contains(user_id) {
                    debug!(
                        user_id = user_id,
                        kind = %envelope.kind,
                        "Target not connected, dropping envelope"
                    );
                    return;
                }
                self.write_all("targeted", HashMap::from([(user_id, text)]))
                    .await;
            }
            None => {
                let texts = self
                    .registry
                    .user_ids()
                    .into_iter()
                    .map(|user_id| (user_id, text.clone()))
                    .collect();
                self.write_all("broadcast", texts).await;
            }
        }
    }

    async fn localized_to_one(&mut self, user_id: UserId, key: &str, data: &Value) {
        let Some(language) = self.registry.language(user_id).map(str::to_owned) else {
            debug!(user_id = user_id, key = %key, "Target not connected, dropping localized send");
            return;
        };

        let message = self.resolve(&language, key, data);
        let envelope = Envelope::targeted(
            user_id,
            kinds::LOCALIZED_NOTIFICATION,
            localized_payload(message, key, data),
        )
        .with_topic(topics::DIRECT);
        self.deliver(envelope).await;
    }

    /// Resolve once per distinct language, then write each recipient its own text
    async fn localized_broadcast(&mut self, key: &str, data: &Value) {
        let mut by_language: HashMap<String, String> = HashMap::new();
        let mut texts = HashMap::with_capacity(self.registry.len());

        for (user_id, language) in self.registry.languages() {
            let text = match by_language.entry(language) {
                Entry::Occupied(cached) => cached.get().clone(),
                Entry::Vacant(slot) => {
                    let message = self.resolve(slot.key(), key, data);
                    let envelope = Envelope::new(
                        kinds::LOCALIZED_BROADCAST,
                        localized_payload(message, key, data),
                    )
                    .with_topic(topics::DIRECT);
                    match envelope.to_json() {
                        Ok(text) => slot.insert(text).clone(),
                        Err(e) => {
                            error!(key = %key, error = %e, "Failed to encode localized broadcast");
                            return;
                        }
                    }
                }
            };
            texts.insert(user_id, text);
        }

        debug!(
            key = %key,
            recipients = texts.len(),
            languages = by_language.len(),
            "Broadcasting localized message"
        );
        self.write_all("localized_broadcast", texts).await;
    }

    /// Write every text to its recipient concurrently, then evict failures
    async fn write_all(&mut self, scope: &'static str, mut texts: HashMap<UserId, String>) {
        let limit = self.write_timeout;

        let writes = self
            .registry
            .iter_mut()
            .filter_map(|(user_id, entry)| {
                let text = texts.remove(user_id)?;
                let user_id = *user_id;
                Some(async move {
                    let result = send_with_timeout(&mut entry.connection, text, limit).await;
                    (user_id, result)
                })
            })
            .collect::<Vec<_>>();

        let mut failed = Vec::new();
        for (user_id, result) in join_all(writes).await {
            metrics::observe_delivery(scope, result.is_ok());
            if let Err(e) = result {
                failed.push((user_id, e));
            }
        }

        if failed.is_empty() {
            return;
        }
        for (user_id, error) in failed {
            self.evict(user_id, error);
        }
        metrics::set_connected_clients(self.registry.len());
        self.close_retired().await;
    }

    fn evict(&mut self, user_id: UserId, error: ConnectionError) {
        let Some(entry) = self.registry.remove(user_id) else {
            return;
        };

        warn!(
            user_id = user_id,
            connection_id = %entry.connection_id,
            error = %error,
            "Write failed, evicting connection"
        );
        metrics::observe_eviction();
        self.retired.push((user_id, entry));
    }

    /// Close everything that left the registry, all under one write timeout
    async fn close_retired(&mut self) {
        if self.retired.is_empty() {
            return;
        }

        let limit = self.write_timeout;
        let closes = self
            .retired
            .iter_mut()
            .map(|(user_id, entry)| close_entry(*user_id, entry, limit));
        join_all(closes).await;
        self.retired.clear();
    }

    fn resolve(&self, language: &str, key: &str, data: &Value) -> String {
        localize(
            self.localizer.as_deref(),
            &self.fallback_language,
            language,
            key,
            data,
        )
    }
}

/// Close a connection that is leaving the registry; failures are only logged
async fn close_entry(user_id: UserId, entry: &mut ConnectionEntry, limit: Duration) {
    match tokio::time::timeout(limit, entry.connection.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            debug!(user_id = user_id, error = %e, "Connection already closed");
        }
        Err(_) => {
            warn!(user_id = user_id, "Timed out closing connection");
        }
    }
}

fn localized_payload(message: String, key: &str, data: &Value) -> Value {
    json!({
        "message": message,
        "key": key,
        "data": data,
    })
}
