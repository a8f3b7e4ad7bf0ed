//! Notification hub
//!
//! [`Hub`] owns the background tasks (hub loop and backbone bridge) and the
//! shutdown controller. [`HubHandle`] is the cheap, cloneable front door
//! used by transports and application code: every call becomes a command
//! on the loop's input queue.

pub(crate) mod command;
mod event_loop;
pub(crate) mod registry;
mod shutdown;
pub(crate) mod state;

pub use self::event_loop::WELCOME_KEY;
pub use self::registry::ConnectionId;
pub use self::state::HubState;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

use self::command::Command;
use self::event_loop::HubLoop;
use self::shutdown::RunningTasks;
use crate::backbone::{Backbone, Subscription};
use crate::bridge;
use crate::config::HubConfig;
use crate::connection::BoxedConnection;
use crate::envelope::{Envelope, UserId};
use crate::error::{HubError, Result};
use crate::global;
use crate::localizer::Localizer;

/// A running notification hub
pub struct Hub {
    handle: HubHandle,
    state: watch::Sender<HubState>,
    tasks: Mutex<Option<RunningTasks>>,
    shutdown_timeout: Duration,
}

pub struct HubBuilder {
    config: HubConfig,
    backbone: Option<Arc<dyn Backbone>>,
    localizer: Option<Arc<dyn Localizer>>,
    subscription: Subscription,
}

impl Hub {
    pub fn builder(config: HubConfig) -> HubBuilder {
        HubBuilder {
            config,
            backbone: None,
            localizer: None,
            subscription: Subscription::defaults(),
        }
    }

    pub fn handle(&self) -> HubHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> HubState {
        *self.state.borrow()
    }

    /// Tear the hub down; later calls return `Ok(())` without doing anything
    ///
    /// Concurrent callers wait for the first teardown to finish.
    pub async fn close(&self) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        let Some(running) = tasks.take() else {
            debug!("Notification hub already closed");
            return Ok(());
        };

        let result = shutdown::shutdown(running, &self.state, self.shutdown_timeout).await;
        global::release(self);
        result
    }
}

impl HubBuilder {
    /// Subscribe to `backbone` and forward its messages to live recipients
    pub fn with_backbone(mut self, backbone: Arc<dyn Backbone>) -> Self {
        self.backbone = Some(backbone);
        self
    }

    pub fn with_localizer(mut self, localizer: Arc<dyn Localizer>) -> Self {
        self.localizer = Some(localizer);
        self
    }

    pub fn with_subscription(mut self, subscription: Subscription) -> Self {
        self.subscription = subscription;
        self
    }

    /// Subscribe to the backbone, then spawn the hub loop and bridge
    ///
    /// A failed subscription leaves nothing running.
    pub async fn start(self) -> Result<Hub> {
        let stream = match &self.backbone {
            Some(backbone) if !self.subscription.is_empty() => {
                Some(backbone.subscribe(&self.subscription).await?)
            }
            _ => None,
        };

        let (commands_tx, commands_rx) = mpsc::channel(self.config.queue_capacity.max(1));
        let (state_tx, state_rx) = watch::channel(HubState::Running);

        let hub_loop = HubLoop::new(
            commands_rx,
            state_rx.clone(),
            self.localizer,
            self.config.fallback_language.clone(),
            self.config.write_timeout(),
        );
        let event_loop = tokio::spawn(hub_loop.run());
        let bridge = stream.map(|stream| bridge::spawn(stream, commands_tx.clone(), state_rx.clone()));

        info!(
            bridge = bridge.is_some(),
            topics = ?self.subscription.topics,
            patterns = ?self.subscription.patterns,
            queue_capacity = self.config.queue_capacity,
            "Notification hub started"
        );

        Ok(Hub {
            handle: HubHandle {
                commands: commands_tx,
                state: state_rx,
            },
            state: state_tx,
            tasks: Mutex::new(Some(RunningTasks { bridge, event_loop })),
            shutdown_timeout: self.config.shutdown_timeout(),
        })
    }
}

/// Cloneable handle for talking to a running hub
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<HubState>,
}

impl HubHandle {
    pub fn state(&self) -> HubState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == HubState::Running
    }

    /// Register a live connection for `user_id`
    ///
    /// A newer registration for the same identity replaces (and closes) the
    /// older one. When the hub is not running the connection is handed back
    /// inside the error so the caller can close it.
    pub async fn register(
        &self,
        user_id: UserId,
        connection: BoxedConnection,
        language: impl Into<String>,
    ) -> std::result::Result<ConnectionId, RegisterRejected> {
        let connection_id = Uuid::new_v4();
        let language = language.into();

        self.enqueue(connection, move |connection| Command::Register {
            user_id,
            connection_id,
            connection,
            language,
        })
        .await
        .map(|()| connection_id)
        .map_err(|connection| {
            debug!(user_id = user_id, "Registration rejected, hub not running");
            RegisterRejected {
                user_id,
                connection,
            }
        })
    }

    /// Remove and close whatever connection `user_id` has
    pub async fn unregister(&self, user_id: UserId) -> Result<()> {
        self.enqueue(user_id, |user_id| Command::Unregister { user_id })
            .await
            .map_err(|_| HubError::ShuttingDown)
    }

    /// Remove `user_id` only if `connection_id` is still its registration
    pub async fn unregister_connection(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> Result<()> {
        self.enqueue(user_id, |user_id| Command::UnregisterConnection {
            user_id,
            connection_id,
        })
        .await
        .map_err(|_| HubError::ShuttingDown)
    }

    /// Deliver directly, bypassing the backbone
    pub async fn deliver(&self, envelope: Envelope) -> Result<()> {
        self.enqueue(envelope, Command::Deliver)
            .await
            .map_err(|_| HubError::ShuttingDown)
    }

    pub async fn send_localized_to_one(
        &self,
        user_id: UserId,
        key: impl Into<String>,
        data: Value,
    ) -> Result<()> {
        let key = key.into();
        self.enqueue((key, data), |(key, data)| Command::Localized {
            target: Some(user_id),
            key,
            data,
        })
        .await
        .map_err(|_| HubError::ShuttingDown)
    }

    /// Resolve `key` in each connected recipient's own language
    pub async fn broadcast_localized(&self, key: impl Into<String>, data: Value) -> Result<()> {
        let key = key.into();
        self.enqueue((key, data), |(key, data)| Command::Localized {
            target: None,
            key,
            data,
        })
        .await
        .map_err(|_| HubError::ShuttingDown)
    }

    /// Number of registered recipients; zero once the hub has stopped
    pub async fn registered_count(&self) -> usize {
        self.connected_user_ids().await.len()
    }

    pub async fn connected_user_ids(&self) -> Vec<UserId> {
        let (responder, response) = oneshot::channel();
        if self
            .enqueue(responder, |responder| Command::ConnectedUsers { responder })
            .await
            .is_err()
        {
            return Vec::new();
        }

        // Loop stopped before answering
        response.await.unwrap_or_default()
    }

    /// Put a command on the loop queue unless the hub stops first
    ///
    /// On rejection the value is handed back untouched.
    async fn enqueue<T>(
        &self,
        value: T,
        into_command: impl FnOnce(T) -> Command,
    ) -> std::result::Result<(), T> {
        let mut lifecycle = self.state.clone();

        tokio::select! {
            biased;

            _ = state::cancelled(&mut lifecycle) => Err(value),
            permit = self.commands.reserve() => match permit {
                Ok(permit) => {
                    permit.send(into_command(value));
                    Ok(())
                }
                Err(_) => Err(value),
            },
        }
    }
}

/// Returned by [`HubHandle::register`] when the hub is not running
pub struct RegisterRejected {
    pub user_id: UserId,
    pub connection: BoxedConnection,
}

impl RegisterRejected {
    pub fn into_connection(self) -> BoxedConnection {
        self.connection
    }
}

impl fmt::Debug for RegisterRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRejected")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for RegisterRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hub is not running, registration of user {} rejected", self.user_id)
    }
}

impl std::error::Error for RegisterRejected {}

impl From<RegisterRejected> for HubError {
    fn from(_: RegisterRejected) -> Self {
        HubError::ShuttingDown
    }
}
