//! Requests accepted by the hub loop
//!
//! Every interaction with the registry is a command on the loop's single
//! input queue, so registrations, removals and deliveries are applied in
//! arrival order.

use serde_json::Value;
use tokio::sync::oneshot;

use super::registry::ConnectionId;
use crate::connection::BoxedConnection;
use crate::envelope::{Envelope, UserId};

pub(crate) enum Command {
    Register {
        user_id: UserId,
        connection_id: ConnectionId,
        connection: BoxedConnection,
        language: String,
    },

    /// Remove whatever connection `user_id` currently has
    Unregister { user_id: UserId },

    /// Remove `user_id` only if it is still this registration
    UnregisterConnection {
        user_id: UserId,
        connection_id: ConnectionId,
    },

    Deliver(Envelope),

    /// Resolve `key` in each recipient's language; `None` targets everyone
    Localized {
        target: Option<UserId>,
        key: String,
        data: Value,
    },

    ConnectedUsers {
        responder: oneshot::Sender<Vec<UserId>>,
    },
}

impl Command {
    /// Connection carried by a register command still waiting in the queue
    pub fn into_connection(self) -> Option<(UserId, BoxedConnection)> {
        match self {
            Command::Register {
                user_id, connection, ..
            } => Some((user_id, connection)),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Register { .. } => "register",
            Command::Unregister { .. } => "unregister",
            Command::UnregisterConnection { .. } => "unregister_connection",
            Command::Deliver(_) => "deliver",
            Command::Localized { .. } => "localized",
            Command::ConnectedUsers { .. } => "connected_users",
        }
    }
}
