//! WebSocket transport for live recipients
//!
//! The sink half of each socket is registered with the hub; the stream half
//! stays here and is only watched for the client going away.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionError};
use crate::envelope::UserId;
use crate::http::AppState;
use crate::hub::HubHandle;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub user_id: UserId,
    pub lang: Option<String>,
}

/// Write half of an axum WebSocket
pub struct WebSocketConnection {
    sink: SplitSink<WebSocket, Message>,
    closed: bool,
}

impl WebSocketConnection {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sink,
            closed: false,
        }
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn send(&mut self, text: String) -> Result<(), ConnectionError> {
        if self.closed {
            return Err(ConnectionError::Closed);
        }
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        if self.closed {
            return Err(ConnectionError::Closed);
        }
        self.closed = true;
        // Peer may already be gone; the sink is released either way
        let _ = self.sink.send(Message::Close(None)).await;
        self.sink
            .close()
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }
}

/// `GET /ws?user_id=<id>&lang=<code>`
///
/// Authentication happens upstream; `user_id` is trusted here.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let language = params
        .lang
        .filter(|lang| !lang.is_empty())
        .unwrap_or_else(|| state.default_language.clone());
    let hub = state.hub.clone();

    ws.on_upgrade(move |socket| serve_socket(socket, hub, params.user_id, language))
}

async fn serve_socket(socket: WebSocket, hub: HubHandle, user_id: UserId, language: String) {
    let (sink, stream) = socket.split();
    let connection = Box::new(WebSocketConnection::new(sink));

    let connection_id = match hub.register(user_id, connection, language).await {
        Ok(connection_id) => connection_id,
        Err(rejected) => {
            warn!(user_id = user_id, "Hub not running, closing socket");
            let _ = rejected.into_connection().close().await;
            return;
        }
    };
    info!(user_id = user_id, connection_id = %connection_id, "WebSocket connected");

    wait_for_close(stream, user_id).await;

    if let Err(e) = hub.unregister_connection(user_id, connection_id).await {
        debug!(user_id = user_id, error = %e, "Unregister after disconnect skipped");
    }
    info!(user_id = user_id, connection_id = %connection_id, "WebSocket disconnected");
}

/// Inbound frames are ignored; returns when the client closes or errors
async fn wait_for_close(mut stream: SplitStream<WebSocket>, user_id: UserId) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(user_id = user_id, error = %e, "WebSocket read error");
                break;
            }
        }
    }
}
