use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Query,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use porch_notify::{Presence, PushEvent};

use crate::auth;
use crate::server::ApiState;

#[derive(Deserialize)]
pub struct WsQuery {
    token: String,
}

/// Messages the client may send over the socket. Same `{type, data}`
/// envelope as the server-to-client events.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
enum ClientEvent {
    GetNotifications {
        #[serde(default)]
        limit: Option<i64>,
        #[serde(default)]
        offset: Option<i64>,
    },
    MarkAsRead {
        notification_id: i64,
    },
    MarkAllAsRead,
    Ping,
}

/// The handshake authenticates with a `token` query parameter since browsers
/// cannot set headers on WebSocket upgrades.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    Extension(state): Extension<ApiState>,
) -> Response {
    let user_id = match auth::verify_token(&query.token, &state.ctx.config.server.jwt_secret) {
        Ok(id) => id,
        Err(_) => return StatusCode::UNAUTHORIZED.into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, user_id, state))
}

async fn handle_socket(socket: WebSocket, user_id: i64, state: ApiState) {
    tracing::info!("WebSocket connection established for user {}", user_id);

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<PushEvent>();

    let connection_id = state.presence.register(user_id, tx.clone()).await;

    // Seed the client with its current unread tally.
    if let Err(e) = state.notifier.emit_unread_count(user_id).await {
        tracing::warn!("Failed to send initial unread count to {}: {}", user_id, e);
    }

    // Forward pushed events to the wire.
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!("Failed to serialize push event: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    let event: ClientEvent = match serde_json::from_str(&text) {
                        Ok(e) => e,
                        Err(e) => {
                            tracing::debug!("Ignoring malformed client event: {}", e);
                            continue;
                        }
                    };
                    handle_client_event(&recv_state, user_id, &tx, event).await;
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!("WebSocket receive error for {}: {}", user_id, e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {}
        _ = &mut recv_task => {}
    }

    // Disconnect only drops presence; any writes already in flight finish on
    // their own tasks.
    state.presence.unregister(user_id, connection_id).await;
    tracing::info!("WebSocket connection closed for user {}", user_id);
}

async fn handle_client_event(
    state: &ApiState,
    user_id: i64,
    tx: &porch_notify::PushSender,
    event: ClientEvent,
) {
    match event {
        ClientEvent::GetNotifications { limit, offset } => {
            match state
                .notifier
                .list(user_id, limit.unwrap_or(50), offset.unwrap_or(0))
                .await
            {
                Ok(notifications) => {
                    let _ = tx.send(PushEvent::Notifications(notifications));
                }
                Err(e) => {
                    tracing::warn!("Failed to load notifications for {}: {}", user_id, e);
                }
            }
        }
        ClientEvent::MarkAsRead { notification_id } => {
            if let Err(e) = state.notifier.mark_read(user_id, notification_id).await {
                tracing::debug!("mark_as_read failed for {}: {}", user_id, e);
            }
        }
        ClientEvent::MarkAllAsRead => {
            if let Err(e) = state.notifier.mark_all_read(user_id).await {
                tracing::warn!("mark_all_as_read failed for {}: {}", user_id, e);
            }
        }
        ClientEvent::Ping => {
            let _ = tx.send(PushEvent::Pong);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_envelope_parses_every_event_type() {
        let cases = [
            r#"{"type":"get_notifications","data":{}}"#,
            r#"{"type":"get_notifications","data":{"limit":10,"offset":0}}"#,
            r#"{"type":"mark_as_read","data":{"notification_id":5}}"#,
            r#"{"type":"mark_all_as_read"}"#,
            r#"{"type":"ping"}"#,
        ];
        for case in cases {
            assert!(serde_json::from_str::<ClientEvent>(case).is_ok(), "{}", case);
        }
    }

    #[test]
    fn unknown_event_types_are_rejected() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"type":"subscribe"}"#).is_err());
    }
}
