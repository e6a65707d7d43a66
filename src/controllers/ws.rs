//! ws.rs
//!
//! Live notifications over a WebSocket, authenticated by the session at
//! upgrade time. Incoming frames are read only to notice the close.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::middleware::AuthUser;
use crate::notifications::Notification;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/ws", get(ws_handler))
}

/// GET /ws
async fn ws_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, user.user_id, socket))
}

async fn handle_socket(state: Arc<AppState>, user_id: Uuid, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    match serde_json::to_string(&Notification::welcome(user_id)) {
        Ok(welcome) => {
            let _ = tx.send(welcome);
        }
        Err(e) => warn!("Failed to serialize welcome notification: {}", e),
    }

    let connection = state.notifications.register(user_id, tx).await;

    let mut forward = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sink.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    let mut read = tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    // Whichever side ends first takes the other down
    tokio::select! {
        _ = &mut forward => read.abort(),
        _ = &mut read => forward.abort(),
    }

    state.notifications.unregister(connection).await;
    debug!(%user_id, "WebSocket closed");
}
