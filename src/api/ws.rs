//! WebSocket fan-out.
//!
//! Each connection subscribes to the event bus and receives every envelope
//! as a JSON text frame. There is no backfill on reconnect; clients
//! reconcile through REST.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use super::state::AppState;

pub async fn handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve(socket, state))
}

async fn serve(mut socket: WebSocket, state: AppState) {
    let mut events = state.events.subscribe();
    debug!("websocket subscriber connected");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(envelope) => {
                    let Ok(text) = serde_json::to_string(&envelope) else {
                        continue;
                    };
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                // A slow consumer dropped frames; keep streaming from here.
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Inbound frames carry no protocol; pings are answered by axum.
                Some(Ok(_)) => {}
            },
        }
    }
    debug!("websocket subscriber disconnected");
}
