use crate::server::ApiState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};

pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(|socket| websocket_connection(socket, state))
}

/// Pushes each new snapshot to the client as JSON text; the engine
/// publishes one per tick, so the stream cadence matches the tick.
async fn websocket_connection(mut socket: WebSocket, mut state: ApiState) {
    // Send the current snapshot immediately if one exists.
    let current = state.snapshot_rx.borrow().clone();
    if let Some(snapshot) = current {
        let json = serde_json::to_string(&snapshot).unwrap_or_default();
        if socket.send(Message::Text(json)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            changed = state.snapshot_rx.changed() => {
                if changed.is_err() {
                    break; // engine gone
                }
                let snapshot = state.snapshot_rx.borrow_and_update().clone();
                if let Some(snapshot) = snapshot {
                    let json = serde_json::to_string(&snapshot).unwrap_or_default();
                    if socket.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    tracing::info!("Telemetry WebSocket connection closed");
}
