//! `WS /v1/stream/{entry_id}` — a bi-directional feed of `CHANGE` events for
//! one entry, plus arbitrary user frames echoed back for liveness.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
    routing::get,
    Router,
};

use crate::api::AppState;
use crate::bus::Interest;
use crate::identity::EntryId;

pub fn routes() -> Router<AppState> {
    Router::new().route("/:entry_id", get(upgrade))
}

async fn upgrade(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, EntryId::from(entry_id)))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, entry_id: EntryId) {
    let (_subscriber_id, mut receiver) = state.bus.subscribe(Interest {
        entry_id: Some(entry_id),
        ..Interest::default()
    });

    loop {
        tokio::select! {
            delivery = receiver.recv() => {
                let Some(delivery) = delivery else { break };
                let Ok(payload) = serde_json::to_string(&delivery.event) else { continue };
                if socket.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            frame = socket.recv() => {
                match frame {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    state.bus.unsubscribe(_subscriber_id);
}
