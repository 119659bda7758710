use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Query,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::{
    hub::{normalize_room, ChatHub, Draft},
    state::{Attachment, ChatMessage, SenderRole},
};

#[derive(Deserialize)]
struct WsQuery {
    room: Option<String>,
}

/// Frames pushed to the client.
#[derive(Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
enum ServerFrame {
    History(Vec<ChatMessage>),
    Message(ChatMessage),
}

/// Frames accepted from the client. Anything else is ignored.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ClientFrame {
    Message {
        id: Option<String>,
        #[serde(default)]
        sender: SenderRole,
        room: Option<String>,
        #[serde(default)]
        text: String,
        #[serde(default)]
        attachments: Vec<Attachment>,
    },
}

pub fn router() -> Router {
    Router::new().route("/chat", get(ws_handler))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(q): Query<WsQuery>,
    Extension(hub): Extension<Arc<ChatHub>>,
) -> impl IntoResponse {
    // no handshake room is tolerated; such a connection can still submit
    // to rooms named per frame, it just has nothing to listen on
    let room = q.room.map(|r| normalize_room(&r)).filter(|r| !r.is_empty());
    ws.on_upgrade(move |socket| client_ws(socket, room, hub))
}

/* ---------------- per connection ---------------- */
async fn client_ws(socket: WebSocket, room: Option<String>, hub: Arc<ChatHub>) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let forward = match room.clone() {
        Some(room) => {
            let (mut rx, replay) = hub.subscribe(&room).await;
            if send_frame(&mut ws_tx, &ServerFrame::History(replay)).await.is_err() {
                hub.prune(&room).await;
                return;
            }
            Some(tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(msg) => {
                            if send_frame(&mut ws_tx, &ServerFrame::Message(msg)).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            debug!(dropped = n, "ws subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }))
        }
        None => None,
    };

    while let Some(Ok(frame)) = ws_rx.next().await {
        let Message::Text(raw) = frame else { continue };
        let Ok(ClientFrame::Message { id, sender, room: frame_room, text, attachments }) =
            serde_json::from_str(&raw)
        else {
            continue; // malformed frames never close the connection
        };

        let target = frame_room.or_else(|| room.clone()).unwrap_or_default();
        // invalid or oversized submissions are dropped silently
        let _ = hub
            .accept(Draft { id, room: target, sender, text, attachments })
            .await;
    }

    /* socket closed: tear down the sink, then let the hub reap the room */
    if let Some(task) = forward {
        task.abort();
        let _ = task.await;
    }
    if let Some(room) = room {
        hub.prune(&room).await;
    }
}

async fn send_frame(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    frame: &ServerFrame,
) -> Result<(), axum::Error> {
    let payload = serde_json::to_string(frame).map_err(axum::Error::new)?;
    ws_tx.send(Message::Text(payload)).await
}
