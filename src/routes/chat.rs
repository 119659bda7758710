use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    extract::{Extension, Json, Query},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Router,
};
use futures_util::{stream, Stream, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

use crate::{
    error::{bad, AppResult},
    hub::{ChatHub, Draft},
    state::{ChatMessage, SenderRole},
};

const KEEPALIVE: Duration = Duration::from_secs(15);

pub fn router() -> Router {
    Router::new()
        .route("/chat/send",    post(send))
        .route("/chat/stream",  get(stream_room))
        .route("/chat/history", get(history))
}

/* ---------------- submit ---------------- */
#[derive(Deserialize)]
struct SendBody {
    room: Option<String>,
    #[serde(default)]
    sender: SenderRole,
    text: Option<String>,
}

async fn send(
    Extension(hub): Extension<Arc<ChatHub>>,
    Json(body): Json<SendBody>,
) -> AppResult<Json<ChatMessage>> {
    let room = body.room.ok_or_else(|| bad("room is required"))?;
    let text = body.text.ok_or_else(|| bad("text is required"))?;

    let msg = hub
        .accept(Draft {
            id: None,
            room,
            sender: body.sender,
            text,
            attachments: Vec::new(),
        })
        .await
        .map_err(bad)?;

    Ok(Json(msg))
}

/* ---------------- history ---------------- */
#[derive(Deserialize)]
struct HistoryQuery {
    room: Option<String>,
    limit: Option<usize>,
}

async fn history(
    Extension(hub): Extension<Arc<ChatHub>>,
    Query(q): Query<HistoryQuery>,
) -> AppResult<Json<Vec<ChatMessage>>> {
    let room = q
        .room
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| bad("room query parameter is required"))?;
    let limit = q.limit.unwrap_or(crate::hub::REPLAY_DEPTH);
    Ok(Json(hub.tail(&room, limit).await))
}

/* ---------------- stream ---------------- */
#[derive(Deserialize)]
struct StreamQuery {
    room: Option<String>,
}

async fn stream_room(
    Extension(hub): Extension<Arc<ChatHub>>,
    Query(q): Query<StreamQuery>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let room = q
        .room
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| bad("room query parameter is required"))?;

    // replay tail and receiver come from one hub snapshot, so chaining the
    // two streams cannot duplicate or drop a message
    let (rx, replay) = hub.subscribe(&room).await;

    let initial = stream::iter(replay.into_iter().filter_map(to_event));
    let live = BroadcastStream::new(rx).filter_map(|item| async move {
        match item {
            Ok(msg) => to_event(msg),
            Err(err) => {
                warn!(error = %err, "sse subscriber lagged");
                None
            }
        }
    });

    Ok(Sse::new(initial.chain(live).map(Ok::<Event, Infallible>))
        .keep_alive(KeepAlive::new().interval(KEEPALIVE)))
}

fn to_event(msg: ChatMessage) -> Option<Event> {
    let data = serde_json::to_string(&msg).ok()?;
    Some(Event::default().data(data))
}
