use std::sync::Arc;

use axum::{
    extract::{Extension, Json},
    routing::post,
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::{bad, AppResult},
    push::{PushKeys, PushStore, PushSubscription},
};

pub fn router() -> Router {
    Router::new()
        .route("/push/subscribe",   post(subscribe))
        .route("/push/unsubscribe", post(unsubscribe))
}

/* ---------------- subscribe ---------------- */
#[derive(Deserialize)]
struct SubscribeBody {
    topic: Option<String>,
    subscription: Option<RawSubscription>,
}

#[derive(Deserialize)]
struct RawSubscription {
    endpoint: Option<String>,
    keys: Option<RawKeys>,
}

#[derive(Deserialize)]
struct RawKeys {
    p256dh: Option<String>,
    auth: Option<String>,
}

async fn subscribe(
    Extension(store): Extension<Arc<dyn PushStore>>,
    Json(body): Json<SubscribeBody>,
) -> AppResult<Json<Value>> {
    let topic = body
        .topic
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| bad("topic is required"))?;
    let raw = body.subscription.ok_or_else(|| bad("subscription is required"))?;
    let endpoint = raw
        .endpoint
        .filter(|e| !e.is_empty())
        .ok_or_else(|| bad("subscription endpoint is required"))?;
    let keys = raw.keys.ok_or_else(|| bad("subscription keys are required"))?;
    let (p256dh, auth) = match (keys.p256dh, keys.auth) {
        (Some(p), Some(a)) => (p, a),
        _ => return Err(bad("subscription keys are required")),
    };

    store
        .upsert(PushSubscription {
            endpoint,
            topic,
            keys: PushKeys { p256dh, auth },
            created_at: Utc::now(),
        })
        .await;

    Ok(Json(json!({ "ok": true })))
}

/* ---------------- unsubscribe -------------- */
#[derive(Deserialize)]
struct UnsubscribeBody {
    endpoint: Option<String>,
}

async fn unsubscribe(
    Extension(store): Extension<Arc<dyn PushStore>>,
    Json(body): Json<UnsubscribeBody>,
) -> AppResult<Json<Value>> {
    let endpoint = body
        .endpoint
        .filter(|e| !e.is_empty())
        .ok_or_else(|| bad("endpoint is required"))?;

    store.remove(&endpoint).await;
    Ok(Json(json!({ "ok": true })))
}
