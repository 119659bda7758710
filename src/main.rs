mod error;
mod hub;
mod push;
mod routes;
mod state;

use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, Extension, Router};
use tower_http::limit::RequestBodyLimitLayer;

use crate::error::AppResult;
use crate::hub::ChatHub;
use crate::push::{MemoryPushStore, PushStore};

// headroom over the 10 MiB attachment ceiling
const BODY_LIMIT: usize = 12 * 1024 * 1024;

#[tokio::main]
async fn main() -> AppResult<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().init();

    let hub = Arc::new(ChatHub::new());
    let push: Arc<dyn PushStore> = Arc::new(MemoryPushStore::default());

    let app = Router::new()
        .merge(routes::router())
        .layer(Extension(hub))
        .layer(Extension(push))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT));

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
