use axum::Router;

pub mod chat;
pub mod push;
pub mod ws;

pub fn router() -> Router {
    Router::new()
        .nest("/api", chat::router().merge(push::router()))
        .nest("/ws",  ws::router())
}
