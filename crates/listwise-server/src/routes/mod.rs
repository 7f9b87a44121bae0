//! API routes

use axum::Router;

use crate::AppState;

mod chat;
mod drafts;

pub use chat::frame_event;

/// Build the API router with all endpoints
pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/chat", chat::router())
        .nest("/drafts", drafts::router())
}
