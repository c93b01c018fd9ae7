use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use bridge_common::lifecycle::SessionLifecycle;

use crate::conversation;
use crate::publish::RequestPublisher;

#[derive(Clone)]
pub struct AppState {
    pub publisher: Arc<dyn RequestPublisher>,
    pub lifecycle: Arc<SessionLifecycle>,
}

async fn index() -> &'static str {
    "conversation-bridge api"
}

pub fn router(publisher: Arc<dyn RequestPublisher>, lifecycle: Arc<SessionLifecycle>) -> Router {
    let state = AppState {
        publisher,
        lifecycle,
    };

    Router::new()
        .route("/", get(index))
        .route("/conversation/create", post(conversation::create_conversation))
        .route(
            "/conversation/continuation-token",
            put(conversation::refresh_continuation_tokens),
        )
        .route("/conversation/token", post(conversation::acquire_tokens))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
