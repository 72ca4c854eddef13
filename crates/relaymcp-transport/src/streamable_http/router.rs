//! Axum router assembly for the StreamableHTTP transport.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use super::handlers::{delete_handler, get_handler, options_handler, poll_async_handler, post_handler};
use super::state::StreamableHttpState;

/// Build the axum router serving the StreamableHTTP transport at
/// `state.config.endpoint_path`, plus its JSON-async polling sub-route.
pub(crate) fn build_router(state: Arc<StreamableHttpState>, cors: CorsLayer) -> Router {
    let endpoint = state.config.endpoint_path.clone();
    let poll_path = format!("{}/responses/{{request_id}}", endpoint.trim_end_matches('/'));

    let gc_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            gc_state.gc_async_responses();
        }
    });

    Router::new()
        .route(
            &endpoint,
            post(post_handler)
                .get(get_handler)
                .delete(delete_handler)
                .options(options_handler),
        )
        .route(&poll_path, get(poll_async_handler))
        .layer(cors)
        .with_state(state)
}
