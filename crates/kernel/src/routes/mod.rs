//! HTTP route handlers.

pub mod health;
pub mod lists;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Application router with every route and the tracing layer.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(lists::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
