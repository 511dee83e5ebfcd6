// Library exports for Auro
// The binary and the integration tests build the app through `app`.

pub mod account;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod extractors;
pub mod identity;
pub mod inboxes;
pub mod moderation;
pub mod rate_limit;
pub mod routes;
pub mod state;
pub mod submission;
pub mod visibility;

use axum::middleware;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The full application. `/@user/...` paths are rewritten before routing.
pub fn app(state: AppState) -> Router {
    let routes = routes::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Router::new()
        .fallback_service(routes)
        .layer(middleware::from_fn(routes::rewrite_at_paths))
}
