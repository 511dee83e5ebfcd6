pub mod admin;
pub mod assets;
pub mod auth;
pub mod dashboard;
pub mod home;
pub mod public;
pub mod settings;

use axum::extract::Request;
use axum::http::Uri;
use axum::middleware::Next;
use axum::response::Response;
use axum::routing::get;
use axum::Router;

use crate::state::AppState;

/// Every route of the application.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(home::index))
        .route("/u/{username}", get(home::profile_page))
        .route("/u/{username}/{inbox}", get(home::inbox_page))
        .route("/assets/{*path}", get(assets::serve))
        .merge(auth::router())
        .merge(public::router())
        .merge(dashboard::router())
        .merge(settings::router())
        .merge(admin::router())
        .fallback(home::fallback)
}

/// `/@alice/rest` is served as `/u/alice/rest`.
pub fn at_path_target(path: &str) -> Option<String> {
    let rest = path.strip_prefix("/@")?;
    if rest.is_empty() {
        return None;
    }
    Some(format!("/u/{}", rest))
}

/// Middleware that applies [`at_path_target`] before routing.
pub async fn rewrite_at_paths(mut request: Request, next: Next) -> Response {
    if let Some(path) = at_path_target(request.uri().path()) {
        let target = match request.uri().query() {
            Some(query) => format!("{}?{}", path, query),
            None => path,
        };
        if let Ok(uri) = target.parse::<Uri>() {
            *request.uri_mut() = uri;
        }
    }
    next.run(request).await
}
