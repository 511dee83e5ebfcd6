use askama::Template;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{AppError, AppResult};
use crate::extractors::MaybeUser;
use crate::inboxes::{self, Profile, PublicInbox};
use crate::state::AppState;

#[derive(Template)]
#[template(path = "pages/home.html")]
pub struct HomeTemplate {
    pub username: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/profile.html")]
pub struct ProfileTemplate {
    pub profile: Profile,
    pub feed: Vec<FeedView>,
}

pub struct FeedView {
    pub question: String,
    pub answer: String,
    pub inbox_name: String,
    pub when: String,
}

#[derive(Template)]
#[template(path = "pages/inbox.html")]
pub struct InboxTemplate {
    pub inbox: PublicInbox,
    pub max_chars: usize,
}

#[derive(Template)]
#[template(path = "pages/not_found.html")]
pub struct NotFoundTemplate;

/// Wrapper to render askama templates as axum responses
pub struct Html<T: Template>(pub T);

impl<T: Template> IntoResponse for Html<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!("Template render error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
            }
        }
    }
}

/// Relative age of a SQLite `datetime('now')` timestamp, e.g. "5m ago".
pub fn time_ago(timestamp: &str, now: DateTime<Utc>) -> String {
    let Ok(then) = NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%d %H:%M:%S") else {
        return timestamp.to_string();
    };
    let minutes = (now - then.and_utc()).num_minutes().max(0);
    match minutes {
        m if m < 60 => format!("{}m ago", m),
        m if m < 60 * 24 => format!("{}h ago", m / 60),
        m => format!("{}d ago", m / (60 * 24)),
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Html(NotFoundTemplate)).into_response()
}

pub async fn index(MaybeUser(user): MaybeUser) -> Html<HomeTemplate> {
    Html(HomeTemplate {
        username: user.map(|u| u.username),
    })
}

/// GET /u/{username} (also reachable as /@username)
pub async fn profile_page(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let profile = match inboxes::profile(&conn, &username) {
        Ok(profile) => profile,
        Err(AppError::NotFound) => return Ok(not_found()),
        Err(e) => return Err(e),
    };

    let now = Utc::now();
    let feed = profile
        .feed
        .iter()
        .map(|item| FeedView {
            question: item.question.clone(),
            answer: item.answer.clone(),
            inbox_name: item.inbox_name.clone(),
            when: time_ago(&item.answered_at, now),
        })
        .collect();

    Ok(Html(ProfileTemplate { profile, feed }).into_response())
}

/// GET /u/{username}/{inbox} (also reachable as /@username/inbox)
pub async fn inbox_page(
    State(state): State<AppState>,
    Path((username, inbox)): Path<(String, String)>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    match inboxes::public_inbox(&conn, &username, &inbox) {
        Ok(inbox) => Ok(Html(InboxTemplate {
            inbox,
            max_chars: state.config.limits.message_max_chars,
        })
        .into_response()),
        Err(AppError::NotFound) => Ok(not_found()),
        Err(e) => Err(e),
    }
}

/// Fallback for unknown paths.
pub async fn fallback() -> Response {
    not_found()
}
