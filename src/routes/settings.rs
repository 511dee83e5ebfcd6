use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::account::{self, ProfileChanges};
use crate::auth::session;
use crate::db::models::HiddenWord;
use crate::error::AppResult;
use crate::events::{ChangeEvent, Operation, Table};
use crate::extractors::CurrentUser;
use crate::moderation::{self, BlockedEntry};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/settings/profile", patch(update_profile))
        .route("/api/settings/account", delete(delete_account))
        .route(
            "/api/settings/hidden-words",
            get(list_hidden_words).post(add_hidden_word),
        )
        .route("/api/settings/hidden-words/{id}", delete(remove_hidden_word))
        .route("/api/settings/blocked", get(list_blocked))
        .route("/api/settings/blocked/{id}", delete(unblock))
}

async fn update_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(changes): Json<ProfileChanges>,
) -> AppResult<Json<CurrentUser>> {
    let conn = state.db.get()?;
    let updated = account::update_profile(&conn, &user.id, &changes)?;
    Ok(Json(updated.into()))
}

/// DELETE /api/settings/account: delete the account and sign out.
async fn delete_account(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    account::delete_account(&conn, &user.id)?;

    Ok((
        [(
            header::SET_COOKIE,
            session::clear_session_cookie(&state.config.auth.cookie_name),
        )],
        Json(json!({ "status": "ok" })),
    )
        .into_response())
}

async fn list_hidden_words(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<HiddenWord>>> {
    let conn = state.db.get()?;
    Ok(Json(account::list_hidden_words(&conn, &user.id)?))
}

#[derive(Deserialize)]
struct HiddenWordRequest {
    word: String,
}

async fn add_hidden_word(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<HiddenWordRequest>,
) -> AppResult<Json<HiddenWord>> {
    let conn = state.db.get()?;
    Ok(Json(account::add_hidden_word(&conn, &user.id, &req.word)?))
}

async fn remove_hidden_word(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let conn = state.db.get()?;
    account::remove_hidden_word(&conn, &user.id, &id)?;
    Ok(Json(json!({ "status": "ok" })))
}

async fn list_blocked(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<BlockedEntry>>> {
    let conn = state.db.get()?;
    Ok(Json(moderation::list_blocked(&conn, &user.id)?))
}

async fn unblock(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let conn = state.db.get()?;
    let inbox_id = moderation::unblock(&conn, &id, &user.id)?;

    state.events.publish(
        ChangeEvent::new(Table::BlockedUsers, Operation::Delete, &id)
            .in_inbox(inbox_id)
            .for_user(&user.id),
    );
    Ok(Json(json!({ "status": "ok" })))
}
