//! Endpoints anonymous visitors use: address lookup, profiles, inbox
//! info, private-inbox unlock and message submission.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::events::{ChangeEvent, Operation, Table};
use crate::extractors::ClientAddress;
use crate::inboxes::{self, Profile, PublicInbox};
use crate::state::AppState;
use crate::submission::{self, Disposition, Submission};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/get-ip", get(get_ip))
        .route("/api/users/{username}/profile", get(profile))
        .route("/api/users/{username}/inboxes/{inbox}", get(inbox_info))
        .route("/api/users/{username}/inboxes/{inbox}/unlock", post(unlock))
        .route("/api/users/{username}/inboxes/{inbox}/messages", post(send_message))
}

/// GET /api/get-ip: the caller's resolved address. Never cached.
async fn get_ip(
    State(state): State<AppState>,
    ClientAddress(address): ClientAddress,
) -> AppResult<Response> {
    if !state.rate_limiter.lock().await.check(&address) {
        return Err(AppError::RateLimited);
    }

    Ok((
        [(header::CACHE_CONTROL, "no-store, no-cache, must-revalidate")],
        Json(json!({ "ip": address })),
    )
        .into_response())
}

async fn profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<Json<Profile>> {
    let conn = state.db.get()?;
    Ok(Json(inboxes::profile(&conn, &username)?))
}

async fn inbox_info(
    State(state): State<AppState>,
    Path((username, inbox)): Path<(String, String)>,
) -> AppResult<Json<PublicInbox>> {
    let conn = state.db.get()?;
    Ok(Json(inboxes::public_inbox(&conn, &username, &inbox)?))
}

#[derive(Deserialize)]
pub struct UnlockRequest {
    pub password: String,
}

/// POST .../unlock: trade the inbox password for a short-lived access token.
async fn unlock(
    State(state): State<AppState>,
    Path((username, inbox)): Path<(String, String)>,
    ClientAddress(address): ClientAddress,
    Json(req): Json<UnlockRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let token = submission::gate_for(&state)
        .unlock(&username, &inbox, &req.password, &address)
        .await?;
    Ok(Json(json!({ "access_token": token })))
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub access_token: Option<String>,
}

/// POST .../messages: submit an anonymous message.
///
/// Blocked senders get the same response as a delivered message.
async fn send_message(
    State(state): State<AppState>,
    Path((username, inbox_name)): Path<(String, String)>,
    ClientAddress(address): ClientAddress,
    Json(req): Json<SendMessageRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let disposition = submission::gate_for(&state)
        .submit(Submission {
            username,
            inbox_name,
            content: req.content,
            access_token: req.access_token,
            address,
        })
        .await?;

    match disposition {
        Disposition::Delivered {
            message_id,
            inbox_id,
            owner_id,
        } => {
            state.events.publish(
                ChangeEvent::new(Table::Messages, Operation::Insert, message_id)
                    .in_inbox(inbox_id)
                    .for_user(owner_id),
            );
        }
        Disposition::SilentlyDropped => {}
        Disposition::Banned { reason } => return Err(AppError::Banned(reason)),
    }

    Ok(Json(json!({ "status": "delivered" })))
}
