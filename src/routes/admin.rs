use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::db::models::{BannedUser, User};
use crate::error::{AppError, AppResult};
use crate::events::{ChangeEvent, Operation, Table};
use crate::extractors::AdminUser;
use crate::moderation::admin::{
    self, AdminStats, ReportView, ReviewAction, ReviewOutcome, UserAction,
};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/stats", get(stats))
        .route("/api/admin/reports", get(list_reports))
        .route("/api/admin/reports/{id}/{action}", post(review_report))
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/users/{id}/{action}", post(user_action))
        .route("/api/admin/bans", get(list_bans))
        .route("/api/admin/bans/{id}", delete(lift_ban))
}

#[derive(Deserialize)]
struct SearchQuery {
    q: Option<String>,
}

async fn stats(State(state): State<AppState>, _admin: AdminUser) -> AppResult<Json<AdminStats>> {
    let conn = state.db.get()?;
    Ok(Json(admin::stats(&conn)?))
}

async fn list_reports(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Vec<ReportView>>> {
    let conn = state.db.get()?;
    Ok(Json(admin::list_reports(&conn, query.q.as_deref())?))
}

/// POST /api/admin/reports/{id}/{delete|ban|ignore}
async fn review_report(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path((id, action)): Path<(String, ReviewAction)>,
) -> AppResult<Json<ReviewOutcome>> {
    let mut conn = state.db.get()?;
    let outcome = admin::review_report(&mut conn, &id, action, &admin.id)?;

    state.events.publish(
        ChangeEvent::new(Table::Reports, Operation::Delete, &outcome.report_id)
            .in_inbox(&outcome.inbox_id),
    );
    if action == ReviewAction::Delete {
        state.events.publish(
            ChangeEvent::new(Table::Messages, Operation::Delete, &outcome.message_id)
                .in_inbox(&outcome.inbox_id),
        );
    }
    Ok(Json(outcome))
}

async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Vec<User>>> {
    let conn = state.db.get()?;
    Ok(Json(admin::list_users(&conn, query.q.as_deref())?))
}

#[derive(Deserialize, Default)]
struct UserActionRequest {
    reason: Option<String>,
}

/// POST /api/admin/users/{id}/{ban|unban|verify|unverify}
///
/// The body is optional; a ban may carry `{"reason": "..."}`.
async fn user_action(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path((id, action)): Path<(String, UserAction)>,
    body: axum::body::Bytes,
) -> AppResult<Json<User>> {
    let req: UserActionRequest = if body.is_empty() {
        UserActionRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::BadRequest(e.to_string()))?
    };

    let mut conn = state.db.get()?;
    let user = admin::apply_user_action(&mut conn, &id, action, &admin.id, req.reason.as_deref())?;
    Ok(Json(user))
}

async fn list_bans(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<Json<Vec<BannedUser>>> {
    let conn = state.db.get()?;
    Ok(Json(admin::list_bans(&conn)?))
}

async fn lift_ban(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let mut conn = state.db.get()?;
    admin::lift_ban(&mut conn, &id)?;
    Ok(Json(json!({ "status": "ok" })))
}
