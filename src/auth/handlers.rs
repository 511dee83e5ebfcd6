use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::json;

use crate::auth::{password, session, tokens};
use crate::db::models::{new_id, Role, TokenKind, User};
use crate::error::{is_unique_violation, AppError, AppResult};
use crate::extractors::{cookie_value, CurrentUser, MaybeUser};
use crate::moderation;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    /// Email address or username
    #[serde(alias = "email", alias = "username")]
    pub identifier: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct UpdatePasswordRequest {
    pub password: String,
}

#[derive(Deserialize)]
pub struct ConfirmQuery {
    pub token: String,
}

// -- Helpers --

fn find_user(conn: &Connection, identifier: &str) -> rusqlite::Result<Option<User>> {
    let sql = format!(
        "SELECT {} FROM users WHERE username = ?1 OR email = ?1",
        User::COLUMNS
    );
    conn.query_row(&sql, params![identifier], User::from_row)
        .optional()
}

/// Signed-in response: the user as JSON plus the session cookie.
fn signed_in(state: &AppState, conn: &Connection, user: User) -> AppResult<Response> {
    let hours = state.config.auth.session_hours;
    let token = session::create_session(conn, &user.id, hours)?;
    let cookie = session::session_cookie(&state.config.auth.cookie_name, &token, hours);
    let user = CurrentUser::from(user);

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "status": "ok", "user": user })),
    )
        .into_response())
}

/// Outbound mail is not wired up; the link goes to the log instead.
fn log_link(state: &AppState, path: &str, token: &str, email: &str) {
    let link = state.config.link(&format!("{}?token={}", path, token));
    tracing::info!(%email, %link, "Account email");
}

// -- Handlers --

/// POST /auth/register: create an account. The first account is the admin.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<Response> {
    let username = req.username.trim();
    let email = req.email.trim().to_lowercase();
    password::validate_username(username)?;
    password::validate_email(&email)?;
    password::validate_password(&req.password)?;

    let hash = password::hash(&req.password, state.config.auth.bcrypt_cost)?;

    let conn = state.db.get()?;
    let user_count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    let role = if user_count == 0 { Role::Admin } else { Role::User };

    let user_id = new_id();
    let inserted = conn.execute(
        "INSERT INTO users (id, username, email, password_hash, role) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![user_id, username, email, hash, role],
    );
    match inserted {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(AppError::Conflict(
                "Username or email is already taken".into(),
            ))
        }
        Err(e) => return Err(e.into()),
    }
    tracing::info!(%user_id, %username, %role, "Account created");

    let token = tokens::issue(
        &conn,
        &user_id,
        TokenKind::ConfirmEmail,
        state.config.auth.token_ttl_minutes,
    )?;
    log_link(&state, "/auth/confirm", &token, &email);

    if state.config.auth.require_email_confirmation {
        return Ok(Json(json!({ "status": "confirmation_required" })).into_response());
    }

    let user = find_user(&conn, username)?.ok_or(AppError::NotFound)?;
    signed_in(&state, &conn, user)
}

/// POST /auth/login: sign in with email or username.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let user = find_user(&conn, req.identifier.trim())?
        .filter(|user| password::verify(&req.password, &user.password_hash))
        .ok_or(AppError::Unauthorized)?;

    if let Some(reason) = moderation::account_ban_reason(&conn, &user.id, user.role)? {
        return Err(AppError::Banned(reason));
    }
    if state.config.auth.require_email_confirmation && user.email_confirmed_at.is_none() {
        return Err(AppError::Forbidden(
            "Please confirm your email address first".into(),
        ));
    }

    tracing::info!(user_id = %user.id, "Signed in");
    signed_in(&state, &conn, user)
}

/// POST /auth/logout
pub async fn logout(State(state): State<AppState>, headers: axum::http::HeaderMap) -> AppResult<Response> {
    let cookie_name = &state.config.auth.cookie_name;
    if let Some(token) = cookie_value(&headers, cookie_name) {
        let conn = state.db.get()?;
        session::delete_session(&conn, token)?;
    }

    Ok((
        [(header::SET_COOKIE, session::clear_session_cookie(cookie_name))],
        Json(json!({ "status": "ok" })),
    )
        .into_response())
}

/// GET /auth/session: the signed-in user, or null.
pub async fn current_session(MaybeUser(user): MaybeUser) -> Json<serde_json::Value> {
    Json(json!({ "user": user }))
}

/// POST /auth/forgot-password: always succeeds so addresses can't be enumerated.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let email = req.email.trim().to_lowercase();
    let conn = state.db.get()?;
    let user_id: Option<String> = conn
        .query_row(
            "SELECT id FROM users WHERE email = ?1",
            params![email],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(user_id) = user_id {
        let token = tokens::issue(
            &conn,
            &user_id,
            TokenKind::ResetPassword,
            state.config.auth.token_ttl_minutes,
        )?;
        log_link(&state, "/auth/reset-password", &token, &email);
    }

    Ok(Json(json!({ "status": "ok" })))
}

/// POST /auth/reset-password: set a new password with a reset token and
/// sign out every session.
pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> AppResult<Json<serde_json::Value>> {
    password::validate_password(&req.password)?;
    let hash = password::hash(&req.password, state.config.auth.bcrypt_cost)?;

    let conn = state.db.get()?;
    let user_id = tokens::consume(&conn, &req.token, TokenKind::ResetPassword)?
        .ok_or_else(|| AppError::BadRequest("Invalid or expired reset link".into()))?;

    conn.execute(
        "UPDATE users SET password_hash = ?2 WHERE id = ?1",
        params![user_id, hash],
    )?;
    let ended = session::delete_user_sessions(&conn, &user_id)?;
    tracing::info!(%user_id, sessions_ended = ended, "Password reset");

    Ok(Json(json!({ "status": "ok" })))
}

/// POST /auth/password: change the signed-in user's password.
pub async fn update_password(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<UpdatePasswordRequest>,
) -> AppResult<Json<serde_json::Value>> {
    password::validate_password(&req.password)?;
    let hash = password::hash(&req.password, state.config.auth.bcrypt_cost)?;

    let conn = state.db.get()?;
    conn.execute(
        "UPDATE users SET password_hash = ?2 WHERE id = ?1",
        params![user.id, hash],
    )?;
    tracing::info!(user_id = %user.id, "Password changed");

    Ok(Json(json!({ "status": "ok" })))
}

/// GET /auth/confirm?token=: confirm an email address from the mailed link.
pub async fn confirm_email(
    State(state): State<AppState>,
    Query(query): Query<ConfirmQuery>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let user_id = tokens::consume(&conn, &query.token, TokenKind::ConfirmEmail)?
        .ok_or_else(|| AppError::BadRequest("Invalid or expired confirmation link".into()))?;

    conn.execute(
        "UPDATE users SET email_confirmed_at = datetime('now') WHERE id = ?1",
        params![user_id],
    )?;
    tracing::info!(%user_id, "Email confirmed");

    Ok(Redirect::to("/?confirmed=1").into_response())
}
