use std::convert::Infallible;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;

use crate::db::models::{BlockedUser, Inbox, Reply, ReportReason};
use crate::error::AppResult;
use crate::events::{ChangeEvent, Operation, Table};
use crate::extractors::CurrentUser;
use crate::inboxes::{
    self, InboxChanges, InboxSummary, MessageTab, MessageWithReply, NewInbox, RecentMessage,
    RECENT_LIMIT,
};
use crate::moderation::{self, FlagOutcome};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/inboxes", get(list_inboxes).post(create_inbox))
        .route("/api/inboxes/availability", get(availability))
        .route(
            "/api/inboxes/{id}",
            get(get_inbox).patch(update_inbox).delete(delete_inbox),
        )
        .route("/api/inboxes/{id}/messages", get(inbox_messages))
        .route("/api/inboxes/{id}/events", get(inbox_events))
        .route("/api/dashboard/messages", get(recent_messages))
        .route("/api/dashboard/events", get(dashboard_events))
        .route("/api/messages/{id}", axum::routing::delete(delete_message))
        .route("/api/messages/{id}/flag", post(flag_message))
        .route("/api/messages/{id}/block", post(block_sender))
        .route("/api/messages/{id}/reply", post(reply_to_message))
        .route("/api/replies/{id}", axum::routing::delete(delete_reply))
        .route("/api/replies/{id}/visibility", post(reply_visibility))
}

// -- Inboxes --

async fn list_inboxes(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<InboxSummary>>> {
    let conn = state.db.get()?;
    Ok(Json(inboxes::list_owned(&conn, &user.id)?))
}

async fn create_inbox(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<NewInbox>,
) -> AppResult<Json<Inbox>> {
    let mut conn = state.db.get()?;
    let inbox = inboxes::create(
        &mut conn,
        &user.id,
        &req,
        state.config.limits.max_inboxes_per_user,
        state.config.auth.bcrypt_cost,
    )?;

    state.events.publish(
        ChangeEvent::new(Table::Inboxes, Operation::Insert, &inbox.id)
            .in_inbox(&inbox.id)
            .for_user(&user.id),
    );
    Ok(Json(inbox))
}

#[derive(Deserialize)]
struct AvailabilityQuery {
    name: String,
}

async fn availability(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<AvailabilityQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let conn = state.db.get()?;
    let available = inboxes::is_available(&conn, &user.id, &query.name)?;
    Ok(Json(json!({ "available": available })))
}

async fn get_inbox(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Inbox>> {
    let conn = state.db.get()?;
    Ok(Json(inboxes::owned_inbox(&conn, &id, &user.id)?))
}

async fn update_inbox(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(changes): Json<InboxChanges>,
) -> AppResult<Json<Inbox>> {
    let conn = state.db.get()?;
    let inbox = inboxes::owned_inbox(&conn, &id, &user.id)?;
    let updated = inboxes::update(&conn, &inbox, &changes, state.config.auth.bcrypt_cost)?;

    if updated.access_changed {
        state.inbox_access.lock().await.revoke_inbox(&id);
    }
    state.events.publish(
        ChangeEvent::new(Table::Inboxes, Operation::Update, &id)
            .in_inbox(&id)
            .for_user(&user.id),
    );
    Ok(Json(updated.inbox))
}

async fn delete_inbox(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let conn = state.db.get()?;
    inboxes::owned_inbox(&conn, &id, &user.id)?;
    inboxes::delete(&conn, &id)?;

    state.inbox_access.lock().await.revoke_inbox(&id);
    state.events.publish(
        ChangeEvent::new(Table::Inboxes, Operation::Delete, &id)
            .in_inbox(&id)
            .for_user(&user.id),
    );
    Ok(Json(json!({ "status": "ok" })))
}

#[derive(Deserialize)]
struct TabQuery {
    #[serde(default)]
    tab: MessageTab,
}

async fn inbox_messages(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Query(query): Query<TabQuery>,
) -> AppResult<Json<Vec<MessageWithReply>>> {
    let conn = state.db.get()?;
    let inbox = inboxes::owned_inbox(&conn, &id, &user.id)?;
    Ok(Json(inboxes::inbox_messages(&conn, &inbox, query.tab)?))
}

/// GET /api/inboxes/{id}/events: SSE stream of changes to one inbox.
async fn inbox_events(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    {
        let conn = state.db.get()?;
        inboxes::owned_inbox(&conn, &id, &user.id)?;
    }

    Ok(change_stream(&state, move |event| event.concerns_inbox(&id)))
}

/// GET /api/dashboard/events: SSE stream of changes to anything the user
/// owns, feeding the inbox list and the recent-unreplied list.
async fn dashboard_events(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    change_stream(&state, move |event| event.concerns_user(&user.id))
}

fn change_stream<F>(
    state: &AppState,
    wanted: F,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    F: Fn(&ChangeEvent) -> bool + Send + 'static,
{
    let stream = BroadcastStream::new(state.events.subscribe()).filter_map(move |received| {
        // Lagged receivers skip what they missed; the dashboard refetches anyway
        let event = received.ok()?;
        if !wanted(&event) {
            return None;
        }
        Event::default().event("change").json_data(&event).ok().map(Ok)
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn recent_messages(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<RecentMessage>>> {
    let conn = state.db.get()?;
    Ok(Json(inboxes::recent_unreplied(&conn, &user.id, RECENT_LIMIT)?))
}

// -- Messages --

async fn delete_message(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let conn = state.db.get()?;
    let message = moderation::owned_message(&conn, &id, &user.id)?;
    moderation::delete_message(&conn, &message.id)?;

    state.events.publish(
        ChangeEvent::new(Table::Messages, Operation::Delete, &message.id)
            .in_inbox(&message.inbox_id)
            .for_user(&user.id),
    );
    Ok(Json(json!({ "status": "ok" })))
}

#[derive(Deserialize)]
struct FlagRequest {
    #[serde(default)]
    reason: Option<ReportReason>,
}

/// POST /api/messages/{id}/flag: flag (with a report) or unflag.
async fn flag_message(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<FlagRequest>,
) -> AppResult<Json<FlagOutcome>> {
    let mut conn = state.db.get()?;
    let message = moderation::owned_message(&conn, &id, &user.id)?;
    let outcome = moderation::toggle_flag(&mut conn, &message.id, req.reason)?;

    state.events.publish(
        ChangeEvent::new(Table::Messages, Operation::Update, &message.id)
            .in_inbox(&message.inbox_id)
            .for_user(&user.id),
    );
    let report_op = if outcome.is_flagged {
        Operation::Insert
    } else {
        Operation::Delete
    };
    state.events.publish(
        ChangeEvent::new(Table::Reports, report_op, &message.id).in_inbox(&message.inbox_id),
    );
    Ok(Json(outcome))
}

/// POST /api/messages/{id}/block: silently drop future messages from this
/// sender to this inbox.
async fn block_sender(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<BlockedUser>> {
    let conn = state.db.get()?;
    let message = moderation::owned_message(&conn, &id, &user.id)?;
    let block = moderation::block_sender(&conn, &message, &user.id)?;

    state.events.publish(
        ChangeEvent::new(Table::BlockedUsers, Operation::Insert, &block.id)
            .in_inbox(&message.inbox_id)
            .for_user(&user.id),
    );
    Ok(Json(block))
}

#[derive(Deserialize)]
struct ReplyRequest {
    content: String,
    #[serde(default = "default_public")]
    is_public: bool,
}

fn default_public() -> bool {
    true
}

async fn reply_to_message(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<ReplyRequest>,
) -> AppResult<Json<Reply>> {
    let mut conn = state.db.get()?;
    let message = moderation::owned_message(&conn, &id, &user.id)?;
    let reply = moderation::create_reply(&mut conn, &message.id, &req.content, req.is_public)?;

    state.events.publish(
        ChangeEvent::new(Table::Replies, Operation::Insert, &reply.id)
            .in_inbox(&message.inbox_id)
            .for_user(&user.id),
    );
    Ok(Json(reply))
}

// -- Replies --

async fn delete_reply(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let mut conn = state.db.get()?;
    let owned = moderation::owned_reply(&conn, &id, &user.id)?;
    moderation::delete_reply(&mut conn, &owned.reply)?;

    state.events.publish(
        ChangeEvent::new(Table::Replies, Operation::Delete, &owned.reply.id)
            .in_inbox(&owned.inbox_id)
            .for_user(&user.id),
    );
    Ok(Json(json!({ "status": "ok" })))
}

#[derive(Deserialize)]
struct VisibilityRequest {
    is_public: bool,
}

async fn reply_visibility(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<VisibilityRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let conn = state.db.get()?;
    let owned = moderation::owned_reply(&conn, &id, &user.id)?;
    moderation::set_reply_visibility(&conn, &owned.reply.id, req.is_public)?;

    state.events.publish(
        ChangeEvent::new(Table::Replies, Operation::Update, &owned.reply.id)
            .in_inbox(&owned.inbox_id)
            .for_user(&user.id),
    );
    Ok(Json(json!({ "id": owned.reply.id, "is_public": req.is_public })))
}
