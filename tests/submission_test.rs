//! End-to-end tests for anonymous submission through the HTTP surface:
//! delivery, validation, private inboxes, silent blocks, platform bans,
//! hidden words and the public feed.

mod common;

use axum::http::{header, Method, StatusCode};
use common::{spawn, spawn_with, test_config, SENDER_IP};
use serde_json::json;

// ============================================================================
// DELIVERY AND FEED
// ============================================================================

#[tokio::test]
async fn test_feedback_inbox_end_to_end() {
    let app = spawn();
    let alice = app.register("alice").await;
    let inbox_id = app
        .create_inbox(
            &alice,
            json!({ "name": "feedback", "prompt_text": "Tell me anything" }),
        )
        .await;

    let sent = app
        .send_message("alice", "feedback", "What's next?", SENDER_IP)
        .await;
    assert_eq!(sent.status, StatusCode::OK);
    assert_eq!(sent.body["status"], "delivered");

    let messages = app
        .get(&format!("/api/inboxes/{}/messages", inbox_id), Some(&alice))
        .await;
    let list = messages.body.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["content"], "What's next?");
    assert_eq!(list[0]["anon_id"], "anon_52fbe0a5");
    assert!(list[0].get("anon_ip").is_none());
    let message_id = list[0]["id"].as_str().unwrap().to_string();

    let reply = app
        .post(
            &format!("/api/messages/{}/reply", message_id),
            json!({ "content": "Soon!", "is_public": true }),
            Some(&alice),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    let reply_id = reply.body["id"].as_str().unwrap().to_string();

    let profile = app.get("/api/users/alice/profile", None).await;
    assert_eq!(profile.body["total_messages"], 1);
    assert_eq!(profile.body["feed"][0]["question"], "What's next?");
    assert_eq!(profile.body["feed"][0]["answer"], "Soon!");
    assert_eq!(profile.body["feed"][0]["inbox_name"], "feedback");

    let hidden = app
        .post(
            &format!("/api/replies/{}/visibility", reply_id),
            json!({ "is_public": false }),
            Some(&alice),
        )
        .await;
    assert_eq!(hidden.status, StatusCode::OK);
    let profile = app.get("/api/users/alice/profile", None).await;
    assert!(profile.body["feed"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_reply_round_trip_resets_replied_state() {
    let app = spawn();
    let alice = app.register("alice").await;
    let inbox_id = app
        .create_inbox(&alice, json!({ "name": "feedback", "prompt_text": "Ask" }))
        .await;
    app.send_message("alice", "feedback", "Hello", SENDER_IP).await;
    let message_id: String = {
        let conn = app.state.db.get().unwrap();
        conn.query_row("SELECT id FROM messages", [], |row| row.get(0))
            .unwrap()
    };

    let reply = app
        .post(
            &format!("/api/messages/{}/reply", message_id),
            json!({ "content": "Hi!" }),
            Some(&alice),
        )
        .await;
    let reply_id = reply.body["id"].as_str().unwrap().to_string();
    assert_eq!(app.count("SELECT COUNT(*) FROM messages WHERE is_replied = 1"), 1);

    let second = app
        .post(
            &format!("/api/messages/{}/reply", message_id),
            json!({ "content": "Again" }),
            Some(&alice),
        )
        .await;
    assert_eq!(second.status, StatusCode::CONFLICT);

    let deleted = app
        .request(
            Method::DELETE,
            &format!("/api/replies/{}", reply_id),
            None,
            Some(&alice),
            SENDER_IP,
        )
        .await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(app.count("SELECT COUNT(*) FROM messages WHERE is_replied = 1"), 0);

    let unreplied = app
        .get(
            &format!("/api/inboxes/{}/messages?tab=unreplied", inbox_id),
            Some(&alice),
        )
        .await;
    assert_eq!(unreplied.body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_inbox_names_match_ignoring_case_and_hyphens() {
    let app = spawn();
    let alice = app.register("alice").await;
    app.create_inbox(
        &alice,
        json!({ "name": "My Questions", "prompt_text": "Ask" }),
    )
    .await;

    let sent = app
        .send_message("Alice", "my-questions", "hey", SENDER_IP)
        .await;
    assert_eq!(sent.status, StatusCode::OK);
    assert_eq!(app.count("SELECT COUNT(*) FROM messages"), 1);

    let missing = app.send_message("alice", "nope", "hey", SENDER_IP).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

// ============================================================================
// VALIDATION
// ============================================================================

#[tokio::test]
async fn test_over_long_and_blank_messages_are_rejected() {
    let app = spawn();
    let alice = app.register("alice").await;
    app.create_inbox(&alice, json!({ "name": "feedback", "prompt_text": "Ask" }))
        .await;

    let too_long = "x".repeat(301);
    let response = app
        .send_message("alice", "feedback", &too_long, SENDER_IP)
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "Message must be 300 characters or less");

    let blank = app.send_message("alice", "feedback", "   ", SENDER_IP).await;
    assert_eq!(blank.status, StatusCode::BAD_REQUEST);

    let exact = app
        .send_message("alice", "feedback", &"x".repeat(300), SENDER_IP)
        .await;
    assert_eq!(exact.status, StatusCode::OK);
    assert_eq!(app.count("SELECT COUNT(*) FROM messages"), 1);
}

// ============================================================================
// PRIVATE INBOXES
// ============================================================================

#[tokio::test]
async fn test_private_inbox_requires_unlock() {
    let app = spawn();
    let alice = app.register("alice").await;
    app.create_inbox(
        &alice,
        json!({
            "name": "secrets",
            "prompt_text": "Psst",
            "visibility": "private",
            "password": "letmein123",
        }),
    )
    .await;

    let info = app.get("/api/users/alice/inboxes/secrets", None).await;
    assert_eq!(info.body["requires_password"], true);
    assert!(!info.text.contains("letmein123"));

    let locked = app
        .send_message("alice", "secrets", "hello", SENDER_IP)
        .await;
    assert_eq!(locked.status, StatusCode::FORBIDDEN);

    let wrong = app
        .post(
            "/api/users/alice/inboxes/secrets/unlock",
            json!({ "password": "guess" }),
            None,
        )
        .await;
    assert_eq!(wrong.status, StatusCode::FORBIDDEN);

    let unlocked = app
        .post(
            "/api/users/alice/inboxes/secrets/unlock",
            json!({ "password": "letmein123" }),
            None,
        )
        .await;
    assert_eq!(unlocked.status, StatusCode::OK);
    let token = unlocked.body["access_token"].as_str().unwrap().to_string();

    let sent = app
        .post(
            "/api/users/alice/inboxes/secrets/messages",
            json!({ "content": "hello", "access_token": token }),
            None,
        )
        .await;
    assert_eq!(sent.status, StatusCode::OK);
    assert_eq!(app.count("SELECT COUNT(*) FROM messages"), 1);
}

#[tokio::test]
async fn test_changing_password_revokes_access_tokens() {
    let app = spawn();
    let alice = app.register("alice").await;
    let inbox_id = app
        .create_inbox(
            &alice,
            json!({
                "name": "secrets",
                "prompt_text": "Psst",
                "visibility": "private",
                "password": "letmein123",
            }),
        )
        .await;
    let unlocked = app
        .post(
            "/api/users/alice/inboxes/secrets/unlock",
            json!({ "password": "letmein123" }),
            None,
        )
        .await;
    let token = unlocked.body["access_token"].as_str().unwrap().to_string();

    let updated = app
        .request(
            Method::PATCH,
            &format!("/api/inboxes/{}", inbox_id),
            Some(json!({ "password": "newsecret" })),
            Some(&alice),
            SENDER_IP,
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);

    let sent = app
        .post(
            "/api/users/alice/inboxes/secrets/messages",
            json!({ "content": "hello", "access_token": token }),
            None,
        )
        .await;
    assert_eq!(sent.status, StatusCode::FORBIDDEN);
}

// ============================================================================
// BLOCKS AND BANS
// ============================================================================

#[tokio::test]
async fn test_blocked_sender_is_silently_dropped_per_inbox() {
    let app = spawn();
    let alice = app.register("alice").await;
    let feedback = app
        .create_inbox(&alice, json!({ "name": "feedback", "prompt_text": "Ask" }))
        .await;
    app.create_inbox(&alice, json!({ "name": "ideas", "prompt_text": "Ideas?" }))
        .await;

    app.send_message("alice", "feedback", "first", SENDER_IP).await;
    let messages = app
        .get(&format!("/api/inboxes/{}/messages", feedback), Some(&alice))
        .await;
    let message_id = messages.body[0]["id"].as_str().unwrap().to_string();

    let blocked = app
        .post(
            &format!("/api/messages/{}/block", message_id),
            json!({}),
            Some(&alice),
        )
        .await;
    assert_eq!(blocked.status, StatusCode::OK);

    let dropped = app
        .send_message("alice", "feedback", "second", SENDER_IP)
        .await;
    assert_eq!(dropped.status, StatusCode::OK);
    assert_eq!(dropped.body["status"], "delivered");
    assert_eq!(app.count("SELECT COUNT(*) FROM messages"), 1);

    let elsewhere = app.send_message("alice", "ideas", "third", SENDER_IP).await;
    assert_eq!(elsewhere.status, StatusCode::OK);
    assert_eq!(app.count("SELECT COUNT(*) FROM messages"), 2);

    let other_sender = app
        .send_message("alice", "feedback", "fourth", "198.51.100.4")
        .await;
    assert_eq!(other_sender.status, StatusCode::OK);
    assert_eq!(app.count("SELECT COUNT(*) FROM messages"), 3);

    let list = app.get("/api/settings/blocked", Some(&alice)).await;
    let entries = list.body.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["inbox_name"], "feedback");
    let block_id = entries[0]["id"].as_str().unwrap().to_string();

    let unblocked = app
        .request(
            Method::DELETE,
            &format!("/api/settings/blocked/{}", block_id),
            None,
            Some(&alice),
            SENDER_IP,
        )
        .await;
    assert_eq!(unblocked.status, StatusCode::OK);
    app.send_message("alice", "feedback", "fifth", SENDER_IP).await;
    assert_eq!(app.count("SELECT COUNT(*) FROM messages"), 4);
}

#[tokio::test]
async fn test_banned_sender_is_rejected_with_reason() {
    let app = spawn();
    let alice = app.register("alice").await;
    let inbox_id = app
        .create_inbox(&alice, json!({ "name": "feedback", "prompt_text": "Ask" }))
        .await;
    app.send_message("alice", "feedback", "rude", SENDER_IP).await;
    let messages = app
        .get(&format!("/api/inboxes/{}/messages", inbox_id), Some(&alice))
        .await;
    let message_id = messages.body[0]["id"].as_str().unwrap().to_string();

    let flagged = app
        .post(
            &format!("/api/messages/{}/flag", message_id),
            json!({ "reason": "harassment" }),
            Some(&alice),
        )
        .await;
    assert_eq!(flagged.body["is_flagged"], true);

    let reports = app.get("/api/admin/reports", Some(&alice)).await;
    let report_id = reports.body[0]["id"].as_str().unwrap().to_string();
    let banned = app
        .post(
            &format!("/api/admin/reports/{}/ban", report_id),
            json!({}),
            Some(&alice),
        )
        .await;
    assert_eq!(banned.status, StatusCode::OK);

    let rejected = app
        .send_message("alice", "feedback", "again", SENDER_IP)
        .await;
    assert_eq!(rejected.status, StatusCode::FORBIDDEN);
    assert_eq!(rejected.body["error"], "banned");
    assert_eq!(rejected.body["reason"], "Banned by admin");
    assert_eq!(app.count("SELECT COUNT(*) FROM messages"), 1);
}

#[tokio::test]
async fn test_banned_owner_inboxes_stop_resolving() {
    let app = spawn();
    let admin = app.register("alice").await;
    let bob = app.register("bob").await;
    app.create_inbox(&bob, json!({ "name": "feedback", "prompt_text": "Ask" }))
        .await;
    let delivered = app.send_message("bob", "feedback", "hi", SENDER_IP).await;
    assert_eq!(delivered.status, StatusCode::OK);

    let bob_id: String = {
        let conn = app.state.db.get().unwrap();
        conn.query_row("SELECT id FROM users WHERE username = 'bob'", [], |row| {
            row.get(0)
        })
        .unwrap()
    };
    let banned = app
        .post(
            &format!("/api/admin/users/{}/ban", bob_id),
            json!({}),
            Some(&admin),
        )
        .await;
    assert_eq!(banned.status, StatusCode::OK);

    let info = app.get("/api/users/bob/inboxes/feedback", None).await;
    assert_eq!(info.status, StatusCode::NOT_FOUND);
    let send = app.send_message("bob", "feedback", "still there?", SENDER_IP).await;
    assert_eq!(send.status, StatusCode::NOT_FOUND);
    assert_eq!(app.count("SELECT COUNT(*) FROM messages"), 1);

    app.post(
        &format!("/api/admin/users/{}/unban", bob_id),
        json!({}),
        Some(&admin),
    )
    .await;
    let resumed = app.send_message("bob", "feedback", "back", SENDER_IP).await;
    assert_eq!(resumed.status, StatusCode::OK);
    assert_eq!(app.count("SELECT COUNT(*) FROM messages"), 2);
}

// ============================================================================
// HIDDEN WORDS
// ============================================================================

#[tokio::test]
async fn test_hidden_words_filter_owner_views_only() {
    let app = spawn();
    let alice = app.register("alice").await;
    let inbox_id = app
        .create_inbox(&alice, json!({ "name": "feedback", "prompt_text": "Ask" }))
        .await;

    let added = app
        .post(
            "/api/settings/hidden-words",
            json!({ "word": "Spoiler" }),
            Some(&alice),
        )
        .await;
    assert_eq!(added.status, StatusCode::OK);
    let duplicate = app
        .post(
            "/api/settings/hidden-words",
            json!({ "word": "spoiler" }),
            Some(&alice),
        )
        .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let sent = app
        .send_message("alice", "feedback", "huge SPOILER inside", SENDER_IP)
        .await;
    assert_eq!(sent.body["status"], "delivered");
    app.send_message("alice", "feedback", "plain question", SENDER_IP)
        .await;

    let messages = app
        .get(&format!("/api/inboxes/{}/messages", inbox_id), Some(&alice))
        .await;
    assert_eq!(messages.body.as_array().unwrap().len(), 1);
    assert_eq!(messages.body[0]["content"], "plain question");

    let inboxes = app.get("/api/inboxes", Some(&alice)).await;
    assert_eq!(inboxes.body[0]["unreplied_count"], 1);

    let recent = app.get("/api/dashboard/messages", Some(&alice)).await;
    assert_eq!(recent.body.as_array().unwrap().len(), 1);

    let stats = app.get("/api/admin/stats", Some(&alice)).await;
    assert_eq!(stats.body["total_messages"], 2);
}

// ============================================================================
// ADDRESSES, RATE LIMITS AND PAGES
// ============================================================================

#[tokio::test]
async fn test_get_ip_is_uncached_and_rate_limited() {
    let mut config = test_config();
    config.limits.rate_limit_requests = 2;
    let app = spawn_with(config);

    let first = app.get("/api/get-ip", None).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body["ip"], SENDER_IP);
    assert_eq!(
        first.headers[header::CACHE_CONTROL],
        "no-store, no-cache, must-revalidate"
    );

    app.get("/api/get-ip", None).await;
    let limited = app.get("/api/get-ip", None).await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);

    let other = app
        .request(Method::GET, "/api/get-ip", None, None, "198.51.100.4")
        .await;
    assert_eq!(other.status, StatusCode::OK);
}

#[tokio::test]
async fn test_submissions_are_rate_limited_per_address() {
    let mut config = test_config();
    config.limits.rate_limit_requests = 2;
    let app = spawn_with(config);
    let alice = app.register("alice").await;
    app.create_inbox(&alice, json!({ "name": "feedback", "prompt_text": "Ask" }))
        .await;

    for _ in 0..2 {
        let sent = app.send_message("alice", "feedback", "hi", SENDER_IP).await;
        assert_eq!(sent.status, StatusCode::OK);
    }
    let limited = app.send_message("alice", "feedback", "hi", SENDER_IP).await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(app.count("SELECT COUNT(*) FROM messages"), 2);
}

#[tokio::test]
async fn test_at_paths_render_public_pages() {
    let app = spawn();
    let alice = app.register("alice").await;
    app.create_inbox(
        &alice,
        json!({ "name": "feedback", "prompt_text": "Tell me anything" }),
    )
    .await;

    let profile = app.get("/@alice", None).await;
    assert_eq!(profile.status, StatusCode::OK);
    assert!(profile.text.contains("@alice"));

    let inbox = app.get("/@alice/feedback", None).await;
    assert_eq!(inbox.status, StatusCode::OK);
    assert!(inbox.text.contains("Tell me anything"));

    let missing = app.get("/@nobody", None).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}
