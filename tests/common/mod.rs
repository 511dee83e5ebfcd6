//! Shared harness: a real router over a throwaway database, driven with
//! `tower::ServiceExt::oneshot`.
#![allow(dead_code)]

use auro::config::Config;
use auro::state::AppState;
use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use futures::StreamExt;
use serde_json::{json, Value};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

pub const SENDER_IP: &str = "203.0.113.7";

pub struct TestApp {
    _tmp: TempDir,
    pub router: Router,
    pub state: AppState,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
    pub text: String,
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.bcrypt_cost = 4;
    config
}

pub fn spawn() -> TestApp {
    spawn_with(test_config())
}

pub fn spawn_with(mut config: Config) -> TestApp {
    let tmp = TempDir::new().unwrap();
    config.database.path = Some(tmp.path().join("test.db"));

    let pool = auro::db::create_pool(&config.db_path()).unwrap();
    auro::db::run_migrations(&pool).unwrap();

    let state = AppState::new(pool, config);
    TestApp {
        _tmp: tmp,
        router: auro::app(state.clone()),
        state,
    }
}

impl TestApp {
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        cookie: Option<&str>,
        ip: &str,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", ip);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8_lossy(&bytes).to_string();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            body,
            text,
        }
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, None, cookie, SENDER_IP).await
    }

    pub async fn post(&self, uri: &str, body: Value, cookie: Option<&str>) -> TestResponse {
        self.request(Method::POST, uri, Some(body), cookie, SENDER_IP)
            .await
    }

    /// Register an account and return its session cookie (`name=value`).
    pub async fn register(&self, username: &str) -> String {
        let response = self
            .post(
                "/auth/register",
                json!({
                    "username": username,
                    "email": format!("{}@example.com", username),
                    "password": "password123",
                }),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.text);
        session_cookie(&response.headers)
    }

    /// Create an inbox and return its id.
    pub async fn create_inbox(&self, cookie: &str, body: Value) -> String {
        let response = self.post("/api/inboxes", body, Some(cookie)).await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.text);
        response.body["id"].as_str().unwrap().to_string()
    }

    /// Submit an anonymous message from `ip`.
    pub async fn send_message(
        &self,
        username: &str,
        inbox: &str,
        content: &str,
        ip: &str,
    ) -> TestResponse {
        self.request(
            Method::POST,
            &format!("/api/users/{}/inboxes/{}/messages", username, inbox),
            Some(json!({ "content": content })),
            None,
            ip,
        )
        .await
    }

    /// Open a server-sent event stream. The subscription is live once this
    /// returns.
    pub async fn open_stream(&self, uri: &str, cookie: &str) -> EventStream {
        let request = Request::builder()
            .uri(uri)
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );
        EventStream {
            body: response.into_body().into_data_stream(),
        }
    }

    pub fn count(&self, sql: &str) -> i64 {
        let conn = self.state.db.get().unwrap();
        conn.query_row(sql, [], |row| row.get(0)).unwrap()
    }
}

pub struct EventStream {
    body: axum::body::BodyDataStream,
}

impl EventStream {
    /// The next `change` event's JSON payload. Fails after two seconds.
    pub async fn next_change(&mut self) -> Value {
        let chunk = tokio::time::timeout(Duration::from_secs(2), self.body.next())
            .await
            .expect("no event within two seconds")
            .expect("stream ended")
            .unwrap();
        let text = String::from_utf8(chunk.to_vec()).unwrap();
        assert!(text.contains("event: change"), "{}", text);
        let data = text
            .lines()
            .find_map(|line| line.strip_prefix("data: "))
            .unwrap();
        serde_json::from_str(data).unwrap()
    }

    /// Asserts nothing arrives for a short while.
    pub async fn assert_quiet(&mut self) {
        let next = tokio::time::timeout(Duration::from_millis(200), self.body.next()).await;
        assert!(next.is_err(), "unexpected event");
    }
}

/// `name=value` of the session cookie set by a response.
pub fn session_cookie(headers: &HeaderMap) -> String {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("auro_session="))
        .and_then(|v| v.split(';').next())
        .unwrap()
        .to_string()
}
