//! Shared harness for the integration tests
//!
//! Every test gets its own memory store and document directory and talks to
//! the API through `routes::dispatch`, without a socket.

#![allow(dead_code)]

use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use hyper::{Method, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

use muster::config::Args;
use muster::db::MemoryStore;
use muster::routes::{self, ApiRequest};
use muster::server::AppState;

pub const ADMIN_EMAIL: &str = "admin@muster.test";
pub const ADMIN_PASSWORD: &str = "admin-password-123";
pub const PASSWORD: &str = "volunteer-pass-1";

pub struct TestApp {
    pub state: Arc<AppState>,
    pub admin: String,
    _storage: TempDir,
    _workers: Vec<tokio::task::JoinHandle<()>>,
}

pub struct Response {
    pub status: StatusCode,
    pub headers: hyper::HeaderMap,
    pub raw: bytes::Bytes,
}

impl Response {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.raw).unwrap_or(Value::Null)
    }

    pub fn data(&self) -> Value {
        self.json()["data"].clone()
    }
}

impl TestApp {
    async fn build(workers: bool) -> Self {
        let storage = TempDir::new().unwrap();
        let mut args = Args::for_testing(storage.path().join("documents"));
        args.bootstrap_admin_email = Some(ADMIN_EMAIL.to_string());
        args.bootstrap_admin_password = Some(ADMIN_PASSWORD.to_string());

        let state = AppState::new(args, Arc::new(MemoryStore::new())).unwrap();
        state.prepare().await.unwrap();
        let workers = if workers {
            state.spawn_workers().unwrap()
        } else {
            Vec::new()
        };

        let mut app = Self {
            state: Arc::new(state),
            admin: String::new(),
            _storage: storage,
            _workers: workers,
        };
        app.admin = app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
        app
    }

    pub async fn new() -> Self {
        Self::build(false).await
    }

    /// Also runs the notification listener and mail worker
    pub async fn with_workers() -> Self {
        Self::build(true).await
    }

    pub async fn call(&self, method: Method, path: &str, token: Option<&str>, body: Option<Value>) -> Response {
        let mut req = ApiRequest::new(method, path);
        if let Some(token) = token {
            req = req.with_bearer(token);
        }
        if let Some(body) = body {
            req = req.with_json(&body);
        }
        let response = routes::dispatch(&self.state, req).await;
        let status = response.status();
        let headers = response.headers().clone();
        let raw = response.into_body().collect().await.unwrap().to_bytes();
        Response { status, headers, raw }
    }

    pub async fn get(&self, path: &str, token: &str) -> Response {
        self.call(Method::GET, path, Some(token), None).await
    }

    pub async fn post(&self, path: &str, token: &str, body: Value) -> Response {
        self.call(Method::POST, path, Some(token), Some(body)).await
    }

    pub async fn put(&self, path: &str, token: &str, body: Value) -> Response {
        self.call(Method::PUT, path, Some(token), Some(body)).await
    }

    pub async fn delete(&self, path: &str, token: &str) -> Response {
        self.call(Method::DELETE, path, Some(token), None).await
    }

    pub async fn login(&self, email: &str, password: &str) -> String {
        let res = self
            .call(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK, "login failed: {:?}", res.json());
        res.data()["access_token"].as_str().unwrap().to_string()
    }

    /// Create a user through the admin API; returns (id, access token)
    pub async fn user(&self, email: &str, role: &str, department_id: Option<&str>) -> (String, String) {
        let res = self
            .post(
                "/api/users",
                &self.admin,
                json!({
                    "name": format!("Χρήστης {}", email),
                    "email": email,
                    "password": PASSWORD,
                    "role": role,
                    "department_id": department_id,
                }),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "user create failed: {:?}", res.json());
        let id = res.data()["id"].as_str().unwrap().to_string();
        (id, self.login(email, PASSWORD).await)
    }

    pub async fn department(&self, name: &str) -> String {
        let res = self
            .post("/api/departments", &self.admin, json!({ "name": name }))
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "department create failed: {:?}", res.json());
        res.data()["id"].as_str().unwrap().to_string()
    }

    /// A published mission with one shift starting tomorrow
    pub async fn published_shift(&self, token: &str, department_id: &str, capacity: i64) -> (String, String) {
        let mission = self
            .post(
                "/api/missions",
                token,
                json!({ "department_id": department_id, "title": "Δασοπροστασία Πάρνηθας" }),
            )
            .await;
        assert_eq!(mission.status, StatusCode::CREATED, "{:?}", mission.json());
        let mission_id = mission.data()["id"].as_str().unwrap().to_string();

        let shift_id = self.shift(token, &mission_id, capacity).await;

        let res = self
            .post(&format!("/api/missions/{}/publish", mission_id), token, json!({}))
            .await;
        assert_eq!(res.status, StatusCode::OK, "{:?}", res.json());
        (mission_id, shift_id)
    }

    pub async fn shift(&self, token: &str, mission_id: &str, capacity: i64) -> String {
        let start = Utc::now() + Duration::days(1);
        let res = self
            .post(
                &format!("/api/missions/{}/shifts", mission_id),
                token,
                json!({
                    "title": "Πρωινή βάρδια",
                    "start_at": start.to_rfc3339(),
                    "end_at": (start + Duration::hours(4)).to_rfc3339(),
                    "max_capacity": capacity,
                }),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "shift create failed: {:?}", res.json());
        res.data()["id"].as_str().unwrap().to_string()
    }

    /// The listener runs on its own task; wait until the inbox reaches `expected`
    pub async fn wait_for_unread(&self, token: &str, expected: u64) -> u64 {
        let mut count = 0;
        for _ in 0..100 {
            let res = self.get("/api/notifications/unread-count", token).await;
            count = res.data()["count"].as_u64().unwrap_or(0);
            if count >= expected {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        count
    }

    pub async fn apply(&self, token: &str, shift_id: &str) -> Response {
        self.post("/api/participations", token, json!({ "shift_id": shift_id }))
            .await
    }
}
