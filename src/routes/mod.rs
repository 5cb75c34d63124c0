//! HTTP routes for Muster
//!
//! The server collects each request into an [`ApiRequest`] and hands it to
//! [`dispatch`], which matches path segments and calls the handler module
//! for the resource. Handlers return `Result<ApiResponse>`; errors become
//! envelopes in one place.

pub mod audit_logs;
pub mod auth_routes;
pub mod departments;
pub mod documents;
pub mod health;
pub mod missions;
pub mod notifications;
pub mod participations;
pub mod reports;
pub mod response;
pub mod shifts;
pub mod users;

pub use health::{health_check, version_info};
pub use response::{error_response, ApiResponse};

use bytes::Bytes;
use hyper::{HeaderMap, Method};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::net::SocketAddr;

use crate::auth::{extract_token_from_header, Actor};
use crate::server::AppState;
use crate::services::{Caller, PageRequest};
use crate::types::{ApiError, Result};

/// A fully read HTTP request
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub remote_addr: Option<SocketAddr>,
}

#[derive(Debug, Default, Deserialize)]
struct PageQuery {
    page: Option<u32>,
    per_page: Option<u32>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let (path, query) = match path.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (path, None),
        };
        Self {
            method,
            path,
            query,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            remote_addr: None,
        }
    }

    /// Attach a JSON body
    pub fn with_json(mut self, body: &serde_json::Value) -> Self {
        self.body = Bytes::from(body.to_string());
        self.headers.insert(
            hyper::header::CONTENT_TYPE,
            hyper::header::HeaderValue::from_static("application/json"),
        );
        self
    }

    /// Attach a bearer token
    pub fn with_bearer(mut self, token: &str) -> Self {
        if let Ok(value) = format!("Bearer {}", token).parse() {
            self.headers.insert(hyper::header::AUTHORIZATION, value);
        }
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Client address, preferring the first `X-Forwarded-For` hop
    pub fn client_ip(&self) -> Option<String> {
        self.header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .or_else(|| self.remote_addr.map(|a| a.ip().to_string()))
    }

    /// Decode the JSON body; an empty body decodes as `{}`
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::from_slice(b"{}")?);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Decode the query string into a filter struct
    pub fn query<T: DeserializeOwned>(&self) -> Result<T> {
        serde_urlencoded::from_str(self.query.as_deref().unwrap_or(""))
            .map_err(|e| ApiError::BadRequest(format!("Μη έγκυρες παράμετροι αναζήτησης: {}", e)))
    }

    /// `page` / `per_page` from the query string, clamped by configuration
    pub fn page(&self, state: &AppState) -> Result<PageRequest> {
        let query: PageQuery = self.query()?;
        Ok(PageRequest::new(query.page, state.args.page_size(query.per_page)))
    }
}

/// Resolve the bearer token into the calling user
pub async fn authenticate(state: &AppState, req: &ApiRequest) -> Result<Caller> {
    let token = extract_token_from_header(req.header("authorization"))
        .ok_or_else(|| ApiError::Unauthorized("Απαιτείται σύνδεση.".into()))?;
    let user = state.services.auth.authenticate(token).await?;
    Ok(Caller::new(Actor::from_user(&user), req.client_ip()))
}

pub(crate) fn route_not_found() -> ApiError {
    ApiError::NotFound("Η διαδρομή δεν βρέθηκε.".into())
}

/// Route one request
pub async fn dispatch(state: &AppState, req: ApiRequest) -> ApiResponse {
    if req.method == Method::OPTIONS {
        return response::preflight();
    }

    let path = req.path.clone();
    let segments: Vec<&str> = path
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    let result = match segments.as_slice() {
        ["health"] | ["healthz"] if req.method == Method::GET => health_check(state).await,
        ["version"] if req.method == Method::GET => version_info(),
        ["api", "auth", rest @ ..] => auth_routes::handle(state, &req, rest).await,
        ["api", "users", rest @ ..] => users::handle(state, &req, rest).await,
        ["api", "departments", rest @ ..] => departments::handle(state, &req, rest).await,
        ["api", "missions", rest @ ..] => missions::handle(state, &req, rest).await,
        ["api", "shifts", rest @ ..] => shifts::handle(state, &req, rest).await,
        ["api", "participations", rest @ ..] => participations::handle(state, &req, rest).await,
        ["api", "documents", rest @ ..] => documents::handle(state, &req, rest).await,
        ["api", "notifications", rest @ ..] => notifications::handle(state, &req, rest).await,
        ["api", "audit-logs", rest @ ..] => audit_logs::handle(state, &req, rest).await,
        ["api", "reports", rest @ ..] => reports::handle(state, &req, rest).await,
        _ => Err(route_not_found()),
    };

    result.unwrap_or_else(|e| error_response(&e, state.args.debug))
}
