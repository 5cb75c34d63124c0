//! Response envelope helpers
//!
//! Every JSON answer has the shape `{"success", "message", "data"}`;
//! paginated lists add `meta`, validation failures add `errors`.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderValue};
use hyper::http::response::Builder;
use hyper::{Response, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::services::Page;
use crate::types::{ApiError, Result};

pub type ApiResponse = Response<Full<Bytes>>;

const ALLOWED_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type, Authorization";

fn cors(builder: Builder) -> Builder {
    builder
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", ALLOWED_METHODS)
        .header("Access-Control-Allow-Headers", ALLOWED_HEADERS)
}

/// Finish a builder; a malformed header degrades to a bare 500
fn finish(builder: Builder, body: Bytes) -> ApiResponse {
    builder.body(Full::new(body)).unwrap_or_else(|e| {
        error!("Failed to build response: {}", e);
        let mut response = Response::new(Full::new(Bytes::from_static(
            br#"{"success":false,"message":"Internal Server Error","data":null}"#,
        )));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    })
}

pub fn json_response(status: StatusCode, body: &Value) -> ApiResponse {
    let builder = cors(Response::builder().status(status))
        .header(header::CONTENT_TYPE, "application/json; charset=utf-8");
    finish(builder, Bytes::from(body.to_string()))
}

fn to_value<T: Serialize>(data: T) -> Result<Value> {
    serde_json::to_value(data)
        .map_err(|e| ApiError::Internal(format!("Failed to serialize response: {}", e)))
}

fn envelope<T: Serialize>(status: StatusCode, message: &str, data: T) -> Result<ApiResponse> {
    Ok(json_response(
        status,
        &json!({
            "success": true,
            "message": message,
            "data": to_value(data)?,
        }),
    ))
}

/// 200 with data
pub fn ok<T: Serialize>(message: &str, data: T) -> Result<ApiResponse> {
    envelope(StatusCode::OK, message, data)
}

/// 201 with the created record
pub fn created<T: Serialize>(message: &str, data: T) -> Result<ApiResponse> {
    envelope(StatusCode::CREATED, message, data)
}

/// 200 without data
pub fn message(message: &str) -> ApiResponse {
    json_response(
        StatusCode::OK,
        &json!({ "success": true, "message": message, "data": null }),
    )
}

pub fn paginated<T: Serialize>(message: &str, page: Page<T>) -> Result<ApiResponse> {
    Ok(json_response(
        StatusCode::OK,
        &json!({
            "success": true,
            "message": message,
            "data": to_value(page.items)?,
            "meta": to_value(page.meta)?,
        }),
    ))
}

/// Raw bytes, used for document downloads
pub fn file(content_type: &str, file_name: &str, bytes: Vec<u8>) -> ApiResponse {
    let content_type = HeaderValue::from_str(content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let builder = cors(Response::builder().status(StatusCode::OK))
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_DISPOSITION, content_disposition(file_name))
        .header(header::CONTENT_LENGTH, bytes.len());
    finish(builder, Bytes::from(bytes))
}

/// CSV attachment
pub fn csv(file_name: &str, body: String) -> ApiResponse {
    let builder = cors(Response::builder().status(StatusCode::OK))
        .header(header::CONTENT_TYPE, "text/csv; charset=utf-8")
        .header(header::CONTENT_DISPOSITION, content_disposition(file_name));
    finish(builder, Bytes::from(body))
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 name
fn content_disposition(file_name: &str) -> String {
    let ascii: String = file_name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let encoded: String = file_name
        .bytes()
        .map(|b| {
            if b.is_ascii_alphanumeric() || b"-._~".contains(&b) {
                (b as char).to_string()
            } else {
                format!("%{:02X}", b)
            }
        })
        .collect();
    format!("attachment; filename=\"{}\"; filename*=UTF-8''{}", ascii, encoded)
}

pub fn preflight() -> ApiResponse {
    let builder = cors(Response::builder().status(StatusCode::NO_CONTENT))
        .header("Access-Control-Max-Age", "86400");
    finish(builder, Bytes::new())
}

/// Map an error to its envelope. Internal detail is only included when
/// `debug` is on.
pub fn error_response(err: &ApiError, debug_detail: bool) -> ApiResponse {
    let status = err.status_code();
    if err.is_server_error() {
        error!(status = status.as_u16(), "Request failed: {}", err);
    } else {
        debug!(status = status.as_u16(), "Request rejected: {}", err);
    }

    let mut body = json!({
        "success": false,
        "message": err.public_message(),
        "data": null,
    });
    if let ApiError::Validation(errors) = err {
        body["errors"] = json!(errors);
    }
    if debug_detail {
        if let Some(detail) = err.debug_detail() {
            body["debug"] = json!(detail);
        }
    }
    json_response(status, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: ApiResponse) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_validation_errors_listed() {
        let err = ApiError::invalid_field("email", "Το email είναι υποχρεωτικό.");
        let response = error_response(&err, false);
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["errors"]["email"][0], "Το email είναι υποχρεωτικό.");
    }

    #[tokio::test]
    async fn test_debug_detail_only_when_enabled() {
        let err = ApiError::Internal("pool exhausted".into());

        let body = body_json(error_response(&err, false)).await;
        assert!(body.get("debug").is_none());

        let body = body_json(error_response(&err, true)).await;
        assert!(body["debug"].as_str().unwrap().contains("pool exhausted"));
    }

    #[tokio::test]
    async fn test_paginated_envelope() {
        let page = Page::from_vec(vec![1, 2, 3], crate::services::PageRequest::new(Some(2), 2));
        let body = body_json(paginated("ok", page).unwrap()).await;
        assert_eq!(body["data"], json!([3]));
        assert_eq!(body["meta"]["last_page"], 2);
        assert_eq!(body["meta"]["total"], 3);
    }

    #[test]
    fn test_content_disposition_encodes_greek() {
        let value = content_disposition("αναφορά.pdf");
        assert!(value.starts_with("attachment; filename=\""));
        assert!(value.contains("filename*=UTF-8''%CE%B1"));
        assert!(HeaderValue::from_str(&value).is_ok());
    }
}
