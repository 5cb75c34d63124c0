//! Document upload, visibility and download

mod common;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::TestApp;
use hyper::{header, StatusCode};
use serde_json::json;

async fn upload(app: &TestApp, token: &str, visibility: &str, bytes: &[u8]) -> String {
    let res = app
        .post(
            "/api/documents",
            token,
            json!({
                "title": "Οδηγός ασφαλείας",
                "file_name": "οδηγός.txt",
                "mime_type": "text/plain",
                "content": STANDARD.encode(bytes),
                "visibility": visibility,
            }),
        )
        .await;
    assert_eq!(res.status, StatusCode::CREATED, "{:?}", res.json());
    res.data()["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_upload_and_download() {
    let app = TestApp::new().await;
    let dept = app.department("Εκπαίδευση").await;
    let (_, volunteer) = app.user("vol@example.org", "VOLUNTEER", Some(&dept)).await;

    let id = upload(&app, &app.admin, "PUBLIC", b"Kanones asfaleias\n").await;

    let res = app.get(&format!("/api/documents/{}", id), &volunteer).await;
    assert_eq!(res.status, StatusCode::OK);
    let doc = res.data();
    assert_eq!(doc["size_bytes"], 18);
    assert_eq!(doc["file_name"], "οδηγός.txt");
    assert_eq!(doc["sha256"].as_str().unwrap().len(), 64);

    let res = app.get(&format!("/api/documents/{}/download", id), &volunteer).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(&res.raw[..], b"Kanones asfaleias\n");
    assert_eq!(res.headers[header::CONTENT_TYPE], "text/plain");
    let disposition = res.headers[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.starts_with("attachment;"));
    assert!(disposition.contains("filename*=UTF-8''"));
}

#[tokio::test]
async fn test_private_documents_are_hidden() {
    let app = TestApp::new().await;
    let dept = app.department("Εκπαίδευση").await;
    let (_, owner) = app.user("owner@example.org", "VOLUNTEER", Some(&dept)).await;
    let (_, other) = app.user("other@example.org", "VOLUNTEER", Some(&dept)).await;

    let id = upload(&app, &owner, "PRIVATE", b"personal").await;

    assert_eq!(app.get(&format!("/api/documents/{}", id), &owner).await.status, StatusCode::OK);
    assert_eq!(app.get(&format!("/api/documents/{}", id), &app.admin).await.status, StatusCode::OK);
    assert_eq!(
        app.get(&format!("/api/documents/{}/download", id), &other).await.status,
        StatusCode::FORBIDDEN
    );
    let res = app.get("/api/documents", &other).await;
    assert_eq!(res.json()["meta"]["total"], 0);

    // Only the owner or an administrator may change it
    let res = app
        .put(&format!("/api/documents/{}", id), &other, json!({ "title": "Κλεμμένο" }))
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    let res = app
        .put(&format!("/api/documents/{}", id), &owner, json!({ "visibility": "PUBLIC" }))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(app.get(&format!("/api/documents/{}", id), &other).await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_department_visibility() {
    let app = TestApp::new().await;
    let own = app.department("Τμήμα Αθηνών").await;
    let other = app.department("Τμήμα Πατρών").await;
    let (_, member) = app.user("member@example.org", "VOLUNTEER", Some(&own)).await;
    let (_, outsider) = app.user("outsider@example.org", "VOLUNTEER", Some(&other)).await;

    // Department defaults to the uploader's own
    let id = upload(&app, &member, "DEPARTMENT", b"roster").await;
    let res = app.get(&format!("/api/documents/{}", id), &member).await;
    assert_eq!(res.data()["department_id"], own.as_str());

    assert_eq!(
        app.get(&format!("/api/documents/{}", id), &outsider).await.status,
        StatusCode::FORBIDDEN
    );
}

#[tokio::test]
async fn test_upload_validation() {
    let app = TestApp::new().await;

    let res = app
        .post(
            "/api/documents",
            &app.admin,
            json!({ "title": "Χωρίς αρχείο", "file_name": "a.txt", "content": "***" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(res.json()["errors"]["content"].is_array());

    let oversized = vec![0u8; 1024 * 1024 + 1];
    let res = app
        .post(
            "/api/documents",
            &app.admin,
            json!({
                "title": "Μεγάλο",
                "file_name": "big.bin",
                "content": STANDARD.encode(&oversized),
            }),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(res.json()["errors"]["content"].is_array());
}

#[tokio::test]
async fn test_delete_document() {
    let app = TestApp::new().await;
    let id = upload(&app, &app.admin, "PUBLIC", b"old").await;

    let res = app.delete(&format!("/api/documents/{}", id), &app.admin).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(
        app.get(&format!("/api/documents/{}", id), &app.admin).await.status,
        StatusCode::NOT_FOUND
    );
}
