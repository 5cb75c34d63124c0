//! Notifications written by the background listener

mod common;

use common::TestApp;
use hyper::StatusCode;
use serde_json::json;

#[tokio::test]
async fn test_participation_flow_notifies_both_sides() {
    let app = TestApp::with_workers().await;
    let dept = app.department("Δασοπροστασία").await;
    let (_, volunteer) = app.user("vol@example.org", "VOLUNTEER", Some(&dept)).await;
    let (_, shift_id) = app.published_shift(&app.admin, &dept, 2).await;

    // Department members hear about the published mission
    assert_eq!(app.wait_for_unread(&volunteer, 1).await, 1);
    let res = app.get("/api/notifications", &volunteer).await;
    assert_eq!(res.data()[0]["kind"], "mission.published");

    let request_id = app.apply(&volunteer, &shift_id).await.data()["id"].as_str().unwrap().to_string();

    // Managers hear about the request
    assert_eq!(app.wait_for_unread(&app.admin, 1).await, 1);
    let res = app.get("/api/notifications", &app.admin).await;
    assert_eq!(res.data()[0]["kind"], "participation.requested");
    assert_eq!(res.data()[0]["data"]["request_id"], request_id.as_str());

    app.post(&format!("/api/participations/{}/approve", request_id), &app.admin, json!({}))
        .await;
    assert_eq!(app.wait_for_unread(&volunteer, 2).await, 2);
    let res = app.get("/api/notifications?unread=true", &volunteer).await;
    assert_eq!(res.json()["meta"]["total"], 2);
    assert_eq!(res.data()[0]["kind"], "participation.approved");
}

#[tokio::test]
async fn test_mark_read_and_read_all() {
    let app = TestApp::with_workers().await;
    let dept = app.department("Υγειονομικό").await;
    let (_, volunteer) = app.user("vol@example.org", "VOLUNTEER", Some(&dept)).await;
    app.published_shift(&app.admin, &dept, 1).await;
    app.published_shift(&app.admin, &dept, 1).await;

    assert_eq!(app.wait_for_unread(&volunteer, 2).await, 2);
    let res = app.get("/api/notifications", &volunteer).await;
    let first = res.data()[0]["id"].as_str().unwrap().to_string();

    // Someone else's notification answers 404
    let res = app
        .post(&format!("/api/notifications/{}/read", first), &app.admin, json!({}))
        .await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    let res = app
        .post(&format!("/api/notifications/{}/read", first), &volunteer, json!({}))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.data()["read_at"].is_string());
    assert_eq!(app.wait_for_unread(&volunteer, 1).await, 1);

    let res = app.post("/api/notifications/read-all", &volunteer, json!({})).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.data()["updated"], 1);

    let res = app.get("/api/notifications/unread-count", &volunteer).await;
    assert_eq!(res.data()["count"], 0);
    let res = app.get("/api/notifications", &volunteer).await;
    assert_eq!(res.json()["meta"]["total"], 2);
}
