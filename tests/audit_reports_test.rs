//! Audit trail and administrative reports

mod common;

use common::TestApp;
use hyper::{header, StatusCode};
use serde_json::json;

#[tokio::test]
async fn test_audit_is_system_admin_only() {
    let app = TestApp::new().await;
    let dept = app.department("Τμήμα").await;
    let (_, manager) = app.user("manager@example.org", "DEPARTMENT_ADMIN", Some(&dept)).await;

    assert_eq!(app.get("/api/audit-logs", &manager).await.status, StatusCode::FORBIDDEN);

    let res = app.get("/api/audit-logs?entity_type=department", &app.admin).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["meta"]["total"], 1);
    assert_eq!(res.data()[0]["action"], "department.created");
}

#[tokio::test]
async fn test_mission_history() {
    let app = TestApp::new().await;
    let dept = app.department("Διασώστες").await;
    let (mission_id, _) = app.published_shift(&app.admin, &dept, 2).await;
    app.post(&format!("/api/missions/{}/close", mission_id), &app.admin, json!({}))
        .await;

    let res = app
        .get(&format!("/api/audit-logs/mission/{}", mission_id), &app.admin)
        .await;
    assert_eq!(res.status, StatusCode::OK);
    let actions: Vec<String> = res
        .data()
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["action"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(actions, ["mission.created", "mission.published", "mission.closed"]);
}

#[tokio::test]
async fn test_dashboard_counts() {
    let app = TestApp::new().await;
    let dept = app.department("Πολιτική προστασία").await;
    let (_, v1) = app.user("v1@example.org", "VOLUNTEER", Some(&dept)).await;
    let (_, v2) = app.user("v2@example.org", "VOLUNTEER", Some(&dept)).await;
    let (_, shift_id) = app.published_shift(&app.admin, &dept, 4).await;

    let approved = app.apply(&v1, &shift_id).await.data()["id"].as_str().unwrap().to_string();
    app.apply(&v2, &shift_id).await;
    app.post(&format!("/api/participations/{}/approve", approved), &app.admin, json!({}))
        .await;

    let res = app.get("/api/reports/dashboard", &app.admin).await;
    assert_eq!(res.status, StatusCode::OK);
    let dashboard = res.data();
    assert_eq!(dashboard["users"], 3);
    assert_eq!(dashboard["active_volunteers"], 2);
    assert_eq!(dashboard["departments"], 1);
    assert_eq!(dashboard["missions"]["PUBLISHED"], 1);
    assert_eq!(dashboard["missions"]["DRAFT"], 0);
    assert_eq!(dashboard["shifts"], 1);
    assert_eq!(dashboard["pending_requests"], 1);
    assert_eq!(dashboard["approved_participations"], 1);
    assert_eq!(dashboard["total_capacity"], 4);
    assert_eq!(dashboard["filled_slots"], 1);
    assert_eq!(dashboard["fill_rate"], 25.0);

    assert_eq!(app.get("/api/reports/dashboard", &v1).await.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_department_admin_reports_are_scoped() {
    let app = TestApp::new().await;
    let own = app.department("Τμήμα Αθηνών").await;
    let other = app.department("Τμήμα Πατρών").await;
    let (_, manager) = app.user("manager@example.org", "DEPARTMENT_ADMIN", Some(&own)).await;
    app.published_shift(&app.admin, &own, 2).await;
    app.published_shift(&app.admin, &other, 2).await;
    app.published_shift(&app.admin, &other, 2).await;

    let res = app.get("/api/reports/missions", &app.admin).await;
    assert_eq!(res.data().as_array().unwrap().len(), 3);

    // Asking for another department does not widen the scope
    let res = app
        .get(&format!("/api/reports/missions?department_id={}", other), &manager)
        .await;
    assert_eq!(res.status, StatusCode::OK);
    let rows = res.data();
    assert_eq!(rows.as_array().unwrap().len(), 1);
    assert_eq!(rows[0]["department_id"], own.as_str());
}

#[tokio::test]
async fn test_csv_export() {
    let app = TestApp::new().await;
    let dept = app.department("Επικοινωνίες").await;
    app.published_shift(&app.admin, &dept, 3).await;

    let res = app.get("/api/reports/export?type=missions", &app.admin).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.headers[header::CONTENT_TYPE], "text/csv; charset=utf-8");
    let disposition = res.headers[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.contains("missions-"));

    let body = String::from_utf8(res.raw.to_vec()).unwrap();
    let mut lines = body.split("\r\n");
    assert!(lines.next().unwrap().starts_with("id,title,department,status"));
    assert!(lines.next().unwrap().contains("Δασοπροστασία Πάρνηθας"));

    let res = app.get("/api/reports/export?type=payroll", &app.admin).await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(res.json()["errors"]["type"].is_array());
    let res = app.get("/api/reports/export", &app.admin).await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
}
