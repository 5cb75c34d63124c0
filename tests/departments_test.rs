//! Department hierarchy

mod common;

use common::TestApp;
use hyper::StatusCode;
use serde_json::json;

async fn child(app: &TestApp, name: &str, parent: &str) -> String {
    let res = app
        .post("/api/departments", &app.admin, json!({ "name": name, "parent_id": parent }))
        .await;
    assert_eq!(res.status, StatusCode::CREATED, "{:?}", res.json());
    res.data()["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_tree_and_detail() {
    let app = TestApp::new().await;
    let root = app.department("Περιφέρεια Αττικής").await;
    let north = child(&app, "Βόρειος τομέας", &root).await;
    child(&app, "Νότιος τομέας", &root).await;
    child(&app, "Μαρούσι", &north).await;
    let (_, volunteer) = app.user("vol@example.org", "VOLUNTEER", None).await;

    let res = app.get("/api/departments?tree=true", &volunteer).await;
    assert_eq!(res.status, StatusCode::OK);
    let tree = res.data();
    assert_eq!(tree.as_array().unwrap().len(), 1);
    assert_eq!(tree[0]["name"], "Περιφέρεια Αττικής");
    let children = tree[0]["children"].as_array().unwrap();
    assert_eq!(children.len(), 2);
    assert_eq!(children[0]["name"], "Βόρειος τομέας");
    assert_eq!(children[0]["children"][0]["name"], "Μαρούσι");

    let res = app.get(&format!("/api/departments/{}", north), &volunteer).await;
    assert_eq!(res.data()["parent"]["id"], root.as_str());
    assert_eq!(res.data()["children"].as_array().unwrap().len(), 1);

    let res = app.get("/api/departments", &volunteer).await;
    assert_eq!(res.json()["meta"]["total"], 4);
}

#[tokio::test]
async fn test_cycles_are_refused() {
    let app = TestApp::new().await;
    let root = app.department("Κεντρική διοίκηση").await;
    let middle = child(&app, "Τομέας", &root).await;
    let leaf = child(&app, "Ομάδα", &middle).await;

    let res = app
        .put(&format!("/api/departments/{}", root), &app.admin, json!({ "parent_id": leaf }))
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(res.json()["errors"]["parent_id"].is_array());

    let res = app
        .put(&format!("/api/departments/{}", root), &app.admin, json!({ "parent_id": root }))
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);

    // Moving to the root is fine
    let res = app
        .put(&format!("/api/departments/{}", leaf), &app.admin, json!({ "parent_id": null }))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.data()["parent_id"].is_null());
}

#[tokio::test]
async fn test_delete_with_children_is_refused() {
    let app = TestApp::new().await;
    let root = app.department("Διοίκηση").await;
    let leaf = child(&app, "Γραμματεία", &root).await;

    let res = app.delete(&format!("/api/departments/{}", root), &app.admin).await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);

    assert_eq!(app.delete(&format!("/api/departments/{}", leaf), &app.admin).await.status, StatusCode::OK);
    assert_eq!(app.delete(&format!("/api/departments/{}", root), &app.admin).await.status, StatusCode::OK);
    assert_eq!(
        app.get(&format!("/api/departments/{}", root), &app.admin).await.status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_only_system_admin_writes() {
    let app = TestApp::new().await;
    let dept = app.department("Τμήμα").await;
    let (_, manager) = app.user("manager@example.org", "DEPARTMENT_ADMIN", Some(&dept)).await;

    let res = app.post("/api/departments", &manager, json!({ "name": "Νέο" })).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = app.post("/api/departments", &app.admin, json!({})).await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(res.json()["errors"]["name"].is_array());
}
