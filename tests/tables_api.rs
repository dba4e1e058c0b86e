/// Custom table definitions and their records.
mod common;

use axum::http::{Method, StatusCode};
use common::*;
use serde_json::{json, Value};

async fn create_leads_table(app: &TestApp, token: &str) -> Value {
    let (status, body) = app
        .post(
            "/api/custom-tables",
            token,
            json!({
                "name": "leads",
                "schema": {
                    "description": "Salon leads",
                    "fields": [
                        {"name": "company", "type": "text", "required": true},
                        {"name": "contact", "type": "email"},
                        {"name": "qualified", "type": "boolean", "required": true},
                        {"name": "budget", "type": "number"}
                    ]
                }
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["data"].clone()
}

#[tokio::test]
async fn table_definitions_crud() {
    let app = spawn_app().await;
    let table = create_leads_table(&app, ALICE_TOKEN).await;
    assert_eq!(table["name"], "leads");
    assert_eq!(table["user_id"], alice().to_string());
    assert_eq!(table["schema"]["fields"].as_array().unwrap().len(), 4);

    let (status, body) = app.get("/api/custom-tables", ALICE_TOKEN).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (_, body) = app.get("/api/custom-tables", BOB_TOKEN).await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let uri = format!("/api/custom-tables/{}", table["id"].as_str().unwrap());
    let (status, body) = app
        .put(&uri, ALICE_TOKEN, json!({"name": "prospects-salon"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "prospects-salon");
    assert_eq!(body["data"]["schema"], table["schema"]);

    let (status, _) = app.put(&uri, BOB_TOKEN, json!({"name": "mine"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.delete(&uri, ALICE_TOKEN).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = app.get("/api/custom-tables", ALICE_TOKEN).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_table_name_conflicts_per_owner() {
    let app = spawn_app().await;
    create_leads_table(&app, ALICE_TOKEN).await;

    let (status, body) = app
        .post(
            "/api/custom-tables",
            ALICE_TOKEN,
            json!({"name": "leads", "schema": {"fields": []}}),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "CONFLICT");

    // Same name for another user is fine
    create_leads_table(&app, BOB_TOKEN).await;
}

#[tokio::test]
async fn invalid_definitions_are_rejected() {
    let app = spawn_app().await;

    let cases = [
        json!({"name": "bad name!", "schema": {"fields": []}}),
        json!({"name": "", "schema": {"fields": []}}),
        json!({"name": "t", "schema": {"fields": [{"name": "x", "type": "blob"}]}}),
        json!({"name": "t", "schema": {"fields": [{"name": "x"}, {"name": "x"}]}}),
        json!({"name": "t", "schema": "fields"}),
    ];
    for case in cases {
        let (status, body) = app.post("/api/custom-tables", ALICE_TOKEN, case).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
        assert_eq!(error_code(&body), "VALIDATION_ERROR");
    }
}

#[tokio::test]
async fn records_lifecycle() {
    let app = spawn_app().await;
    create_leads_table(&app, ALICE_TOKEN).await;

    // false and 0 are valid values for required fields
    let (status, body) = app
        .post(
            "/api/tables/leads",
            ALICE_TOKEN,
            json!({"company": "ACME", "qualified": false, "budget": 0, "id": "spoofed"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let record = body["data"].clone();
    assert_eq!(record["company"], "ACME");
    assert_eq!(record["qualified"], false);
    assert_ne!(record["id"], "spoofed");
    assert!(record["created_at"].is_string());
    assert!(record["updated_at"].is_string());

    app.post(
        "/api/tables/leads",
        ALICE_TOKEN,
        json!({"company": "Globex", "qualified": true}),
    )
    .await;

    let (status, body) = app.get("/api/tables/leads?limit=1", ALICE_TOKEN).await;
    assert_eq!(status, StatusCode::OK);
    let page = &body["data"];
    assert_eq!(page["total"], 2);
    assert_eq!(page["limit"], 1);
    assert_eq!(page["table"], "leads");
    assert_eq!(page["schema"]["description"], "Salon leads");
    assert_eq!(page["records"][0]["company"], "Globex");

    let uri = format!("/api/tables/leads/{}", record["id"].as_str().unwrap());
    let (status, body) = app.get(&uri, ALICE_TOKEN).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], record);

    let (status, body) = app
        .put(&uri, ALICE_TOKEN, json!({"contact": "boss@acme.example"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["company"], "ACME");
    assert_eq!(body["data"]["contact"], "boss@acme.example");
    assert_eq!(body["data"]["id"], record["id"]);

    let (status, body) = app.put(&uri, ALICE_TOKEN, json!({"company": ""})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "VALIDATION_ERROR");

    for _ in 0..2 {
        let (status, body) = app.delete(&uri, ALICE_TOKEN).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["message"], "Record deleted successfully");
    }
    let (status, body) = app.get(&uri, ALICE_TOKEN).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "NOT_FOUND");
}

#[tokio::test]
async fn required_fields_are_enforced() {
    let app = spawn_app().await;
    create_leads_table(&app, ALICE_TOKEN).await;

    for body in [
        json!({"qualified": true}),
        json!({"company": "  ", "qualified": true}),
        json!({"company": "ACME", "qualified": null}),
    ] {
        let (status, response) = app.post("/api/tables/leads", ALICE_TOKEN, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&response), "VALIDATION_ERROR");
    }

    let (status, body) = app
        .post("/api/tables/leads", ALICE_TOKEN, json!(["not", "an", "object"]))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "VALIDATION_ERROR");

    let (_, body) = app.get("/api/tables/leads", ALICE_TOKEN).await;
    assert_eq!(body["data"]["total"], 0);
}

#[tokio::test]
async fn unknown_or_foreign_table_is_table_not_found() {
    let app = spawn_app().await;
    create_leads_table(&app, ALICE_TOKEN).await;

    let (status, body) = app.get("/api/tables/unknown", ALICE_TOKEN).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "TABLE_NOT_FOUND");

    let (status, body) = app.get("/api/tables/leads", BOB_TOKEN).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "TABLE_NOT_FOUND");

    // Table lookup happens before body validation
    let (status, body) = app
        .post("/api/tables/unknown", ALICE_TOKEN, json!({}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "TABLE_NOT_FOUND");

    let (status, body) = app
        .raw_request(
            Method::POST,
            "/api/tables/unknown",
            Some(ALICE_TOKEN),
            Some("{oops".to_string()),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "TABLE_NOT_FOUND");
}

#[tokio::test]
async fn missing_table_name_or_record_id() {
    let app = spawn_app().await;
    create_leads_table(&app, ALICE_TOKEN).await;

    for method in [Method::GET, Method::POST] {
        let (status, body) = app
            .request(method, "/api/tables", Some(ALICE_TOKEN), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&body), "MISSING_TABLE_NAME");
    }

    let (status, body) = app.put("/api/tables/leads", ALICE_TOKEN, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "MISSING_ID");

    let (status, body) = app.delete("/api/tables/leads", ALICE_TOKEN).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "MISSING_ID");
}

#[tokio::test]
async fn deleting_a_table_drops_its_records() {
    let app = spawn_app().await;
    let table = create_leads_table(&app, ALICE_TOKEN).await;
    app.post(
        "/api/tables/leads",
        ALICE_TOKEN,
        json!({"company": "ACME", "qualified": true}),
    )
    .await;

    app.delete(
        &format!("/api/custom-tables/{}", table["id"].as_str().unwrap()),
        ALICE_TOKEN,
    )
    .await;

    let (status, body) = app.get("/api/tables/leads", ALICE_TOKEN).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "TABLE_NOT_FOUND");

    // Recreating the name starts empty
    create_leads_table(&app, ALICE_TOKEN).await;
    let (_, body) = app.get("/api/tables/leads", ALICE_TOKEN).await;
    assert_eq!(body["data"]["total"], 0);
}
