/// Enriched information attached to prospects.
mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::json;

#[tokio::test]
async fn enrichment_lifecycle() {
    let app = spawn_app().await;
    let prospect = app.create_prospect(ALICE_TOKEN, json!({"nom": "ACME"})).await;
    let base = format!("/api/prospects/{}/enrichments", prospect["id"].as_str().unwrap());

    let (status, body) = app
        .post(
            &base,
            ALICE_TOKEN,
            json!({"rapport_markdown": "# Rapport", "audit_seo": {"score": 55}}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let first = body["data"].clone();
    assert_eq!(first["id_prospect"], prospect["id"]);
    assert_eq!(first["audit_seo"]["score"], 55);

    // audit_seo defaults to an empty object
    let (_, body) = app.post(&base, ALICE_TOKEN, json!({})).await;
    let second = body["data"].clone();
    assert_eq!(second["audit_seo"], json!({}));
    assert!(second["rapport_markdown"].is_null());

    let (status, body) = app.get(&base, ALICE_TOKEN).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![second["id"].as_i64().unwrap(), first["id"].as_i64().unwrap()]);

    let uri = format!("/api/enrichments/{}", first["id"]);
    let (status, body) = app
        .put(&uri, ALICE_TOKEN, json!({"rapport_markdown": null}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["rapport_markdown"].is_null());
    assert_eq!(body["data"]["audit_seo"]["score"], 55);

    let (status, body) = app.delete(&uri, ALICE_TOKEN).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["message"], "Enrichment deleted successfully");

    let (_, body) = app.get(&base, ALICE_TOKEN).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn enrichments_follow_prospect_ownership() {
    let app = spawn_app().await;
    let prospect = app.create_prospect(ALICE_TOKEN, json!({"nom": "ACME"})).await;
    let base = format!("/api/prospects/{}/enrichments", prospect["id"].as_str().unwrap());
    let (_, body) = app
        .post(&base, ALICE_TOKEN, json!({"rapport_markdown": "privé"}))
        .await;
    let uri = format!("/api/enrichments/{}", body["data"]["id"]);

    let (status, body) = app.get(&base, BOB_TOKEN).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "NOT_FOUND");

    let (status, _) = app.post(&base, BOB_TOKEN, json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .put(&uri, BOB_TOKEN, json!({"rapport_markdown": "volé"}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Foreign delete is a no-op
    app.delete(&uri, BOB_TOKEN).await;
    let (_, body) = app.get(&base, ALICE_TOKEN).await;
    assert_eq!(body["data"][0]["rapport_markdown"], "privé");
}

#[tokio::test]
async fn deleting_a_prospect_removes_its_enrichments() {
    let app = spawn_app().await;
    let prospect = app.create_prospect(ALICE_TOKEN, json!({"nom": "ACME"})).await;
    let id = prospect["id"].as_str().unwrap();
    let base = format!("/api/prospects/{}/enrichments", id);
    let (_, body) = app.post(&base, ALICE_TOKEN, json!({})).await;
    let enrichment_uri = format!("/api/enrichments/{}", body["data"]["id"]);

    app.delete(&format!("/api/prospects/{}", id), ALICE_TOKEN).await;

    let (status, _) = app
        .put(&enrichment_uri, ALICE_TOKEN, json!({"audit_seo": {}}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_enrichment_id_is_not_found() {
    let app = spawn_app().await;

    let (status, body) = app
        .put("/api/enrichments/abc", ALICE_TOKEN, json!({}))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "NOT_FOUND");
}
