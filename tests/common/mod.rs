//! Shared harness: the real router over an in-memory store, with wiremock
//! standing in for Supabase Auth.
#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{header as header_is, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use prospect_crm_api::config::{Config, StorageBackend};
use prospect_crm_api::handlers::AppState;
use prospect_crm_api::memory_storage::MemoryStore;
use prospect_crm_api::routes::build_router;

pub const ALICE_TOKEN: &str = "token-alice";
pub const BOB_TOKEN: &str = "token-bob";
pub const ADMIN_TOKEN: &str = "token-admin";
pub const SERVICE_KEY: &str = "service-role-key";

pub fn alice() -> Uuid {
    Uuid::from_u128(0xa11ce)
}

pub fn bob() -> Uuid {
    Uuid::from_u128(0xb0b)
}

pub fn admin() -> Uuid {
    Uuid::from_u128(0xad)
}

pub struct TestApp {
    pub router: Router,
    pub auth_server: MockServer,
}

/// Config pointing at the mock identity provider, with a rate limit high
/// enough not to interfere with tests.
pub fn test_config(supabase_url: String) -> Config {
    Config {
        database_url: None,
        port: 0,
        storage_backend: StorageBackend::Memory,
        run_migrations: false,
        supabase_url,
        supabase_service_role_key: SERVICE_KEY.to_string(),
        supabase_anon_key: None,
        admin_role: "admin".to_string(),
        auth_cache_ttl_secs: 60,
        n8n_generate_prospects_url: None,
        n8n_seo_audit_url: None,
        n8n_prospection_email_url: None,
        rate_limit_per_second: 1000,
        rate_limit_burst: 1000,
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

pub async fn spawn_app_with(configure: impl FnOnce(&mut Config)) -> TestApp {
    let auth_server = MockServer::start().await;
    mount_user(&auth_server, ALICE_TOKEN, alice(), json!({})).await;
    mount_user(&auth_server, BOB_TOKEN, bob(), json!({})).await;
    mount_user(&auth_server, ADMIN_TOKEN, admin(), json!({"role": "admin"})).await;

    let mut config = test_config(auth_server.uri());
    configure(&mut config);

    let state = AppState::new(config, Arc::new(MemoryStore::new())).unwrap();
    let router = build_router(Arc::new(state)).unwrap();

    TestApp {
        router,
        auth_server,
    }
}

pub async fn mount_user(server: &MockServer, token: &str, id: Uuid, app_metadata: Value) {
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header_is("authorization", format!("Bearer {}", token).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": id,
            "email": format!("{}@example.com", id.simple()),
            "aud": "authenticated",
            "app_metadata": app_metadata,
        })))
        .mount(server)
        .await;
}

impl TestApp {
    /// Sends a request and returns the status and the JSON body
    /// (`Value::Null` when the body is not JSON).
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let body = body.map(|b| b.to_string());
        self.raw_request(method, uri, token, body).await
    }

    pub async fn raw_request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<String>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", "127.0.0.1");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::CONTENT_LENGTH, body.len())
                .body(Body::from(body))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, Some(token), None).await
    }

    /// Creates a prospect for the token's user and returns its JSON.
    pub async fn create_prospect(&self, token: &str, body: Value) -> Value {
        let (status, json) = self.post("/api/prospects", token, body).await;
        assert_eq!(status, StatusCode::CREATED, "{}", json);
        json["data"].clone()
    }
}

pub fn error_code(body: &Value) -> &str {
    assert_eq!(body["success"], false, "expected an error envelope: {}", body);
    body["error"]["code"].as_str().unwrap_or_default()
}
