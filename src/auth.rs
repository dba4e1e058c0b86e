//! Caller authentication against Supabase Auth.
//!
//! A bearer token is exchanged with the identity provider for the caller's
//! identity (`GET /auth/v1/user`). Verified identities are cached for a short
//! TTL keyed by the SHA-256 of the token, so raw tokens are never kept in
//! memory.

use axum::http::{header, HeaderMap};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::Duration;
use uuid::Uuid;

use crate::config::Config;
use crate::errors::AppError;
use crate::handlers::AppState;

const ADMIN_PAGE_SIZE: usize = 1000;
const ADMIN_MAX_PAGES: usize = 50;

/// The verified caller. `id` is the owner id used to scope every query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallerIdentity {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub app_metadata: Value,
}

impl CallerIdentity {
    /// Whether `app_metadata.role` equals `role` or `app_metadata.roles`
    /// contains it. `app_metadata` is only writable with the service key.
    pub fn has_role(&self, role: &str) -> bool {
        let single = self
            .app_metadata
            .get("role")
            .and_then(Value::as_str)
            .is_some_and(|r| r == role);
        let listed = self
            .app_metadata
            .get("roles")
            .and_then(Value::as_array)
            .is_some_and(|roles| roles.iter().any(|r| r.as_str() == Some(role)));
        single || listed
    }
}

#[derive(Debug, Deserialize)]
struct AdminUsersPage {
    #[serde(default)]
    users: Vec<Value>,
}

/// Client for the identity provider's user and admin endpoints.
#[derive(Clone)]
pub struct SupabaseAuthClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    service_role_key: String,
    verified_tokens: Option<Cache<String, CallerIdentity>>,
}

impl SupabaseAuthClient {
    /// Creates a new `SupabaseAuthClient`.
    ///
    /// A zero `auth_cache_ttl_secs` disables the verified-token cache.
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::InternalError(format!("Failed to create auth client: {}", e)))?;

        let verified_tokens = (config.auth_cache_ttl_secs > 0).then(|| {
            Cache::builder()
                .time_to_live(Duration::from_secs(config.auth_cache_ttl_secs))
                .max_capacity(10_000)
                .build()
        });

        Ok(Self {
            client,
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            api_key: config.auth_api_key().to_string(),
            service_role_key: config.supabase_service_role_key.clone(),
            verified_tokens,
        })
    }

    /// Resolves `token` to the caller identity.
    ///
    /// Any failure, including the provider being unreachable, is reported as
    /// `INVALID_API_KEY`: the caller could not be identified.
    pub async fn verify_token(&self, token: &str) -> Result<CallerIdentity, AppError> {
        let fingerprint = token_fingerprint(token);

        if let Some(ref cache) = self.verified_tokens {
            if let Some(identity) = cache.get(&fingerprint).await {
                tracing::debug!("Auth cache HIT for user {}", identity.id);
                return Ok(identity);
            }
        }

        let url = format!("{}/auth/v1/user", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Identity provider unreachable: {}", e);
                AppError::InvalidApiKey(format!("identity provider request failed: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(AppError::InvalidApiKey(format!(
                "identity provider returned {}",
                response.status()
            )));
        }

        let identity: CallerIdentity = response.json().await.map_err(|e| {
            AppError::InvalidApiKey(format!("unreadable identity provider response: {}", e))
        })?;

        if let Some(ref cache) = self.verified_tokens {
            cache.insert(fingerprint, identity.clone()).await;
        }

        Ok(identity)
    }

    /// Lists users whose email address is confirmed, via the admin API.
    pub async fn list_confirmed_users(&self) -> Result<Vec<Value>, AppError> {
        let mut confirmed = Vec::new();
        let mut pages_read = 0;
        let mut last_batch_len = 0;

        for page in 1..=ADMIN_MAX_PAGES {
            let url = reqwest::Url::parse_with_params(
                &format!("{}/auth/v1/admin/users", self.base_url),
                &[
                    ("page", page.to_string()),
                    ("per_page", ADMIN_PAGE_SIZE.to_string()),
                ],
            )
            .map_err(|e| AppError::InternalError(format!("Failed to build URL: {}", e)))?;

            let response = self
                .client
                .get(url)
                .header("apikey", &self.service_role_key)
                .bearer_auth(&self.service_role_key)
                .send()
                .await
                .map_err(|e| AppError::InternalError(format!("Admin users request failed: {}", e)))?;

            if !response.status().is_success() {
                let status = response.status();
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(AppError::InternalError(format!(
                    "Admin users endpoint returned {}: {}",
                    status, error_text
                )));
            }

            let batch: AdminUsersPage = response.json().await.map_err(|e| {
                AppError::InternalError(format!("Failed to parse admin users response: {}", e))
            })?;

            pages_read = page;
            last_batch_len = batch.users.len();
            confirmed.extend(batch.users.into_iter().filter(is_email_confirmed));

            if last_batch_len < ADMIN_PAGE_SIZE {
                break;
            }
        }

        if page_cap_reached(pages_read, last_batch_len) {
            tracing::warn!(
                "Admin user listing truncated after {} pages of {} users, {} confirmed users returned",
                ADMIN_MAX_PAGES,
                ADMIN_PAGE_SIZE,
                confirmed.len()
            );
        }

        Ok(confirmed)
    }
}

/// A full last page at the page cap means more users may exist.
fn page_cap_reached(pages_read: usize, last_batch_len: usize) -> bool {
    pages_read >= ADMIN_MAX_PAGES && last_batch_len >= ADMIN_PAGE_SIZE
}

fn is_email_confirmed(user: &Value) -> bool {
    user.get("email_confirmed_at")
        .is_some_and(|confirmed| !confirmed.is_null())
}

/// Hex SHA-256 of the token, used as cache key.
pub fn token_fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Extracts the bearer credential from the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::MissingApiKey)?;

    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .unwrap_or_default();

    if token.is_empty() {
        return Err(AppError::MissingApiKey);
    }
    Ok(token)
}

/// Authenticates the request. Must run before any data access.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<CallerIdentity, AppError> {
    let token = bearer_token(headers)?;
    state.auth.verify_token(token).await
}

/// Authenticates the request and requires the configured admin role.
pub async fn authenticate_admin(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<CallerIdentity, AppError> {
    let caller = authenticate(state, headers).await?;
    if !caller.has_role(&state.config.admin_role) {
        return Err(AppError::Forbidden(format!(
            "Role '{}' required",
            state.config.admin_role
        )));
    }
    Ok(caller)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer_token_requires_scheme_and_value() {
        assert!(matches!(bearer_token(&HeaderMap::new()), Err(AppError::MissingApiKey)));
        assert!(matches!(bearer_token(&headers_with("Basic abc")), Err(AppError::MissingApiKey)));
        assert!(matches!(bearer_token(&headers_with("Bearer   ")), Err(AppError::MissingApiKey)));
        assert_eq!(bearer_token(&headers_with("Bearer abc.def")).unwrap(), "abc.def");
    }

    #[test]
    fn only_a_full_page_at_the_cap_truncates() {
        assert!(page_cap_reached(ADMIN_MAX_PAGES, ADMIN_PAGE_SIZE));
        assert!(!page_cap_reached(ADMIN_MAX_PAGES, ADMIN_PAGE_SIZE - 1));
        assert!(!page_cap_reached(ADMIN_MAX_PAGES - 1, ADMIN_PAGE_SIZE));
        assert!(!page_cap_reached(0, 0));
    }

    #[test]
    fn role_is_read_from_app_metadata() {
        let mut caller = CallerIdentity {
            id: Uuid::new_v4(),
            email: None,
            app_metadata: json!({"role": "admin"}),
        };
        assert!(caller.has_role("admin"));
        assert!(!caller.has_role("editor"));

        caller.app_metadata = json!({"roles": ["editor", "admin"]});
        assert!(caller.has_role("admin"));

        caller.app_metadata = Value::Null;
        assert!(!caller.has_role("admin"));
    }

    #[test]
    fn fingerprint_is_stable_hex() {
        let a = token_fingerprint("token");
        assert_eq!(a, token_fingerprint("token"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, token_fingerprint("other"));
    }

    #[test]
    fn unconfirmed_users_are_filtered() {
        assert!(is_email_confirmed(&json!({"email_confirmed_at": "2024-01-01T00:00:00Z"})));
        assert!(!is_email_confirmed(&json!({"email_confirmed_at": null})));
        assert!(!is_email_confirmed(&json!({})));
    }
}
