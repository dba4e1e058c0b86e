use crate::auth::{authenticate, SupabaseAuthClient};
use crate::config::Config;
use crate::errors::AppError;
use crate::models::*;
use crate::services::ProspectService;
use crate::store::CrmStore;
use crate::workflow_client::WorkflowClient;
use axum::{
    extract::{rejection::JsonRejection, FromRequestParts, Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use std::sync::Arc;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Persistence for prospects, custom tables and enrichments.
    pub store: Arc<dyn CrmStore>,
    /// Identity provider client, with the verified-token cache.
    pub auth: SupabaseAuthClient,
    /// N8N webhook client.
    pub workflows: WorkflowClient,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn CrmStore>) -> Result<Self, AppError> {
        let auth = SupabaseAuthClient::new(&config)?;
        let workflows = WorkflowClient::new(&config)?;
        Ok(Self {
            config,
            store,
            auth,
            workflows,
        })
    }
}

/// Unwraps a JSON body once the caller is authenticated, so that
/// authentication failures take precedence over payload errors.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload.map(|Json(value)| value).map_err(AppError::from)
}

/// `Path` whose rejection is an `AppError`, so a bad segment still answers
/// with the JSON envelope.
#[derive(FromRequestParts)]
#[from_request(via(Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

/// `Query` whose rejection is an `AppError`.
#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

/// Path parameters, unwrapped after authentication like `json_body`.
pub(crate) fn path_param<T>(path: Result<ApiPath<T>, AppError>) -> Result<T, AppError> {
    path.map(|ApiPath(value)| value)
}

pub(crate) fn query_params<T>(query: Result<ApiQuery<T>, AppError>) -> Result<T, AppError> {
    query.map(|ApiQuery(value)| value)
}

/// Health check endpoint.
///
/// Unauthenticated and exempt from rate limiting.
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses((status = 200, description = "Service is up", body = HealthStatus))
)]
pub async fn health() -> Json<ApiResponse<HealthStatus>> {
    Json(ApiResponse::ok(HealthStatus {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

/// GET /api/prospects
///
/// Lists the caller's prospects, newest first.
#[utoipa::path(
    get,
    path = "/api/prospects",
    tag = "prospects",
    params(
        ("limit" = Option<i64>, Query, description = "Page size, 1-500, default 50"),
        ("offset" = Option<i64>, Query, description = "Rows to skip, default 0"),
        ("search" = Option<String>, Query, description = "Case-insensitive match on nom, telephone, adresse, site_web"),
        ("min_score" = Option<i32>, Query, description = "Inclusive lower bound on score_seo"),
        ("max_score" = Option<i32>, Query, description = "Inclusive upper bound on score_seo"),
    ),
    responses(
        (status = 200, description = "One page of prospects", body = ProspectPage),
        (status = 400, description = "Invalid query parameter"),
        (status = 401, description = "Missing or invalid bearer token"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_prospects(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<ApiQuery<ListProspectsQuery>, AppError>,
) -> Result<Json<ApiResponse<ProspectPage>>, AppError> {
    let caller = authenticate(&state, &headers).await?;
    let query = query_params(query)?;
    tracing::info!("GET /prospects - user {} - {:?}", caller.id, query);

    let page = ProspectService::new(state.store.clone())
        .list(caller.id, &query)
        .await?;

    Ok(Json(ApiResponse::ok(page)))
}

/// GET /api/prospects/:id
#[utoipa::path(
    get,
    path = "/api/prospects/{id}",
    tag = "prospects",
    params(("id" = String, Path, description = "Prospect id")),
    responses(
        (status = 200, description = "The prospect", body = Prospect),
        (status = 404, description = "Unknown, malformed or foreign id"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_prospect(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    path: Result<ApiPath<String>, AppError>,
) -> Result<Json<ApiResponse<Prospect>>, AppError> {
    let caller = authenticate(&state, &headers).await?;
    let id = path_param(path)?;
    tracing::info!("GET /prospects/{} - user {}", id, caller.id);

    let prospect = ProspectService::new(state.store.clone())
        .get(caller.id, &id)
        .await?;

    Ok(Json(ApiResponse::ok(prospect)))
}

/// POST /api/prospects
///
/// Any `user_id` in the body is ignored; the owner is the caller.
#[utoipa::path(
    post,
    path = "/api/prospects",
    tag = "prospects",
    request_body = NewProspect,
    responses(
        (status = 201, description = "Created", body = Prospect),
        (status = 400, description = "Validation error"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_prospect(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<NewProspect>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Prospect>>), AppError> {
    let caller = authenticate(&state, &headers).await?;
    let payload = json_body(payload)?;
    tracing::info!("POST /prospects - user {}", caller.id);

    let prospect = ProspectService::new(state.store.clone())
        .create(caller.id, payload)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(prospect))))
}

/// PUT /api/prospects/:id
///
/// Partial update: absent fields are kept, `null` clears optional fields.
#[utoipa::path(
    put,
    path = "/api/prospects/{id}",
    tag = "prospects",
    params(("id" = String, Path, description = "Prospect id")),
    request_body = ProspectPatch,
    responses(
        (status = 200, description = "Updated", body = Prospect),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_prospect(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    path: Result<ApiPath<String>, AppError>,
    payload: Result<Json<ProspectPatch>, JsonRejection>,
) -> Result<Json<ApiResponse<Prospect>>, AppError> {
    let caller = authenticate(&state, &headers).await?;
    let id = path_param(path)?;
    let patch = json_body(payload)?;
    tracing::info!("PUT /prospects/{} - user {}", id, caller.id);

    let prospect = ProspectService::new(state.store.clone())
        .update(caller.id, &id, patch)
        .await?;

    Ok(Json(ApiResponse::ok(prospect)))
}

/// DELETE /api/prospects/:id
///
/// Succeeds whether or not a row was removed. Enrichments cascade.
#[utoipa::path(
    delete,
    path = "/api/prospects/{id}",
    tag = "prospects",
    params(("id" = String, Path, description = "Prospect id")),
    responses((status = 200, description = "Deleted", body = MessageResponse)),
    security(("bearer_auth" = []))
)]
pub async fn delete_prospect(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    path: Result<ApiPath<String>, AppError>,
) -> Result<Json<ApiResponse<MessageResponse>>, AppError> {
    let caller = authenticate(&state, &headers).await?;
    let id = path_param(path)?;
    tracing::info!("DELETE /prospects/{} - user {}", id, caller.id);

    ProspectService::new(state.store.clone())
        .delete(caller.id, &id)
        .await?;

    Ok(Json(ApiResponse::ok(MessageResponse::new(
        "Prospect deleted successfully",
    ))))
}

/// Fallback for paths no route matches.
pub async fn endpoint_not_found() -> AppError {
    AppError::EndpointNotFound
}

/// Fallback for known paths called with an unsupported method.
pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

/// `/api/tables` without a table name.
pub async fn missing_table_name() -> AppError {
    AppError::MissingTableName
}
