use crate::auth::authenticate;
use crate::errors::AppError;
use crate::handlers::{json_body, path_param, ApiPath, AppState};
use crate::models::*;
use crate::services::EnrichmentService;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;

/// GET /api/prospects/:id/enrichments
///
/// Reports and SEO audits attached to one of the caller's prospects.
#[utoipa::path(
    get,
    path = "/api/prospects/{id}/enrichments",
    tag = "enrichments",
    params(("id" = String, Path, description = "Prospect id")),
    responses(
        (status = 200, description = "Newest first", body = Vec<Enrichment>),
        (status = 404, description = "Prospect not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_enrichments(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    path: Result<ApiPath<String>, AppError>,
) -> Result<Json<ApiResponse<Vec<Enrichment>>>, AppError> {
    let caller = authenticate(&state, &headers).await?;
    let prospect_id = path_param(path)?;
    tracing::info!("GET /prospects/{}/enrichments - user {}", prospect_id, caller.id);

    let enrichments = EnrichmentService::new(state.store.clone())
        .list(caller.id, &prospect_id)
        .await?;

    Ok(Json(ApiResponse::ok(enrichments)))
}

/// POST /api/prospects/:id/enrichments
#[utoipa::path(
    post,
    path = "/api/prospects/{id}/enrichments",
    tag = "enrichments",
    params(("id" = String, Path, description = "Prospect id")),
    request_body = NewEnrichment,
    responses(
        (status = 201, description = "Created", body = Enrichment),
        (status = 404, description = "Prospect not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_enrichment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    path: Result<ApiPath<String>, AppError>,
    payload: Result<Json<NewEnrichment>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Enrichment>>), AppError> {
    let caller = authenticate(&state, &headers).await?;
    let prospect_id = path_param(path)?;
    let payload = json_body(payload)?;
    tracing::info!("POST /prospects/{}/enrichments - user {}", prospect_id, caller.id);

    let enrichment = EnrichmentService::new(state.store.clone())
        .create(caller.id, &prospect_id, payload)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(enrichment))))
}

/// PUT /api/enrichments/:id
#[utoipa::path(
    put,
    path = "/api/enrichments/{id}",
    tag = "enrichments",
    params(("id" = i64, Path, description = "Enrichment id")),
    request_body = EnrichmentPatch,
    responses(
        (status = 200, description = "Updated", body = Enrichment),
        (status = 404, description = "Not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_enrichment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    path: Result<ApiPath<String>, AppError>,
    payload: Result<Json<EnrichmentPatch>, JsonRejection>,
) -> Result<Json<ApiResponse<Enrichment>>, AppError> {
    let caller = authenticate(&state, &headers).await?;
    let id = path_param(path)?;
    let patch = json_body(payload)?;
    tracing::info!("PUT /enrichments/{} - user {}", id, caller.id);

    let enrichment = EnrichmentService::new(state.store.clone())
        .update(caller.id, &id, patch)
        .await?;

    Ok(Json(ApiResponse::ok(enrichment)))
}

/// DELETE /api/enrichments/:id
#[utoipa::path(
    delete,
    path = "/api/enrichments/{id}",
    tag = "enrichments",
    params(("id" = i64, Path, description = "Enrichment id")),
    responses((status = 200, description = "Deleted", body = MessageResponse)),
    security(("bearer_auth" = []))
)]
pub async fn delete_enrichment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    path: Result<ApiPath<String>, AppError>,
) -> Result<Json<ApiResponse<MessageResponse>>, AppError> {
    let caller = authenticate(&state, &headers).await?;
    let id = path_param(path)?;
    tracing::info!("DELETE /enrichments/{} - user {}", id, caller.id);

    EnrichmentService::new(state.store.clone())
        .delete(caller.id, &id)
        .await?;

    Ok(Json(ApiResponse::ok(MessageResponse::new(
        "Enrichment deleted successfully",
    ))))
}
