//! Automation actions proxied to the N8N workflow engine.
//!
//! The engine's JSON answer is returned as-is inside the success envelope.

use crate::auth::authenticate;
use crate::errors::AppError;
use crate::handlers::{json_body, AppState};
use crate::models::*;
use crate::services::WorkflowService;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};
use serde_json::Value;
use std::sync::Arc;

fn workflow_service(state: &AppState) -> WorkflowService {
    WorkflowService::new(state.store.clone(), state.workflows.clone())
}

#[utoipa::path(
    post,
    path = "/api/workflows/generate-prospects",
    tag = "workflows",
    request_body = GenerateProspectsRequest,
    responses(
        (status = 200, description = "Engine response"),
        (status = 502, description = "WORKFLOW_ERROR"),
        (status = 503, description = "WORKFLOW_NOT_CONFIGURED"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn generate_prospects(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<GenerateProspectsRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let caller = authenticate(&state, &headers).await?;
    let request = json_body(payload)?;
    tracing::info!(
        "POST /workflows/generate-prospects '{}' in '{}' - user {}",
        request.query,
        request.localisation,
        caller.id
    );

    let result = workflow_service(&state)
        .generate_prospects(caller.id, request)
        .await?;

    Ok(Json(ApiResponse::ok(result)))
}

#[utoipa::path(
    post,
    path = "/api/workflows/seo-audit",
    tag = "workflows",
    request_body = SeoAuditRequest,
    responses(
        (status = 200, description = "Engine response"),
        (status = 404, description = "Prospect not found"),
        (status = 502, description = "WORKFLOW_ERROR"),
        (status = 503, description = "WORKFLOW_NOT_CONFIGURED"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn seo_audit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<SeoAuditRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let caller = authenticate(&state, &headers).await?;
    let request = json_body(payload)?;
    tracing::info!(
        "POST /workflows/seo-audit {} - user {}",
        request.prospect_id,
        caller.id
    );

    let result = workflow_service(&state).seo_audit(caller.id, request).await?;

    Ok(Json(ApiResponse::ok(result)))
}

#[utoipa::path(
    post,
    path = "/api/workflows/prospection-email",
    tag = "workflows",
    request_body = ProspectionEmailRequest,
    responses(
        (status = 200, description = "Engine response"),
        (status = 404, description = "None of the prospects belong to the caller"),
        (status = 502, description = "WORKFLOW_ERROR"),
        (status = 503, description = "WORKFLOW_NOT_CONFIGURED"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn prospection_email(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<ProspectionEmailRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let caller = authenticate(&state, &headers).await?;
    let request = json_body(payload)?;
    tracing::info!(
        "POST /workflows/prospection-email ({} prospects) - user {}",
        request.prospect_ids.len(),
        caller.id
    );

    let result = workflow_service(&state)
        .prospection_email(caller.id, request)
        .await?;

    Ok(Json(ApiResponse::ok(result)))
}
