use crate::auth::authenticate_admin;
use crate::errors::AppError;
use crate::handlers::AppState;
use crate::models::ApiResponse;
use axum::{extract::State, http::HeaderMap, Json};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminUserList {
    #[schema(value_type = Vec<Object>)]
    pub users: Vec<Value>,
}

/// GET /api/admin/users
///
/// Identity-provider users with a confirmed email. Requires the admin role
/// in the caller's `app_metadata`.
#[utoipa::path(
    get,
    path = "/api/admin/users",
    tag = "admin",
    responses(
        (status = 200, description = "Confirmed users", body = AdminUserList),
        (status = 403, description = "Caller lacks the admin role"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<AdminUserList>>, AppError> {
    let caller = authenticate_admin(&state, &headers).await?;
    tracing::info!("GET /admin/users - admin {}", caller.id);

    let users = state.auth.list_confirmed_users().await?;
    tracing::info!("Returning {} confirmed users", users.len());

    Ok(Json(ApiResponse::ok(AdminUserList { users })))
}
