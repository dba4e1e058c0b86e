//! Custom tables: user-defined schemas (`/api/custom-tables`) and the
//! records stored in them (`/api/tables/:tableName`).

use crate::auth::authenticate;
use crate::errors::AppError;
use crate::handlers::{json_body, path_param, query_params, ApiPath, ApiQuery, AppState};
use crate::models::*;
use crate::services::CustomTableService;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::Value;
use std::sync::Arc;

// ============ Definitions ============

#[utoipa::path(
    get,
    path = "/api/custom-tables",
    tag = "custom-tables",
    responses((status = 200, description = "Caller's tables, newest first", body = Vec<CustomTable>)),
    security(("bearer_auth" = []))
)]
pub async fn list_custom_tables(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Vec<CustomTable>>>, AppError> {
    let caller = authenticate(&state, &headers).await?;
    tracing::info!("GET /custom-tables - user {}", caller.id);

    let tables = CustomTableService::new(state.store.clone())
        .list_tables(caller.id)
        .await?;

    Ok(Json(ApiResponse::ok(tables)))
}

#[utoipa::path(
    post,
    path = "/api/custom-tables",
    tag = "custom-tables",
    request_body = NewCustomTable,
    responses(
        (status = 201, description = "Created", body = CustomTable),
        (status = 400, description = "Invalid name or schema"),
        (status = 409, description = "Name already used by the caller"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_custom_table(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<NewCustomTable>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<CustomTable>>), AppError> {
    let caller = authenticate(&state, &headers).await?;
    let payload = json_body(payload)?;
    tracing::info!("POST /custom-tables '{}' - user {}", payload.name, caller.id);

    let table = CustomTableService::new(state.store.clone())
        .create_table(caller.id, payload)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(table))))
}

#[utoipa::path(
    put,
    path = "/api/custom-tables/{id}",
    tag = "custom-tables",
    params(("id" = String, Path, description = "Custom table id")),
    request_body = CustomTablePatch,
    responses(
        (status = 200, description = "Updated", body = CustomTable),
        (status = 404, description = "Not found"),
        (status = 409, description = "Name already used by the caller"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_custom_table(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    path: Result<ApiPath<String>, AppError>,
    payload: Result<Json<CustomTablePatch>, JsonRejection>,
) -> Result<Json<ApiResponse<CustomTable>>, AppError> {
    let caller = authenticate(&state, &headers).await?;
    let id = path_param(path)?;
    let patch = json_body(payload)?;
    tracing::info!("PUT /custom-tables/{} - user {}", id, caller.id);

    let table = CustomTableService::new(state.store.clone())
        .update_table(caller.id, &id, patch)
        .await?;

    Ok(Json(ApiResponse::ok(table)))
}

#[utoipa::path(
    delete,
    path = "/api/custom-tables/{id}",
    tag = "custom-tables",
    params(("id" = String, Path, description = "Custom table id")),
    responses((status = 200, description = "Deleted with its records", body = MessageResponse)),
    security(("bearer_auth" = []))
)]
pub async fn delete_custom_table(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    path: Result<ApiPath<String>, AppError>,
) -> Result<Json<ApiResponse<MessageResponse>>, AppError> {
    let caller = authenticate(&state, &headers).await?;
    let id = path_param(path)?;
    tracing::info!("DELETE /custom-tables/{} - user {}", id, caller.id);

    CustomTableService::new(state.store.clone())
        .delete_table(caller.id, &id)
        .await?;

    Ok(Json(ApiResponse::ok(MessageResponse::new(
        "Table deleted successfully",
    ))))
}

// ============ Records ============

#[utoipa::path(
    get,
    path = "/api/tables/{table_name}",
    tag = "tables",
    params(
        ("table_name" = String, Path, description = "Custom table name"),
        ("limit" = Option<i64>, Query, description = "Page size, 1-500, default 50"),
        ("offset" = Option<i64>, Query, description = "Rows to skip, default 0"),
    ),
    responses(
        (status = 200, description = "One page of records", body = RecordPage),
        (status = 404, description = "TABLE_NOT_FOUND"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_records(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    path: Result<ApiPath<String>, AppError>,
    query: Result<ApiQuery<PageQuery>, AppError>,
) -> Result<Json<ApiResponse<RecordPage>>, AppError> {
    let caller = authenticate(&state, &headers).await?;
    let table_name = path_param(path)?;
    let query = query_params(query)?;
    tracing::info!("GET /tables/{} - user {}", table_name, caller.id);

    let page = CustomTableService::new(state.store.clone())
        .list_records(caller.id, &table_name, &query)
        .await?;

    Ok(Json(ApiResponse::ok(page)))
}

#[utoipa::path(
    get,
    path = "/api/tables/{table_name}/{id}",
    tag = "tables",
    params(
        ("table_name" = String, Path, description = "Custom table name"),
        ("id" = String, Path, description = "Record id"),
    ),
    responses(
        (status = 200, description = "`{id, ...data, created_at, updated_at}`"),
        (status = 404, description = "TABLE_NOT_FOUND or NOT_FOUND"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_record(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    path: Result<ApiPath<(String, String)>, AppError>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let caller = authenticate(&state, &headers).await?;
    let (table_name, id) = path_param(path)?;
    tracing::info!("GET /tables/{}/{} - user {}", table_name, id, caller.id);

    let record = CustomTableService::new(state.store.clone())
        .get_record(caller.id, &table_name, &id)
        .await?;

    Ok(Json(ApiResponse::ok(record)))
}

#[utoipa::path(
    post,
    path = "/api/tables/{table_name}",
    tag = "tables",
    params(("table_name" = String, Path, description = "Custom table name")),
    request_body = Object,
    responses(
        (status = 201, description = "Created record"),
        (status = 400, description = "Body is not an object or misses a required field"),
        (status = 404, description = "TABLE_NOT_FOUND"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_record(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    path: Result<ApiPath<String>, AppError>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Value>>), AppError> {
    let caller = authenticate(&state, &headers).await?;
    let table_name = path_param(path)?;
    let service = CustomTableService::new(state.store.clone());
    tracing::info!("POST /tables/{} - user {}", table_name, caller.id);

    // Unknown table wins over a malformed body
    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            service.find_table(caller.id, &table_name).await?;
            return Err(rejection.into());
        }
    };

    let record = service.create_record(caller.id, &table_name, body).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(record))))
}

#[utoipa::path(
    put,
    path = "/api/tables/{table_name}/{id}",
    tag = "tables",
    params(
        ("table_name" = String, Path, description = "Custom table name"),
        ("id" = String, Path, description = "Record id"),
    ),
    request_body = Object,
    responses(
        (status = 200, description = "Merged record"),
        (status = 404, description = "TABLE_NOT_FOUND or NOT_FOUND"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_record(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    path: Result<ApiPath<(String, String)>, AppError>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let caller = authenticate(&state, &headers).await?;
    let (table_name, id) = path_param(path)?;
    let service = CustomTableService::new(state.store.clone());
    tracing::info!("PUT /tables/{}/{} - user {}", table_name, id, caller.id);

    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            service.find_table(caller.id, &table_name).await?;
            return Err(rejection.into());
        }
    };

    let record = service
        .update_record(caller.id, &table_name, &id, body)
        .await?;

    Ok(Json(ApiResponse::ok(record)))
}

#[utoipa::path(
    delete,
    path = "/api/tables/{table_name}/{id}",
    tag = "tables",
    params(
        ("table_name" = String, Path, description = "Custom table name"),
        ("id" = String, Path, description = "Record id"),
    ),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 404, description = "TABLE_NOT_FOUND"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_record(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    path: Result<ApiPath<(String, String)>, AppError>,
) -> Result<Json<ApiResponse<MessageResponse>>, AppError> {
    let caller = authenticate(&state, &headers).await?;
    let (table_name, id) = path_param(path)?;
    tracing::info!("DELETE /tables/{}/{} - user {}", table_name, id, caller.id);

    CustomTableService::new(state.store.clone())
        .delete_record(caller.id, &table_name, &id)
        .await?;

    Ok(Json(ApiResponse::ok(MessageResponse::new(
        "Record deleted successfully",
    ))))
}

/// PUT/DELETE on `/api/tables/:tableName` without a record id.
pub async fn missing_record_id(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    path: Result<ApiPath<String>, AppError>,
) -> Result<Json<ApiResponse<MessageResponse>>, AppError> {
    authenticate(&state, &headers).await?;
    let table_name = path_param(path)?;
    Err(AppError::MissingId(format!(
        "A record id is required: /api/tables/{}/:id",
        table_name
    )))
}
