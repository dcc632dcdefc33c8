use axum::{
    extract::{rejection::JsonRejection, Extension, Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::permission::PermissionScope;

/// Generic CRUD handlers for the protected resource routers. The resource
/// being served arrives via the [`PermissionScope`] extension inserted by
/// the permission middleware, so one set of handlers covers every resource.

/// GET /api/{resource}
pub async fn list(
    State(state): State<AppState>,
    Extension(scope): Extension<PermissionScope>,
) -> Result<Json<Value>, ApiError> {
    let data = state.upstream.list(scope.resource).await?;
    Ok(envelope(data))
}

/// GET /api/{resource}/:id
pub async fn fetch(
    State(state): State<AppState>,
    Extension(scope): Extension<PermissionScope>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let data = state.upstream.fetch(scope.resource, &id).await?;
    Ok(envelope(data))
}

/// POST /api/{resource}
pub async fn create(
    State(state): State<AppState>,
    Extension(scope): Extension<PermissionScope>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(payload) = payload?;
    if !payload.is_object() {
        return Err(ApiError::invalid_request("Request body must be a JSON object"));
    }
    let data = state.upstream.create(scope.resource, payload).await?;
    Ok(envelope(data))
}

/// PUT|PATCH /api/{resource}/:id
pub async fn update(
    State(state): State<AppState>,
    Extension(scope): Extension<PermissionScope>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(payload) = payload?;
    if !payload.is_object() {
        return Err(ApiError::invalid_request("Request body must be a JSON object"));
    }
    let data = state.upstream.update(scope.resource, &id, payload).await?;
    Ok(envelope(data))
}

/// DELETE /api/{resource}/:id
pub async fn remove(
    State(state): State<AppState>,
    Extension(scope): Extension<PermissionScope>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let data = state.upstream.remove(scope.resource, &id).await?;
    Ok(envelope(data))
}

fn envelope(data: Value) -> Json<Value> {
    Json(json!({
        "status": "success",
        "data": data,
    }))
}
