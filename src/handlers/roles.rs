use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::error::ApiError;
use crate::permissions::Role;

/// GET /api/roles
pub async fn list() -> Json<Value> {
    let roles: Vec<Value> = Role::ALL.iter().map(Role::to_json).collect();
    Json(json!({
        "status": "success",
        "data": { "roles": roles, "total": Role::ALL.len() },
    }))
}

/// GET /api/roles/:code
pub async fn show(Path(code): Path<String>) -> Result<Json<Value>, ApiError> {
    let role = lookup(&code)?;
    Ok(Json(json!({
        "status": "success",
        "data": role.to_json(),
    })))
}

/// GET /api/roles/:code/permissions
pub async fn permissions(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let role = lookup(&code)?;
    Ok(Json(json!({
        "status": "success",
        "data": {
            "role": role.to_json(),
            "effective_roles": state.permissions.roles_reachable_from(role),
            "permissions": state.permissions.permissions_for(role),
        },
    })))
}

fn lookup(code: &str) -> Result<Role, ApiError> {
    Role::from_code(code)
        .ok_or_else(|| ApiError::not_found(format!("Unknown role '{}'", code)))
}
