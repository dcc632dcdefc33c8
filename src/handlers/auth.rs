use axum::{
    extract::{rejection::JsonRejection, Extension, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::auth::AuthUser;
use crate::permissions::Role;
use crate::services::UserRecord;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

/// What a stored refresh token resolves to.
#[derive(Debug, Serialize, Deserialize)]
struct RefreshRecord {
    subject_id: String,
    username: String,
    role: Role,
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(payload) = payload?;

    if payload.username.trim().is_empty() || payload.password.is_empty() {
        return Err(ApiError::invalid_request(
            "Username and password are required",
        ));
    }

    let user = state
        .credentials
        .authenticate(&payload.username, &payload.password)
        .await
        .ok_or_else(|| ApiError::unauthorized("Invalid username or password"))?;

    let access_token = state.tokens.issue(&user.id, user.role)?;
    let refresh_token = issue_refresh_token(&state, &user).await;

    tracing::info!(user = %user.username, role = %user.role, "login succeeded");

    Ok(Json(json!({
        "status": "success",
        "message": "Login successful",
        "data": {
            "access_token": access_token,
            "token_type": "Bearer",
            "expires_in": state.config.security.token_ttl_secs,
            "refresh_token": refresh_token,
            "user": {
                "id": user.id,
                "username": user.username,
                "role": user.role,
            },
        },
    })))
}

/// POST /auth/refresh
///
/// Exchanges a stored refresh token for a fresh access token. The presented
/// token is consumed and a new one issued, so each refresh token is
/// single-use.
pub async fn refresh(
    State(state): State<AppState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(payload) = payload?;

    if payload.refresh_token.trim().is_empty() {
        return Err(ApiError::invalid_request("refresh_token is required"));
    }

    let key = state.cache.key(&["refresh", &payload.refresh_token]);
    let record = match state.cache.get(&key).await {
        Ok(Some(value)) => serde_json::from_value::<RefreshRecord>(value)
            .map_err(|_| ApiError::unauthorized("Invalid refresh token"))?,
        Ok(None) => return Err(ApiError::unauthorized("Invalid or expired refresh token")),
        Err(e) => {
            // An unreachable token store means the token cannot be verified;
            // treat the token as absent rather than trusting it.
            tracing::warn!("refresh token store unavailable: {}", e);
            return Err(ApiError::unauthorized("Invalid or expired refresh token"));
        }
    };

    if let Err(e) = state.cache.delete(&[key]).await {
        tracing::warn!("failed to revoke used refresh token: {}", e);
    }

    let user = UserRecord {
        id: record.subject_id,
        username: record.username,
        role: record.role,
    };
    let access_token = state.tokens.issue(&user.id, user.role)?;
    let refresh_token = issue_refresh_token(&state, &user).await;

    Ok(Json(json!({
        "status": "success",
        "message": "Token refreshed",
        "data": {
            "access_token": access_token,
            "token_type": "Bearer",
            "expires_in": state.config.security.token_ttl_secs,
            "refresh_token": refresh_token,
        },
    })))
}

/// POST /auth/logout
///
/// Access tokens are stateless and simply age out; logout revokes the
/// session's refresh token when the client sends it.
pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Option<Json<LogoutRequest>>,
) -> Json<Value> {
    if let Some(Json(payload)) = payload {
        if let Some(token) = payload.refresh_token {
            let key = state.cache.key(&["refresh", &token]);
            if let Err(e) = state.cache.delete(&[key]).await {
                tracing::warn!("failed to revoke refresh token: {}", e);
            }
        }
    }

    tracing::info!(user = %user.subject_id, "logout");

    Json(json!({
        "status": "success",
        "message": "Logged out",
    }))
}

/// GET /api/auth/whoami
pub async fn whoami(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Json<Value> {
    Json(json!({
        "status": "success",
        "data": {
            "id": user.subject_id,
            "role": user.role.to_json(),
            "effective_roles": state.permissions.roles_reachable_from(user.role),
        },
    }))
}

/// GET /api/auth/permissions
pub async fn permissions(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Json<Value> {
    Json(json!({
        "status": "success",
        "data": {
            "role": user.role,
            "permissions": state.permissions.permissions_for(user.role),
        },
    }))
}

async fn issue_refresh_token(state: &AppState, user: &UserRecord) -> String {
    let token = Uuid::new_v4().to_string();
    let key = state.cache.key(&["refresh", &token]);
    let record = json!({
        "subject_id": user.id,
        "username": user.username,
        "role": user.role,
    });
    let ttl = Duration::from_secs(state.config.security.refresh_ttl_secs);
    state.cache.set(&key, &record, Some(ttl)).await;
    token
}
