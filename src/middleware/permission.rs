use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::auth::AuthUser;
use crate::permissions::{Action, Resource};

/// The resource a protected sub-router serves. Inserted as an extension so
/// the generic CRUD handlers know which resource they are operating on.
#[derive(Clone, Copy, Debug)]
pub struct PermissionScope {
    pub resource: Resource,
}

/// Route-level middleware: check the caller's role against the permission
/// table for the scoped resource, deriving the action from the HTTP method.
/// Runs inside [`require_auth`](crate::middleware::auth::require_auth), so
/// an authenticated user is normally present; fails closed otherwise.
pub async fn require_permission(
    State((state, scope)): State<(AppState, PermissionScope)>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(user) = request.extensions().get::<AuthUser>().cloned() else {
        return Err(ApiError::unauthorized("Missing access token"));
    };

    let Some(action) = Action::from_method(request.method()) else {
        return Err(ApiError::invalid_request(format!(
            "Method {} is not supported on /api/{}",
            request.method(),
            scope.resource
        )));
    };

    if !state.permissions.is_allowed(user.role, scope.resource, action) {
        tracing::debug!(
            role = %user.role,
            resource = %scope.resource,
            action = %action,
            "permission denied"
        );
        return Err(ApiError::forbidden(format!(
            "Role '{}' is not allowed to {} {}",
            user.role, action, scope.resource
        )));
    }

    request.extensions_mut().insert(scope);
    Ok(next.run(request).await)
}
