use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::app::AppState;
use crate::auth::TokenError;
use crate::error::ApiError;
use crate::permissions::Role;

/// Authenticated user context extracted from a verified JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub subject_id: String,
    pub role: Role,
}

/// How a bearer token failed verification. Expiry and malformation are
/// distinct, separately observable outcomes.
#[derive(Clone, Debug)]
pub enum TokenFailure {
    Expired,
    Invalid(String),
}

impl TokenFailure {
    pub fn to_api_error(&self) -> ApiError {
        match self {
            TokenFailure::Expired => ApiError::unauthorized("Token has expired"),
            TokenFailure::Invalid(msg) => ApiError::unauthorized(msg.clone()),
        }
    }
}

/// Outcome of bearer-token resolution, attached to every request so the
/// rate limiter and response cache can resolve identity on public routes too.
#[derive(Clone, Debug)]
pub enum AuthState {
    /// No Authorization header presented.
    Anonymous,
    Authenticated(AuthUser),
    /// A token was presented but did not verify.
    Failed(TokenFailure),
}

/// Global middleware: verify the bearer token if one is present and attach
/// the result. Never rejects by itself; protected routes enforce via
/// [`require_auth`].
pub async fn authenticate_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_state = resolve(&state, request.headers());

    if let AuthState::Authenticated(user) = &auth_state {
        request.extensions_mut().insert(user.clone());
    }
    request.extensions_mut().insert(auth_state);

    next.run(request).await
}

/// Route-level middleware: reject the request unless token verification
/// succeeded. Runs before any permission evaluation, unconditionally, so a
/// verification failure is always reported as 401 rather than 403.
pub async fn require_auth(request: Request, next: Next) -> Result<Response, ApiError> {
    match request.extensions().get::<AuthState>() {
        Some(AuthState::Authenticated(_)) => Ok(next.run(request).await),
        Some(AuthState::Failed(failure)) => Err(failure.to_api_error()),
        _ => Err(ApiError::unauthorized("Missing access token")),
    }
}

fn resolve(state: &AppState, headers: &HeaderMap) -> AuthState {
    let token = match extract_bearer(headers) {
        None => return AuthState::Anonymous,
        Some(Err(msg)) => return AuthState::Failed(TokenFailure::Invalid(msg)),
        Some(Ok(token)) => token,
    };

    match state.tokens.verify(&token) {
        Ok(claims) => AuthState::Authenticated(AuthUser {
            subject_id: claims.sub,
            role: claims.role,
        }),
        Err(TokenError::Expired) => AuthState::Failed(TokenFailure::Expired),
        Err(e) => AuthState::Failed(TokenFailure::Invalid(e.to_string())),
    }
}

/// Extract the bearer token from the Authorization header.
/// `None` means no header at all; `Some(Err)` means a malformed header.
fn extract_bearer(headers: &HeaderMap) -> Option<Result<String, String>> {
    let auth_header = headers.get("authorization")?;

    let auth_str = match auth_header.to_str() {
        Ok(s) => s,
        Err(_) => return Some(Err("Invalid Authorization header format".to_string())),
    };

    match auth_str.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Some(Ok(token.to_string())),
        Some(_) => Some(Err("Empty bearer token".to_string())),
        None => Some(Err(
            "Authorization header must use Bearer token format".to_string(),
        )),
    }
}
