use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::auth::AuthUser;
use crate::rate_limit::{RateClass, RateDecision};

/// Route-level middleware: count the request against the caller's
/// fixed-window quota and reject with 429 once it is exhausted.
///
/// When the counter store is unreachable the request is admitted uncounted;
/// rate limiting degrades rather than taking the gateway down with it.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.limiter.enabled() {
        return next.run(request).await;
    }

    let (identifier, class) = resolve_identity(&request);

    let decision = match state.limiter.check(&identifier, class).await {
        Ok(decision) => decision,
        Err(e) => {
            tracing::warn!(
                identifier = %identifier,
                "rate limit store unavailable, admitting request: {}",
                e
            );
            return next.run(request).await;
        }
    };

    if !decision.allowed {
        tracing::info!(
            identifier = %identifier,
            class = class.name(),
            used = decision.used,
            limit = decision.limit,
            "rate limit exceeded"
        );
        let mut response =
            ApiError::rate_limited("Rate limit exceeded, please retry later").into_response();
        apply_headers(response.headers_mut(), &decision);
        return response;
    }

    let mut response = next.run(request).await;
    apply_headers(response.headers_mut(), &decision);
    response
}

/// Who the request counts against. Authenticated callers are tracked per
/// user id; anonymous callers per client address.
fn resolve_identity(request: &Request) -> (String, RateClass) {
    if let Some(user) = request.extensions().get::<AuthUser>() {
        return (
            format!("user:{}", user.subject_id),
            RateClass::for_role(user.role),
        );
    }
    (format!("ip:{}", client_addr(request)), RateClass::Anonymous)
}

/// Client address, preferring the first X-Forwarded-For hop.
fn client_addr(request: &Request) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn apply_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    if let Ok(value) = HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert("x-ratelimit-limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert("x-ratelimit-remaining", value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.reset_at.to_string()) {
        headers.insert("x-ratelimit-reset", value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with_forwarded(value: &str) -> Request {
        Request::builder()
            .uri("/api/data")
            .header("x-forwarded-for", value)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn forwarded_header_wins() {
        let request = request_with_forwarded("203.0.113.9, 10.0.0.1");
        assert_eq!(client_addr(&request), "203.0.113.9");
    }

    #[test]
    fn blank_forwarded_entry_is_ignored() {
        let request = request_with_forwarded("  ");
        assert_eq!(client_addr(&request), "unknown");
    }

    #[test]
    fn anonymous_identity_uses_client_address() {
        let request = request_with_forwarded("198.51.100.4");
        let (identifier, class) = resolve_identity(&request);
        assert_eq!(identifier, "ip:198.51.100.4");
        assert!(matches!(class, RateClass::Anonymous));
    }
}
