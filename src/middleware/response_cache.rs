use axum::{
    body::{to_bytes, Body, HttpBody as _},
    extract::{Request, State},
    http::{HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::app::AppState;
use crate::config::CacheConfig;
use crate::middleware::auth::AuthUser;

/// Response headers never persisted or replayed; the replayed body is
/// re-framed by the server.
const SKIPPED_HEADERS: &[&str] = &["content-length", "content-encoding", "transfer-encoding"];

/// A cached upstream response, stored as JSON in the shared store.
#[derive(Debug, Serialize, Deserialize)]
struct CachedResponse {
    status: u16,
    content_type: String,
    body: String,
    headers: Vec<(String, String)>,
}

/// Route-level middleware: serve eligible GET responses from the cache,
/// marking every response with an `X-Cache: HIT|MISS` header. Store
/// failures and corrupt entries are treated as misses.
pub async fn response_cache_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let cache_config = &state.config.cache;
    if !cache_config.enabled || !is_cacheable_request(&request, cache_config) {
        return next.run(request).await;
    }

    let key = cache_key(&state, &request);

    match state.cache.get(&key).await {
        Ok(Some(value)) => match serde_json::from_value::<CachedResponse>(value) {
            Ok(cached) => {
                tracing::debug!(path = request.uri().path(), "response cache hit");
                return replay(cached);
            }
            Err(e) => {
                tracing::debug!("evicting undecodable cache entry: {}", e);
                let _ = state.cache.delete(&[key.clone()]).await;
            }
        },
        Ok(None) => {}
        Err(e) => {
            tracing::warn!("response cache unavailable, treating as miss: {}", e);
        }
    }

    let path = request.uri().path().to_string();
    let response = next.run(request).await;
    store_and_mark(&state, &key, &path, response).await
}

/// Persist a cacheable MISS response and stamp `X-Cache: MISS`.
async fn store_and_mark(state: &AppState, key: &str, path: &str, response: Response) -> Response {
    let cache_config = &state.config.cache;

    if response.status() != StatusCode::OK {
        return response;
    }

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if !content_type.starts_with("application/json") && !content_type.starts_with("text/html") {
        return response;
    }

    // An unknown exact size means a streamed body; pass it through untouched
    // rather than buffering an unbounded response.
    let Some(body_size) = response.body().size_hint().exact() else {
        return response;
    };
    if body_size > cache_config.max_body_bytes {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, cache_config.max_body_bytes as usize).await {
        Ok(bytes) => bytes,
        Err(e) => {
            // Not reachable for a sized body under the cap; the handler
            // already succeeded, so degrade rather than error.
            tracing::warn!("failed to buffer response body: {}", e);
            return Response::from_parts(parts, Body::empty());
        }
    };

    let headers = parts
        .headers
        .iter()
        .filter(|(name, _)| !SKIPPED_HEADERS.contains(&name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let cached = CachedResponse {
        status: parts.status.as_u16(),
        content_type,
        body: String::from_utf8_lossy(&bytes).into_owned(),
        headers,
    };

    let ttl = jittered_ttl(resolve_ttl(path, cache_config), cache_config.jitter_percent);
    match serde_json::to_value(&cached) {
        Ok(value) => {
            if state
                .cache
                .set(key, &value, Some(Duration::from_secs(ttl)))
                .await
            {
                tracing::debug!(path, ttl, "response cached");
            }
        }
        Err(e) => tracing::warn!("failed to encode cached response: {}", e),
    }

    parts
        .headers
        .insert("x-cache", HeaderValue::from_static("MISS"));
    Response::from_parts(parts, Body::from(bytes))
}

/// Rebuild a stored response and stamp `X-Cache: HIT`.
fn replay(cached: CachedResponse) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK));

    for (name, value) in &cached.headers {
        if SKIPPED_HEADERS.contains(&name.as_str()) {
            continue;
        }
        builder = builder.header(name, value);
    }
    builder = builder
        .header("content-type", &cached.content_type)
        .header("x-cache", "HIT");

    builder
        .body(Body::from(cached.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Only idempotent reads are cacheable, and only outside the excluded
/// path prefixes. Clients opt out per-request via Cache-Control.
fn is_cacheable_request(request: &Request, config: &CacheConfig) -> bool {
    if request.method() != Method::GET {
        return false;
    }

    if let Some(cache_control) = request
        .headers()
        .get("cache-control")
        .and_then(|v| v.to_str().ok())
    {
        let lowered = cache_control.to_ascii_lowercase();
        if lowered.contains("no-cache") || lowered.contains("no-store") {
            return false;
        }
    }

    let path = request.uri().path();
    !config
        .no_cache_paths
        .iter()
        .any(|prefix| path.starts_with(prefix.as_str()))
}

/// Cache key: SHA-256 over path, sorted query pairs, and caller identity,
/// so per-user responses never leak between callers.
fn cache_key(state: &AppState, request: &Request) -> String {
    let identity = request
        .extensions()
        .get::<AuthUser>()
        .map(|user| user.subject_id.clone())
        .unwrap_or_else(|| "anonymous".to_string());

    let mut args: Vec<(String, String)> = request
        .uri()
        .query()
        .map(|query| {
            query
                .split('&')
                .filter(|pair| !pair.is_empty())
                .map(|pair| match pair.split_once('=') {
                    Some((k, v)) => (k.to_string(), v.to_string()),
                    None => (pair.to_string(), String::new()),
                })
                .collect()
        })
        .unwrap_or_default();
    args.sort();

    let fingerprint = serde_json::json!({
        "path": request.uri().path(),
        "args": args,
        "identity": identity,
    });

    let mut hasher = Sha256::new();
    hasher.update(fingerprint.to_string().as_bytes());
    let digest = hex_digest(&hasher.finalize());

    state.cache.key(&["api", &digest])
}

fn hex_digest(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// First configured rule whose category appears in the path wins.
fn resolve_ttl(path: &str, config: &CacheConfig) -> u64 {
    for rule in &config.ttl_rules {
        if path.contains(&rule.category) {
            return rule.ttl_secs;
        }
    }
    config.default_ttl_secs
}

/// Spread expirations by +/- `percent` so hot keys fall out of the cache
/// at different moments. Never below one second.
fn jittered_ttl(ttl_secs: u64, percent: u8) -> u64 {
    if percent == 0 {
        return ttl_secs.max(1);
    }
    let spread = ttl_secs as i64 * percent as i64 / 100;
    let offset = rand::thread_rng().gen_range(-spread..=spread);
    (ttl_secs as i64 + offset).max(1) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AppState;
    use crate::cache::{ManualClock, MemoryBackend};
    use crate::config::AppConfig;
    use crate::services::{DemoUpstream, StaticCredentials};
    use axum::Json;
    use serde_json::json;
    use std::sync::Arc;

    fn cache_config() -> CacheConfig {
        AppConfig::development().cache
    }

    fn state_with(config: AppConfig) -> AppState {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let backend = Arc::new(MemoryBackend::new(clock.clone()));
        AppState::new(
            config,
            backend,
            clock,
            Arc::new(StaticCredentials::seeded()),
            Arc::new(DemoUpstream::seeded()),
        )
        .expect("valid test config")
    }

    fn get_request(uri: &str) -> Request {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn only_get_requests_are_cacheable() {
        let config = cache_config();
        let post = Request::builder()
            .method(Method::POST)
            .uri("/api/data")
            .body(Body::empty())
            .unwrap();
        assert!(!is_cacheable_request(&post, &config));
        assert!(is_cacheable_request(&get_request("/api/data"), &config));
    }

    #[test]
    fn no_cache_header_bypasses_cache() {
        let config = cache_config();
        let request = Request::builder()
            .uri("/api/data")
            .header("cache-control", "no-cache")
            .body(Body::empty())
            .unwrap();
        assert!(!is_cacheable_request(&request, &config));
    }

    #[test]
    fn excluded_path_prefixes_bypass_cache() {
        let config = cache_config();
        assert!(!is_cacheable_request(&get_request("/auth/login"), &config));
        assert!(!is_cacheable_request(
            &get_request("/api/auth/whoami"),
            &config
        ));
    }

    #[test]
    fn ttl_rules_match_first_substring() {
        let config = cache_config();
        // "user" is configured before "user_profile", so the broader
        // substring wins for any user path.
        assert_eq!(resolve_ttl("/api/user/42", &config), 86400);
        assert_eq!(resolve_ttl("/api/report", &config), config.default_ttl_secs);
    }

    #[tokio::test]
    async fn sized_json_response_is_stored_and_marked() {
        let state = state_with(AppConfig::development());
        // Handler responses carry no Content-Length at middleware time; the
        // body's exact size hint is what marks them non-streamed.
        let response = Json(json!({"items": [], "total": 0})).into_response();
        assert!(response.headers().get("content-length").is_none());

        let key = state.cache.key(&["api", "abc"]);
        let marked = store_and_mark(&state, &key, "/api/data", response).await;

        assert_eq!(marked.headers().get("x-cache").unwrap(), "MISS");
        assert!(state.cache.get(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn oversized_body_passes_through_uncached() {
        let mut config = AppConfig::development();
        config.cache.max_body_bytes = 8;
        let state = state_with(config);
        let response = Json(json!({"blob": "0123456789abcdef"})).into_response();

        let key = state.cache.key(&["api", "big"]);
        let passed = store_and_mark(&state, &key, "/api/data", response).await;

        assert!(passed.headers().get("x-cache").is_none());
        assert_eq!(state.cache.get(&key).await.unwrap(), None);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        for _ in 0..200 {
            let ttl = jittered_ttl(100, 10);
            assert!((90..=110).contains(&ttl), "ttl {} out of range", ttl);
        }
        assert_eq!(jittered_ttl(100, 0), 100);
        // Small TTLs never jitter to zero.
        assert!(jittered_ttl(1, 10) >= 1);
    }
}
