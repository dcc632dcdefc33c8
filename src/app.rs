use axum::{
    extract::State,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::{TokenError, TokenService};
use crate::cache::{CacheStore, Clock, KeyValueBackend};
use crate::config::AppConfig;
use crate::handlers;
use crate::middleware::{
    authenticate_middleware, rate_limit_middleware, require_auth, require_permission,
    response_cache_middleware, PermissionScope,
};
use crate::permissions::{PermissionMatrix, Resource};
use crate::rate_limit::RateLimiter;
use crate::services::{CredentialStore, Upstream};

/// Shared application state. Cheap to clone; every component sits behind
/// an Arc, and the collaborator seams are trait objects so tests can swap
/// in in-memory stands-ins.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub tokens: Arc<TokenService>,
    pub permissions: Arc<PermissionMatrix>,
    pub cache: CacheStore,
    pub limiter: Arc<RateLimiter>,
    pub credentials: Arc<dyn CredentialStore>,
    pub upstream: Arc<dyn Upstream>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        backend: Arc<dyn KeyValueBackend>,
        clock: Arc<dyn Clock>,
        credentials: Arc<dyn CredentialStore>,
        upstream: Arc<dyn Upstream>,
    ) -> Result<Self, TokenError> {
        let cache = CacheStore::new(
            backend,
            &config.redis.key_prefix,
            config.cache.default_ttl_secs,
        );
        let tokens = TokenService::new(
            &config.security.jwt_secret,
            config.security.token_ttl_secs,
        )?;
        let limiter = RateLimiter::new(cache.clone(), clock, config.rate_limit.clone());

        Ok(Self {
            config: Arc::new(config),
            tokens: Arc::new(tokens),
            permissions: Arc::new(PermissionMatrix::standard()),
            cache,
            limiter: Arc::new(limiter),
            credentials,
            upstream,
        })
    }
}

/// Build the full application router.
///
/// Every route carries the response cache innermost and the rate limiter
/// above it; protected routes add permission evaluation and, outermost,
/// token enforcement. Requests therefore flow
/// auth -> permission -> rate limit -> cache -> handler.
pub fn router(state: AppState) -> Router {
    let public = pipeline(
        &state,
        Router::new()
            .route("/", get(root))
            .route("/health", get(health))
            .route("/auth/login", post(handlers::auth::login))
            .route("/auth/refresh", post(handlers::auth::refresh)),
    );

    let session = protected(
        &state,
        Router::new()
            .route("/auth/logout", post(handlers::auth::logout))
            .route("/api/auth/whoami", get(handlers::auth::whoami))
            .route("/api/auth/permissions", get(handlers::auth::permissions))
            .route("/api/roles", get(handlers::roles::list))
            .route("/api/roles/:code", get(handlers::roles::show))
            .route("/api/roles/:code/permissions", get(handlers::roles::permissions)),
    );

    let mut app = public.merge(session);
    for resource in Resource::ALL {
        app = app.merge(guarded(&state, resource, resource_routes(resource)));
    }

    let app = app
        .layer(middleware::from_fn_with_state(
            state.clone(),
            authenticate_middleware,
        ))
        .layer(TraceLayer::new_for_http());

    let app = if state.config.security.enable_cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    };

    app.with_state(state)
}

/// CRUD routes for one protected resource, served by the generic handlers.
fn resource_routes(resource: Resource) -> Router<AppState> {
    Router::new()
        .route(
            &format!("/api/{}", resource),
            get(handlers::resources::list).post(handlers::resources::create),
        )
        .route(
            &format!("/api/{}/:id", resource),
            get(handlers::resources::fetch)
                .put(handlers::resources::update)
                .patch(handlers::resources::update)
                .delete(handlers::resources::remove),
        )
}

/// Response cache and rate limiting for a sub-router. Layers run outermost
/// last, so the cache is added first to sit directly above the handlers.
fn pipeline(state: &AppState, router: Router<AppState>) -> Router<AppState> {
    router
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            response_cache_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
}

/// [`pipeline`] plus token enforcement for routes that need a caller but
/// no resource permission.
fn protected(state: &AppState, router: Router<AppState>) -> Router<AppState> {
    pipeline(state, router).route_layer(middleware::from_fn(require_auth))
}

/// Full pipeline for a resource router: cache, rate limit, permission
/// check scoped to `resource`, then token enforcement outermost.
fn guarded(state: &AppState, resource: Resource, router: Router<AppState>) -> Router<AppState> {
    pipeline(state, router)
        .route_layer(middleware::from_fn_with_state(
            (state.clone(), PermissionScope { resource }),
            require_permission,
        ))
        .route_layer(middleware::from_fn(require_auth))
}

async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "name": "EcoHub API Gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "endpoints": {
            "health": "/health",
            "login": "POST /auth/login",
            "refresh": "POST /auth/refresh",
            "whoami": "GET /api/auth/whoami",
            "resources": "/api/{user,data,report,setting}",
        },
    }))
}

/// Liveness plus a store ping. The gateway keeps serving (uncached,
/// unthrottled) without the store, so a store outage reports as degraded
/// rather than failing the check.
async fn health(State(state): State<AppState>) -> Json<Value> {
    let store_status = match state.cache.ping().await {
        Ok(()) => "healthy",
        Err(e) => {
            tracing::warn!("store ping failed: {}", e);
            "unavailable"
        }
    };

    Json(json!({
        "status": if store_status == "healthy" { "healthy" } else { "degraded" },
        "services": {
            "gateway": "healthy",
            "store": store_status,
        },
    }))
}
