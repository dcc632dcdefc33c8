#![allow(dead_code)]

use axum::{
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use async_trait::async_trait;
use ecohub_gateway::app::{router, AppState};
use ecohub_gateway::cache::{BackendError, Clock, KeyValueBackend, ManualClock, MemoryBackend};
use ecohub_gateway::config::AppConfig;
use ecohub_gateway::permissions::Role;
use ecohub_gateway::services::{DemoUpstream, StaticCredentials};
use std::time::Duration;

/// A fully wired gateway on an in-memory store with a controllable clock.
pub struct TestApp {
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub router: Router,
}

/// Development config with jitter disabled so cache TTLs are exact.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::development();
    config.cache.jitter_percent = 0;
    config
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(test_config())
}

pub fn spawn_app_with(config: AppConfig) -> TestApp {
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let backend = Arc::new(MemoryBackend::new(clock.clone() as Arc<dyn Clock>));
    build_app(config, backend, clock)
}

pub fn spawn_app_on(config: AppConfig, backend: Arc<dyn KeyValueBackend>) -> TestApp {
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    build_app(config, backend, clock)
}

fn build_app(
    config: AppConfig,
    backend: Arc<dyn KeyValueBackend>,
    clock: Arc<ManualClock>,
) -> TestApp {
    let state = AppState::new(
        config,
        backend,
        clock.clone(),
        Arc::new(StaticCredentials::seeded()),
        Arc::new(DemoUpstream::seeded()),
    )
    .expect("test config must be valid");
    let router = router(state.clone());
    TestApp {
        state,
        clock,
        router,
    }
}

/// Backend standing in for an unreachable store; every operation fails.
pub struct UnreachableBackend;

#[async_trait]
impl KeyValueBackend for UnreachableBackend {
    async fn get(&self, _key: &str) -> Result<Option<String>, BackendError> {
        Err(Self::offline())
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), BackendError> {
        Err(Self::offline())
    }

    async fn delete(&self, _keys: &[String]) -> Result<u64, BackendError> {
        Err(Self::offline())
    }

    async fn incr_by(&self, _key: &str, _amount: i64) -> Result<i64, BackendError> {
        Err(Self::offline())
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> Result<bool, BackendError> {
        Err(Self::offline())
    }

    async fn scan_delete(&self, _pattern: &str) -> Result<u64, BackendError> {
        Err(Self::offline())
    }

    async fn ping(&self) -> Result<(), BackendError> {
        Err(Self::offline())
    }
}

impl UnreachableBackend {
    fn offline() -> BackendError {
        BackendError::Unavailable("store offline".to_string())
    }
}

impl TestApp {
    /// Issue a token directly, bypassing the login endpoint.
    pub fn token_for(&self, subject_id: &str, role: Role) -> String {
        self.state
            .tokens
            .issue(subject_id, role)
            .expect("token issuance")
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(value) => builder
                .header("content-type", "application/json")
                .body(Body::from(value.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request construction");

        self.dispatch(request).await
    }

    async fn dispatch(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router never errors");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body read");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, token, None).await
    }

    /// GET as an anonymous caller behind the given client address.
    pub async fn get_as_ip(&self, uri: &str, ip: &str) -> TestResponse {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .expect("request construction");
        self.dispatch(request).await
    }

    /// GET with extra request headers.
    pub async fn get_with_headers(
        &self,
        uri: &str,
        token: Option<&str>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder().method(Method::GET).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::empty()).expect("request construction");
        self.dispatch(request).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    /// Log in through the real endpoint, returning (access, refresh) tokens.
    pub async fn login(&self, username: &str, password: &str) -> (String, String) {
        let response = self
            .post(
                "/auth/login",
                None,
                serde_json::json!({ "username": username, "password": password }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "login failed: {:?}", response.body);
        let data = &response.body["data"];
        (
            data["access_token"].as_str().expect("access token").to_string(),
            data["refresh_token"].as_str().expect("refresh token").to_string(),
        )
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn error_code(&self) -> Option<&str> {
        self.body["error"].as_str()
    }
}
