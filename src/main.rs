use std::net::SocketAddr;
use std::sync::Arc;

use ecohub_gateway::app::{router, AppState};
use ecohub_gateway::cache::{Clock, KeyValueBackend, MemoryBackend, RedisBackend, SystemClock};
use ecohub_gateway::config::AppConfig;
use ecohub_gateway::services::{DemoUpstream, StaticCredentials};

#[tokio::main]
async fn main() {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ecohub_gateway=info,tower_http=info".into()),
        )
        .init();

    let config = AppConfig::from_env();
    tracing::info!(environment = ?config.environment, "starting EcoHub gateway");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Fall back to the in-process store when Redis is unreachable so the
    // gateway still comes up in local development.
    let backend: Arc<dyn KeyValueBackend> = match RedisBackend::connect(&config.redis).await {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            tracing::warn!("redis unavailable ({}), using in-memory store", e);
            Arc::new(MemoryBackend::new(clock.clone()))
        }
    };

    let state = AppState::new(
        config,
        backend,
        clock,
        Arc::new(StaticCredentials::seeded()),
        Arc::new(DemoUpstream::seeded()),
    )
    .unwrap_or_else(|e| panic!("invalid configuration: {}", e));

    let app = router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", addr, e));

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap_or_else(|e| panic!("server error: {}", e));
}
