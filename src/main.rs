use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sam_events::{
    app,
    cache::CacheService,
    config::Config,
    redis_client::RedisClient,
    storage::{MemoryStorage, PgStorage, Storage},
    AppState,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("Invalid configuration")?;

    let json_logs = config.app.log_format == "json";
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.app.rust_log))
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(|| tracing_subscriber::fmt::layer()))
        .init();

    info!(environment = %config.app.environment, "Starting Sam Hébert events API");

    // Storage
    let storage: Arc<dyn Storage> = if config.database.url.starts_with("memory://") {
        warn!("Using in-memory storage, data is lost on restart");
        Arc::new(MemoryStorage::new())
    } else {
        let pg = PgStorage::connect(&config.database.url, config.database.pool_size)
            .await
            .context("Failed to connect to database")?;
        info!("Database connected");
        pg.run_migrations().await.context("Failed to run migrations")?;
        Arc::new(pg)
    };

    // Optional session cache
    let cache = match &config.redis {
        Some(redis_config) => {
            let redis = RedisClient::new(&redis_config.url)
                .await
                .context("Failed to connect to Redis")?;
            Some(CacheService::new(redis, redis_config.session_cache_seconds))
        }
        None => None,
    };

    let app_state = AppState::new(config.clone(), storage, cache)
        .context("Failed to build HTTP client")?;

    // --- Background tasks ---

    // Expired sessions are dropped every 5 minutes
    let purge_state = app_state.clone();
    task::spawn(async move {
        loop {
            match purge_state.storage.purge_expired_sessions(chrono::Utc::now()).await {
                Ok(0) => {}
                Ok(n) => info!("Purged {} expired sessions", n),
                Err(e) => error!("Session purge failed: {}", e),
            }
            tokio::time::sleep(SESSION_PURGE_INTERVAL).await;
        }
    });

    // --- Web server ---

    let origin: HeaderValue = config
        .app
        .public_base_url
        .parse()
        .context("PUBLIC_BASE_URL is not a valid origin")?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let app = app(app_state).layer(cors);

    let addr: SocketAddr = format!("{}:{}", config.app.host, config.app.port)
        .parse()
        .context("Invalid HOST/PORT")?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
