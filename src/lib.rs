pub mod auth;
pub mod cache;
pub mod calendar;
pub mod config;
pub mod controllers;
pub mod error;
pub mod middleware;
pub mod models;
pub mod notifications;
pub mod redis_client;
pub mod search_client;
pub mod storage;
pub mod utils;

use axum::{routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use auth::IdTokenVerifier;
use cache::CacheService;
use calendar::CalendarService;
use config::Config;
use notifications::{NotificationHandle, NotificationHub};
use search_client::VenueSearchClient;
use storage::Storage;

// Shared state for the whole application
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub cache: Option<CacheService>,
    pub calendars: CalendarService,
    pub notifications: NotificationHandle,
    pub venues: VenueSearchClient,
    pub id_tokens: IdTokenVerifier,
    pub config: Config,
}

impl AppState {
    /// Builds the outbound clients and starts the notification hub.
    /// Must run inside a tokio runtime.
    pub fn new(
        config: Config,
        storage: Arc<dyn Storage>,
        cache: Option<CacheService>,
    ) -> Result<Arc<Self>, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.app.http_timeout_seconds))
            .build()?;

        let calendars = CalendarService::from_config(http.clone(), &config);
        let venues = VenueSearchClient::new(http.clone(), config.venues.clone());
        let id_tokens = IdTokenVerifier::new(
            http,
            config.google.jwks_url.clone(),
            config.google.firebase_project_id.clone(),
        );

        Ok(Arc::new(Self {
            storage,
            cache,
            calendars,
            notifications: NotificationHub::spawn(),
            venues,
            id_tokens,
            config,
        }))
    }
}

/// The full HTTP surface: health checks, `/ws` and the REST API under `/api`.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Sam Hébert Events API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        .merge(controllers::ws::routes())
        .nest("/api", controllers::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
