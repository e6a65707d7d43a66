//! venues.rs
//!
//! Venue search proxies for the event form and the user's saved venues.

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{ApiError, ValidatedJson};
use crate::middleware::AuthUser;
use crate::models::SaveVenueRequest;
use crate::search_client::SearchType;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/facebook/search", get(facebook_search))
        .route("/places/autocomplete", get(places_autocomplete))
        .route("/venues/saved", get(saved_venues))
        .route("/venues/save", post(save_venue))
}

#[derive(Debug, Deserialize)]
struct FacebookQuery {
    q: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// GET /api/facebook/search?q=&type=
async fn facebook_search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FacebookQuery>,
) -> impl IntoResponse {
    let query = params.q.unwrap_or_default();
    let results = state
        .venues
        .search_facebook(query.trim(), SearchType::parse(params.kind.as_deref()))
        .await;
    debug!(query = %query, count = results.len(), "Facebook venue search");
    Json(json!({ "data": results }))
}

#[derive(Debug, Deserialize)]
struct AutocompleteQuery {
    input: Option<String>,
}

/// GET /api/places/autocomplete?input=
async fn places_autocomplete(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AutocompleteQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let input = params
        .input
        .filter(|i| !i.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Input parameter is required"))?;

    Ok(Json(state.venues.autocomplete(input.trim()).await))
}

/// GET /api/venues/saved
async fn saved_venues(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let venues = state.storage.list_saved_venues(user.user_id).await?;
    Ok(Json(json!({ "venues": venues })))
}

/// POST /api/venues/save
async fn save_venue(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<SaveVenueRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (venue, created) = state.storage.save_venue(user.user_id, req).await?;
    let message = if created {
        "Venue saved successfully"
    } else {
        "Venue usage updated"
    };
    info!(venue_id = %venue.id, use_count = venue.use_count, "{}", message);

    Ok(Json(json!({ "venue": venue, "message": message })))
}
