//! analytics.rs
//!
//! Dashboard counters for the signed-in performer.

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use std::sync::Arc;

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::storage::month_bounds;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/events/stats", get(event_stats))
}

/// GET /api/events/stats
///
/// `monthlyEvents` counts events dated in the current calendar month (UTC).
async fn event_stats(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let (month_start, month_end) = month_bounds(Utc::now().date_naive());
    let stats = state
        .storage
        .event_stats(user.user_id, month_start, month_end)
        .await?;

    tracing::debug!(
        user_id = %user.user_id,
        monthly = stats.monthly_events,
        published = stats.published_events,
        "Event stats computed"
    );
    Ok(Json(stats))
}
