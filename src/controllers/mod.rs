pub mod analytics;
pub mod auth;
pub mod calendar;
pub mod events;
pub mod venues;
pub mod ws;

use axum::Router;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::calendar::{RefreshedToken, SyncReport};
use crate::error::ApiError;
use crate::models::{Event, IntegrationChanges};
use crate::AppState;

/// Routes mounted under `/api`.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(auth::routes())
        .merge(analytics::routes())
        .merge(events::routes())
        .merge(calendar::routes())
        .merge(venues::routes())
}

pub(crate) async fn persist_refreshed_tokens(
    state: &AppState,
    user_id: Uuid,
    tokens: &[RefreshedToken],
) {
    for token in tokens {
        let changes = IntegrationChanges {
            access_token: Some(token.access_token.clone()),
            expires_at: token.expires_at,
            ..Default::default()
        };
        if let Err(e) = state
            .storage
            .update_integration(token.integration_id, user_id, changes)
            .await
        {
            warn!(integration_id = %token.integration_id, "Failed to store refreshed token: {}", e);
        }
    }
}

/// Stores refreshed tokens and any new external ids; returns the event when ids changed.
pub(crate) async fn persist_sync_report(
    state: &AppState,
    user_id: Uuid,
    event_id: Uuid,
    report: &SyncReport,
) -> Result<Option<Event>, ApiError> {
    persist_refreshed_tokens(state, user_id, &report.refreshed_tokens).await;

    let ids = report.external_ids();
    if ids.is_empty() {
        return Ok(None);
    }
    Ok(state.storage.set_external_ids(event_id, user_id, ids).await?)
}
