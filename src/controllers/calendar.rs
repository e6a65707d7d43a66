//! calendar.rs
//!
//! Calendar integrations, the connection test and the `.ics` export.

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::json;
use std::slice;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{persist_refreshed_tokens, persist_sync_report};
use crate::calendar::SyncOutcome;
use crate::error::{ApiError, ValidatedJson};
use crate::middleware::AuthUser;
use crate::models::{CalendarProvider, IntegrationChanges, NewCalendarIntegration};
use crate::AppState;

const NOT_FOUND: &str = "Intégration non trouvée";
const EXPORT_FILENAME: &str = "sam-hebert-evenements.ics";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/calendar/test", get(test_connection))
        .route("/calendar/export", get(export_calendar))
        .route(
            "/calendar/integrations",
            get(list_integrations).post(create_integration),
        )
        .route(
            "/calendar-integrations",
            get(list_integrations).post(create_integration),
        )
        .route(
            "/calendar-integrations/{id}",
            patch(update_integration).delete(delete_integration),
        )
        .route("/calendar-integrations/{id}/sync", post(sync_integration))
}

/// GET /api/calendar/test
///
/// Inserts a throwaway event through the user's active Google integration.
async fn test_connection(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let oauth = state.calendars.oauth();
    let has_credentials = json!({
        "clientId": state.config.google.client_id.is_some(),
        "clientSecret": state.config.google.client_secret.is_some(),
        "oauthClient": oauth.has_credentials(),
    });

    let Some(integration) = state
        .storage
        .get_active_integration(user.user_id, CalendarProvider::Google)
        .await?
    else {
        return Ok(Json(json!({
            "success": false,
            "message": "❌ Aucune intégration Google Calendar active",
            "calendarEventId": null,
            "hasCredentials": has_credentials,
        })));
    };

    let (outcome, refreshed) = state.calendars.test_google_connection(&integration).await;
    persist_refreshed_tokens(&state, user.user_id, refreshed.as_slice()).await;

    let (success, message, calendar_event_id, error) = match outcome {
        SyncOutcome::Created { external_id } => (
            true,
            "✅ Connexion Google Calendar réussie !",
            Some(external_id),
            None,
        ),
        SyncOutcome::Failed { reason } => (
            false,
            "❌ Échec de la connexion Google Calendar",
            None,
            Some(reason),
        ),
        _ => (false, "❌ Échec de la connexion Google Calendar", None, None),
    };

    Ok(Json(json!({
        "success": success,
        "message": message,
        "calendarEventId": calendar_event_id,
        "error": error,
        "hasCredentials": has_credentials,
    })))
}

/// GET /api/calendar/export
async fn export_calendar(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let events = state.storage.list_events(user.user_id).await?;
    let body = state.calendars.generate_full_calendar_export(&events);
    info!(user_id = %user.user_id, count = events.len(), "Calendar exported");

    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", EXPORT_FILENAME),
            ),
        ],
        body,
    ))
}

/// GET /api/calendar-integrations
async fn list_integrations(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let integrations = state.storage.list_integrations(user.user_id).await?;
    Ok(Json(integrations))
}

/// POST /api/calendar-integrations
async fn create_integration(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<NewCalendarIntegration>,
) -> Result<impl IntoResponse, ApiError> {
    let integration = state.storage.create_integration(user.user_id, req).await?;
    info!(integration_id = %integration.id, provider = %integration.provider, "Calendar integration created");

    Ok(Json(json!({
        "integration": integration,
        "message": "Intégration calendrier créée avec succès",
    })))
}

/// PATCH /api/calendar-integrations/{id}
async fn update_integration(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(changes): ValidatedJson<IntegrationChanges>,
) -> Result<impl IntoResponse, ApiError> {
    let integration = state
        .storage
        .update_integration(id, user.user_id, changes)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    Ok(Json(json!({
        "integration": integration,
        "message": "Intégration mise à jour avec succès",
    })))
}

/// DELETE /api/calendar-integrations/{id}
async fn delete_integration(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.storage.delete_integration(id, user.user_id).await? {
        return Err(ApiError::not_found(NOT_FOUND));
    }
    info!(integration_id = %id, "Calendar integration deleted");
    Ok(Json(json!({ "message": "Intégration supprimée avec succès" })))
}

/// POST /api/calendar-integrations/{id}/sync
///
/// Pushes every calendar-flagged event that has no copy in this provider yet.
async fn sync_integration(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let mut integration = state
        .storage
        .get_integration(id, user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
    if !integration.is_active {
        return Err(ApiError::bad_request("Intégration inactive"));
    }

    let provider = integration.provider;
    let pending: Vec<_> = state
        .storage
        .list_events(user.user_id)
        .await?
        .into_iter()
        .filter(|e| e.add_to_calendar && e.external_ids().get(provider).is_none())
        .collect();

    let (mut synced, mut failed) = (0usize, 0usize);
    for event in &pending {
        let report = state
            .calendars
            .sync_event_to_calendars(event, slice::from_ref(&integration))
            .await;
        persist_sync_report(&state, user.user_id, event.id, &report).await?;

        if let Some(token) = report.refreshed_tokens.last() {
            integration.access_token = token.access_token.clone();
            integration.expires_at = token.expires_at;
        }
        if report.any_success() {
            synced += 1;
        } else {
            failed += 1;
        }
    }

    info!(integration_id = %id, synced, failed, "Calendar integration synced");
    state
        .notifications
        .notify_calendar_synced(user.user_id, provider.display_name(), synced)
        .await;

    Ok(Json(json!({
        "message": format!("{} événement(s) synchronisé(s) avec {}", synced, provider.display_name()),
        "synced": synced,
        "failed": failed,
    })))
}
