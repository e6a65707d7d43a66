//! events.rs
//!
//! Event management for the signed-in performer.
//!
//! Creating, updating and deleting an event also mirrors the change into the
//! calendars the user has connected. Calendar failures never fail the request;
//! they are reported back in `calendarIntegration` instead.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::persist_sync_report;
use crate::calendar::{ProviderResult, SyncReport};
use crate::error::{ApiError, ValidatedJson};
use crate::middleware::AuthUser;
use crate::models::event::{CreateEventRequest, EventListItem, UpdateEventRequest};
use crate::models::{CalendarIntegration, Event, EventChanges};
use crate::AppState;

const NOT_FOUND: &str = "Événement non trouvé";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/events", get(list_events).post(create_event))
        .route(
            "/events/{id}",
            get(get_event).put(update_event).delete(delete_event),
        )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CalendarIntegrationSummary {
    requested: bool,
    successful: bool,
    calendar_event_id: Option<String>,
    providers: Vec<ProviderResult>,
}

impl CalendarIntegrationSummary {
    fn not_requested() -> Self {
        Self {
            requested: false,
            successful: false,
            calendar_event_id: None,
            providers: Vec::new(),
        }
    }

    fn from_report(report: SyncReport) -> Self {
        let ids = report.external_ids();
        Self {
            requested: true,
            successful: report.any_success(),
            calendar_event_id: ids.google.or(ids.microsoft),
            providers: report.results,
        }
    }
}

fn provider_names(report: &SyncReport) -> String {
    report
        .successful_providers()
        .iter()
        .map(|p| p.display_name())
        .collect::<Vec<_>>()
        .join(", ")
}

/// GET /api/events
async fn list_events(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let events = state.storage.list_events(user.user_id).await?;
    let items: Vec<EventListItem> = events.into_iter().map(EventListItem::from).collect();
    Ok(Json(items))
}

/// GET /api/events/{id}
async fn get_event(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let event = state
        .storage
        .get_event(id, user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
    Ok(Json(event))
}

/// POST /api/events
///
/// The event is stored first; calendar ids are attached once the sync returns.
async fn create_event(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    payload: Result<Json<CreateEventRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(mut req) = payload?;
    req.fill_from_address();
    req.validate()?;

    let wants_calendar = req.add_to_calendar;
    let mut event = state.storage.create_event(user.user_id, req).await?;
    info!(event_id = %event.id, user_id = %user.user_id, "Event created");

    let (summary, message) = if wants_calendar {
        let integrations = state.storage.list_integrations(user.user_id).await?;
        let report = state.calendars.sync_event_to_calendars(&event, &integrations).await;
        if let Some(updated) = persist_sync_report(&state, user.user_id, event.id, &report).await? {
            event = updated;
        }

        let message = if report.any_success() {
            format!("Événement créé et ajouté à {} avec succès", provider_names(&report))
        } else {
            "Événement créé. Pour l'ajouter à votre calendrier: allez dans Paramètres > \
             Intégrations calendrier et connectez votre compte."
                .to_string()
        };
        (CalendarIntegrationSummary::from_report(report), message)
    } else {
        (
            CalendarIntegrationSummary::not_requested(),
            "Événement créé avec succès".to_string(),
        )
    };

    state.notifications.notify_event_created(user.user_id, &event).await;

    Ok(Json(json!({
        "event": event,
        "message": message,
        "calendarIntegration": summary,
    })))
}

/// PUT /api/events/{id}
///
/// Copies already in a calendar are updated unless `addToCalendar` is now
/// false; `addToCalendar: true` also creates the copies that are missing.
async fn update_event(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateEventRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let original = state
        .storage
        .get_event(id, user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    let add_to_calendar = req.add_to_calendar;
    let mut event = state
        .storage
        .update_event(id, user.user_id, EventChanges::from(req))
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    let existing_ids = original.external_ids();
    let mut calendar_message = "";
    let mut integrations: Option<Vec<CalendarIntegration>> = None;

    if !existing_ids.is_empty() && add_to_calendar != Some(false) {
        let all = state.storage.list_integrations(user.user_id).await?;
        let report = state.calendars.update_event_in_calendars(&event, &all).await;
        persist_sync_report(&state, user.user_id, event.id, &report).await?;

        if report.any_success() {
            calendar_message = " et mis à jour dans le calendrier";
        } else if report.results.iter().any(|r| r.outcome.is_failure()) {
            calendar_message = " (erreur lors de la mise à jour du calendrier)";
        }
        integrations = Some(all);
    }

    if add_to_calendar == Some(true) {
        let all = match integrations {
            Some(all) => all,
            None => state.storage.list_integrations(user.user_id).await?,
        };
        let missing: Vec<CalendarIntegration> = all
            .into_iter()
            .filter(|i| existing_ids.get(i.provider).is_none())
            .collect();

        if !missing.is_empty() {
            let report = state.calendars.sync_event_to_calendars(&event, &missing).await;
            if let Some(updated) =
                persist_sync_report(&state, user.user_id, event.id, &report).await?
            {
                event = updated;
            }
            if report.any_success() {
                calendar_message = " et ajouté au calendrier";
            }
        }
    }

    info!(event_id = %event.id, "Event updated");
    state.notifications.notify_event_updated(user.user_id, &event).await;

    Ok(Json(json!({
        "event": event,
        "message": format!("Événement mis à jour avec succès{}", calendar_message),
    })))
}

/// DELETE /api/events/{id}
async fn delete_event(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let event: Event = state
        .storage
        .get_event(id, user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    if !event.external_ids().is_empty() {
        let integrations = state.storage.list_integrations(user.user_id).await?;
        let report = state.calendars.delete_event_from_calendars(&event, &integrations).await;
        persist_sync_report(&state, user.user_id, event.id, &report).await?;
    }

    if !state.storage.delete_event(id, user.user_id).await? {
        return Err(ApiError::not_found(NOT_FOUND));
    }

    info!(event_id = %id, "Event deleted");
    state.notifications.notify_event_deleted(user.user_id, &event.title).await;

    Ok(Json(json!({ "message": "Événement supprimé avec succès" })))
}
