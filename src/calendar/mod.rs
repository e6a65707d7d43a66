//! Pushes events to the external calendars a user has connected.
//!
//! Every provider is handled independently: a failure is logged and recorded
//! in the report, and never stops the other providers.

pub mod google;
pub mod ical;
pub mod microsoft;
pub mod oauth;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::models::{CalendarIntegration, CalendarProvider, Event, ExternalIds};
use google::GoogleCalendarApi;
use microsoft::MicrosoftCalendarApi;
use oauth::GoogleOAuthClient;

const EVENT_DURATION_HOURS: i64 = 2;
const TOKEN_REFRESH_MARGIN_SECONDS: i64 = 60;
const DEFAULT_CALENDAR_ID: &str = "primary";

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider answered {status}: {body}")]
    Api { status: u16, body: String },
    #[error("missing credentials: {0}")]
    MissingCredentials(&'static str),
    #[error("configuration error: {0}")]
    Config(String),
}

/// Provider-neutral view of an event.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEventData {
    pub title: String,
    pub description: String,
    pub location: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CalendarEventData {
    /// Midnight UTC on the event date, two hours long.
    pub fn from_event(event: &Event) -> Self {
        let start = event.date.and_time(NaiveTime::MIN).and_utc();
        let description = event
            .description
            .clone()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| format!("Événement au {}", event.venue_name));

        Self {
            title: event.title.clone(),
            description,
            location: event.venue.clone(),
            start,
            end: start + Duration::hours(EVENT_DURATION_HOURS),
        }
    }

    pub fn connection_test(now: DateTime<Utc>) -> Self {
        Self {
            title: "Test de connexion Google Calendar".into(),
            description: "Test automatique de l'intégration".into(),
            location: "Test".into(),
            start: now,
            end: now + Duration::hours(EVENT_DURATION_HOURS),
        }
    }
}

/// A calendar reachable over REST with a bearer token.
#[async_trait]
pub trait RemoteCalendar: Send + Sync {
    async fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        data: &CalendarEventData,
    ) -> Result<String, CalendarError>;

    async fn update_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
        data: &CalendarEventData,
    ) -> Result<(), CalendarError>;

    async fn delete_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<(), CalendarError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SyncOutcome {
    Created { external_id: String },
    Exported { uid: String, #[serde(skip)] ics: String },
    Updated,
    Deleted,
    Deferred { reason: String },
    Skipped { reason: String },
    Failed { reason: String },
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            SyncOutcome::Created { .. }
                | SyncOutcome::Exported { .. }
                | SyncOutcome::Updated
                | SyncOutcome::Deleted
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SyncOutcome::Failed { .. })
    }

    fn failed(provider: CalendarProvider, err: CalendarError) -> Self {
        error!("Calendar sync with {} failed: {}", provider, err);
        SyncOutcome::Failed { reason: err.to_string() }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResult {
    pub provider: CalendarProvider,
    pub integration_id: Uuid,
    #[serde(flatten)]
    pub outcome: SyncOutcome,
}

/// New Google credentials obtained while syncing; callers persist them.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshedToken {
    pub integration_id: Uuid,
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub results: Vec<ProviderResult>,
    #[serde(skip)]
    pub refreshed_tokens: Vec<RefreshedToken>,
}

impl SyncReport {
    /// Provider name to created identifier; Apple maps to the raw iCal text.
    pub fn identifiers(&self) -> BTreeMap<CalendarProvider, String> {
        self.results
            .iter()
            .filter_map(|r| match &r.outcome {
                SyncOutcome::Created { external_id } => Some((r.provider, external_id.clone())),
                SyncOutcome::Exported { ics, .. } => Some((r.provider, ics.clone())),
                _ => None,
            })
            .collect()
    }

    /// Ids to store on the event; the event UID stands in for Apple.
    pub fn external_ids(&self) -> ExternalIds {
        let mut ids = ExternalIds::default();
        for result in &self.results {
            let id = match &result.outcome {
                SyncOutcome::Created { external_id } => external_id.clone(),
                SyncOutcome::Exported { uid, .. } => uid.clone(),
                _ => continue,
            };
            match result.provider {
                CalendarProvider::Google => ids.google = Some(id),
                CalendarProvider::Microsoft => ids.microsoft = Some(id),
                CalendarProvider::Apple => ids.apple = Some(id),
            }
        }
        ids
    }

    pub fn outcome(&self, provider: CalendarProvider) -> Option<&SyncOutcome> {
        self.results
            .iter()
            .find(|r| r.provider == provider)
            .map(|r| &r.outcome)
    }

    pub fn any_success(&self) -> bool {
        self.results.iter().any(|r| r.outcome.is_success())
    }

    pub fn successful_providers(&self) -> Vec<CalendarProvider> {
        self.results
            .iter()
            .filter(|r| r.outcome.is_success())
            .map(|r| r.provider)
            .collect()
    }
}

#[derive(Clone, Copy)]
enum Action {
    Create,
    Update,
    Delete,
}

enum RemoteOp<'a> {
    Create,
    Update(&'a str),
    Delete(&'a str),
}

pub struct CalendarService {
    google: Box<dyn RemoteCalendar>,
    microsoft: Box<dyn RemoteCalendar>,
    oauth: GoogleOAuthClient,
}

impl CalendarService {
    pub fn new(
        google: Box<dyn RemoteCalendar>,
        microsoft: Box<dyn RemoteCalendar>,
        oauth: GoogleOAuthClient,
    ) -> Self {
        Self { google, microsoft, oauth }
    }

    pub fn from_config(http: reqwest::Client, config: &Config) -> Self {
        Self::new(
            Box::new(GoogleCalendarApi::new(http.clone(), config.google.calendar_api_url.clone())),
            Box::new(MicrosoftCalendarApi::new(http.clone(), config.microsoft.graph_api_url.clone())),
            GoogleOAuthClient::new(http, &config.google),
        )
    }

    pub fn oauth(&self) -> &GoogleOAuthClient {
        &self.oauth
    }

    pub async fn sync_event_to_calendars(
        &self,
        event: &Event,
        integrations: &[CalendarIntegration],
    ) -> SyncReport {
        self.dispatch(Action::Create, event, integrations).await
    }

    pub async fn update_event_in_calendars(
        &self,
        event: &Event,
        integrations: &[CalendarIntegration],
    ) -> SyncReport {
        self.dispatch(Action::Update, event, integrations).await
    }

    pub async fn delete_event_from_calendars(
        &self,
        event: &Event,
        integrations: &[CalendarIntegration],
    ) -> SyncReport {
        self.dispatch(Action::Delete, event, integrations).await
    }

    pub fn generate_full_calendar_export(&self, events: &[Event]) -> String {
        ical::full_export(events)
    }

    /// Inserts a throwaway event through one Google integration.
    pub async fn test_google_connection(
        &self,
        integration: &CalendarIntegration,
    ) -> (SyncOutcome, Option<RefreshedToken>) {
        let data = CalendarEventData::connection_test(Utc::now());
        let (token, refreshed) = match self.google_token(integration).await {
            Ok(t) => t,
            Err(e) => return (SyncOutcome::failed(CalendarProvider::Google, e), None),
        };
        let outcome = match self.google.create_event(&token, calendar_id(integration), &data).await {
            Ok(external_id) => SyncOutcome::Created { external_id },
            Err(e) => SyncOutcome::failed(CalendarProvider::Google, e),
        };
        (outcome, refreshed)
    }

    async fn dispatch(
        &self,
        action: Action,
        event: &Event,
        integrations: &[CalendarIntegration],
    ) -> SyncReport {
        let data = CalendarEventData::from_event(event);
        let existing = event.external_ids();
        let mut report = SyncReport::default();
        let mut seen = HashSet::new();

        for integration in integrations.iter().filter(|i| i.is_active) {
            let provider = integration.provider;
            let outcome = if !seen.insert(provider) {
                SyncOutcome::Skipped {
                    reason: format!("another active {} integration was used", provider),
                }
            } else {
                match provider {
                    CalendarProvider::Apple => apple_outcome(action, event, &data),
                    CalendarProvider::Google | CalendarProvider::Microsoft => {
                        let stored = match provider {
                            CalendarProvider::Google => existing.google.as_deref(),
                            _ => existing.microsoft.as_deref(),
                        };
                        self.remote_outcome(action, integration, stored, &data, &mut report)
                            .await
                    }
                }
            };

            debug!(provider = %provider, ?outcome, "Calendar dispatch finished");
            report.results.push(ProviderResult {
                provider,
                integration_id: integration.id,
                outcome,
            });
        }

        if report.any_success() {
            info!(event_id = %event.id, providers = ?report.successful_providers(), "Calendars synced");
        }
        report
    }

    async fn remote_outcome(
        &self,
        action: Action,
        integration: &CalendarIntegration,
        stored_id: Option<&str>,
        data: &CalendarEventData,
        report: &mut SyncReport,
    ) -> SyncOutcome {
        let provider = integration.provider;
        let op = match (action, stored_id) {
            (Action::Create, _) => RemoteOp::Create,
            (Action::Update, Some(id)) => RemoteOp::Update(id),
            (Action::Delete, Some(id)) => RemoteOp::Delete(id),
            (_, None) => {
                return SyncOutcome::Skipped {
                    reason: format!("event has no {} id", provider),
                }
            }
        };

        let token = match provider {
            CalendarProvider::Google => match self.google_token(integration).await {
                Ok((token, refreshed)) => {
                    report.refreshed_tokens.extend(refreshed);
                    token
                }
                Err(e) => return SyncOutcome::failed(provider, e),
            },
            _ => integration.access_token.clone(),
        };
        if token.is_empty() {
            return SyncOutcome::failed(provider, CalendarError::MissingCredentials("access token"));
        }

        let api = match provider {
            CalendarProvider::Google => self.google.as_ref(),
            _ => self.microsoft.as_ref(),
        };
        let calendar = calendar_id(integration);

        let result = match op {
            RemoteOp::Create => api
                .create_event(&token, calendar, data)
                .await
                .map(|external_id| SyncOutcome::Created { external_id }),
            RemoteOp::Update(id) => api
                .update_event(&token, calendar, id, data)
                .await
                .map(|_| SyncOutcome::Updated),
            RemoteOp::Delete(id) => api
                .delete_event(&token, calendar, id)
                .await
                .map(|_| SyncOutcome::Deleted),
        };
        result.unwrap_or_else(|e| SyncOutcome::failed(provider, e))
    }

    /// Current Google access token, refreshed first when it is about to expire.
    async fn google_token(
        &self,
        integration: &CalendarIntegration,
    ) -> Result<(String, Option<RefreshedToken>), CalendarError> {
        let now = Utc::now();
        let refresh_token = integration.refresh_token.as_deref().filter(|t| !t.is_empty());

        match refresh_token {
            Some(refresh_token)
                if integration.token_expires_within(now, TOKEN_REFRESH_MARGIN_SECONDS)
                    || integration.access_token.is_empty() =>
            {
                info!(integration_id = %integration.id, "Refreshing Google access token");
                let grant = self.oauth.refresh(refresh_token).await?;
                let refreshed = RefreshedToken {
                    integration_id: integration.id,
                    access_token: grant.access_token.clone(),
                    expires_at: grant.expires_at(now),
                };
                Ok((grant.access_token, Some(refreshed)))
            }
            _ => {
                if integration.token_expires_within(now, 0) {
                    warn!(integration_id = %integration.id, "Google token expired and no refresh token is stored");
                }
                Ok((integration.access_token.clone(), None))
            }
        }
    }
}

fn calendar_id(integration: &CalendarIntegration) -> &str {
    integration
        .calendar_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .unwrap_or(DEFAULT_CALENDAR_ID)
}

fn apple_outcome(action: Action, event: &Event, data: &CalendarEventData) -> SyncOutcome {
    match action {
        Action::Create => {
            let uid = event.id.to_string();
            let ics = ical::single_event_document(data, &uid);
            SyncOutcome::Exported { uid, ics }
        }
        Action::Update | Action::Delete => SyncOutcome::Deferred {
            reason: "Apple Calendar picks up changes from the next .ics export".into(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventStatus;
    use chrono::NaiveDate;
    use std::sync::{Arc, Mutex};

    /// Records calls and fails when told to.
    #[derive(Clone, Default)]
    struct FakeCalendar {
        calls: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl RemoteCalendar for FakeCalendar {
        async fn create_event(
            &self,
            token: &str,
            calendar_id: &str,
            data: &CalendarEventData,
        ) -> Result<String, CalendarError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("create {} {} {}", token, calendar_id, data.title));
            if self.fail {
                return Err(CalendarError::Api { status: 401, body: "invalid".into() });
            }
            Ok(format!("ext-{}", self.calls.lock().unwrap().len()))
        }

        async fn update_event(
            &self,
            _: &str,
            _: &str,
            event_id: &str,
            _: &CalendarEventData,
        ) -> Result<(), CalendarError> {
            self.calls.lock().unwrap().push(format!("update {}", event_id));
            Ok(())
        }

        async fn delete_event(
            &self,
            _: &str,
            _: &str,
            event_id: &str,
        ) -> Result<(), CalendarError> {
            self.calls.lock().unwrap().push(format!("delete {}", event_id));
            Ok(())
        }
    }

    fn service(google: FakeCalendar, microsoft: FakeCalendar) -> CalendarService {
        CalendarService::new(
            Box::new(google),
            Box::new(microsoft),
            GoogleOAuthClient::new(reqwest::Client::new(), &Config::default().google),
        )
    }

    fn event() -> Event {
        let now = Utc::now();
        Event {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Soirée du rire".into(),
            venue_name: "Le Bordel".into(),
            description: Some("   ".into()),
            date: NaiveDate::from_ymd_opt(2025, 9, 20).unwrap(),
            venue: "Le Bordel, Montréal".into(),
            city: "Montréal".into(),
            tickets_url: None,
            add_to_calendar: true,
            publish_to_website: false,
            send_notification: false,
            status: EventStatus::Draft,
            calendar_event_id: None,
            microsoft_event_id: None,
            apple_event_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn integration(provider: CalendarProvider, active: bool) -> CalendarIntegration {
        let now = Utc::now();
        CalendarIntegration {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            provider,
            access_token: "token".into(),
            refresh_token: None,
            expires_at: Some(now + Duration::hours(1)),
            calendar_id: None,
            is_active: active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn event_time_and_description_defaults() {
        let data = CalendarEventData::from_event(&event());
        assert_eq!(data.start.to_rfc3339(), "2025-09-20T00:00:00+00:00");
        assert_eq!(data.end - data.start, Duration::hours(2));
        assert_eq!(data.description, "Événement au Le Bordel");
        assert_eq!(data.location, "Le Bordel, Montréal");
    }

    #[tokio::test]
    async fn one_failing_provider_does_not_stop_the_others() {
        let google = FakeCalendar { fail: true, ..Default::default() };
        let microsoft = FakeCalendar::default();
        let svc = service(google.clone(), microsoft.clone());
        let event = event();

        let report = svc
            .sync_event_to_calendars(
                &event,
                &[
                    integration(CalendarProvider::Google, true),
                    integration(CalendarProvider::Microsoft, true),
                    integration(CalendarProvider::Apple, true),
                ],
            )
            .await;

        assert!(matches!(report.outcome(CalendarProvider::Google), Some(SyncOutcome::Failed { .. })));
        assert!(matches!(report.outcome(CalendarProvider::Microsoft), Some(SyncOutcome::Created { .. })));

        let ids = report.external_ids();
        assert_eq!(ids.google, None);
        assert!(ids.microsoft.is_some());
        assert_eq!(ids.apple, Some(event.id.to_string()));

        let identifiers = report.identifiers();
        assert!(identifiers[&CalendarProvider::Apple].contains("BEGIN:VCALENDAR"));
        assert!(!identifiers.contains_key(&CalendarProvider::Google));
    }

    #[tokio::test]
    async fn inactive_integrations_are_ignored() {
        let google = FakeCalendar::default();
        let svc = service(google.clone(), FakeCalendar::default());

        let report = svc
            .sync_event_to_calendars(&event(), &[integration(CalendarProvider::Google, false)])
            .await;

        assert!(report.results.is_empty());
        assert!(google.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn only_first_integration_per_provider_is_used() {
        let google = FakeCalendar::default();
        let svc = service(google.clone(), FakeCalendar::default());

        let report = svc
            .sync_event_to_calendars(
                &event(),
                &[
                    integration(CalendarProvider::Google, true),
                    integration(CalendarProvider::Google, true),
                ],
            )
            .await;

        assert_eq!(report.results.len(), 2);
        assert!(matches!(report.results[1].outcome, SyncOutcome::Skipped { .. }));
        assert_eq!(google.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn updates_need_a_stored_id_and_apple_is_deferred() {
        let google = FakeCalendar::default();
        let microsoft = FakeCalendar::default();
        let svc = service(google.clone(), microsoft.clone());
        let mut event = event();
        event.calendar_event_id = Some("g-1".into());

        let integrations = [
            integration(CalendarProvider::Google, true),
            integration(CalendarProvider::Microsoft, true),
            integration(CalendarProvider::Apple, true),
        ];
        let report = svc.update_event_in_calendars(&event, &integrations).await;
        assert_eq!(report.outcome(CalendarProvider::Google), Some(&SyncOutcome::Updated));
        assert!(matches!(report.outcome(CalendarProvider::Microsoft), Some(SyncOutcome::Skipped { .. })));
        assert!(matches!(report.outcome(CalendarProvider::Apple), Some(SyncOutcome::Deferred { .. })));

        let report = svc.delete_event_from_calendars(&event, &integrations).await;
        assert_eq!(report.outcome(CalendarProvider::Google), Some(&SyncOutcome::Deleted));
        assert_eq!(google.calls.lock().unwrap().as_slice(), ["update g-1", "delete g-1"]);
        assert!(microsoft.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_token_fails_without_calling_out() {
        let google = FakeCalendar::default();
        let svc = service(google.clone(), FakeCalendar::default());
        let mut broken = integration(CalendarProvider::Google, true);
        broken.access_token.clear();

        let report = svc.sync_event_to_calendars(&event(), &[broken]).await;
        assert!(matches!(report.outcome(CalendarProvider::Google), Some(SyncOutcome::Failed { .. })));
        assert!(google.calls.lock().unwrap().is_empty());
        assert!(!report.any_success());
    }

    #[tokio::test]
    async fn expiring_google_token_is_refreshed_first() {
        use wiremock::matchers::{header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.fresh",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/calendars/primary/events"))
            .and(header("authorization", "Bearer ya29.fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "g-42" })))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = Config::default();
        config.google.client_id = Some("id".into());
        config.google.client_secret = Some("secret".into());
        config.google.token_url = format!("{}/token", server.uri());
        config.google.calendar_api_url = server.uri();
        let svc = CalendarService::from_config(reqwest::Client::new(), &config);

        let mut google = integration(CalendarProvider::Google, true);
        google.access_token = "ya29.stale".into();
        google.refresh_token = Some("1//refresh".into());
        google.expires_at = Some(Utc::now() + Duration::seconds(10));

        let report = svc.sync_event_to_calendars(&event(), &[google.clone()]).await;
        assert_eq!(report.external_ids().google.as_deref(), Some("g-42"));
        assert_eq!(report.refreshed_tokens.len(), 1);
        assert_eq!(report.refreshed_tokens[0].integration_id, google.id);
        assert_eq!(report.refreshed_tokens[0].access_token, "ya29.fresh");
    }
}
