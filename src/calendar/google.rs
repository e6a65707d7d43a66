//! Google Calendar v3 REST client.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::error;

use super::{CalendarError, CalendarEventData, RemoteCalendar};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEventDateTime {
    date_time: String,
    time_zone: String,
}

#[derive(Debug, Serialize)]
struct GoogleEventAttributes<'a> {
    summary: &'a str,
    description: &'a str,
    location: &'a str,
    start: GoogleEventDateTime,
    end: GoogleEventDateTime,
}

impl<'a> From<&'a CalendarEventData> for GoogleEventAttributes<'a> {
    fn from(data: &'a CalendarEventData) -> Self {
        Self {
            summary: &data.title,
            description: &data.description,
            location: &data.location,
            start: GoogleEventDateTime {
                date_time: data.start.to_rfc3339(),
                time_zone: "UTC".to_string(),
            },
            end: GoogleEventDateTime {
                date_time: data.end.to_rfc3339(),
                time_zone: "UTC".to_string(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct GoogleEventResponse {
    id: String,
}

pub struct GoogleCalendarApi {
    client: Client,
    base_url: String,
}

impl GoogleCalendarApi {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn events_url(&self, calendar_id: &str, event_id: Option<&str>) -> Result<Url, CalendarError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| CalendarError::Config(e.to_string()))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| CalendarError::Config("calendar base url cannot hold a path".into()))?;
            segments.pop_if_empty().push("calendars").push(calendar_id).push("events");
            if let Some(id) = event_id {
                segments.push(id);
            }
        }
        Ok(url)
    }
}

async fn api_error(op: &str, res: reqwest::Response) -> CalendarError {
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    error!(
        "[Unexpected Response] Google Calendar API {} error. Status: {}, body: {}",
        op, status, body
    );
    CalendarError::Api { status: status.as_u16(), body }
}

#[async_trait]
impl RemoteCalendar for GoogleCalendarApi {
    async fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        data: &CalendarEventData,
    ) -> Result<String, CalendarError> {
        let url = self.events_url(calendar_id, None)?;
        let res = self
            .client
            .post(url)
            .bearer_auth(access_token)
            .json(&GoogleEventAttributes::from(data))
            .send()
            .await
            .map_err(|e| {
                error!("[Network Error] Google Calendar API POST error. Error message: {:?}", e);
                CalendarError::Http(e)
            })?;

        if !res.status().is_success() {
            return Err(api_error("POST", res).await);
        }
        let created = res.json::<GoogleEventResponse>().await?;
        Ok(created.id)
    }

    async fn update_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
        data: &CalendarEventData,
    ) -> Result<(), CalendarError> {
        let url = self.events_url(calendar_id, Some(event_id))?;
        let res = self
            .client
            .put(url)
            .bearer_auth(access_token)
            .json(&GoogleEventAttributes::from(data))
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(api_error("PUT", res).await);
        }
        Ok(())
    }

    async fn delete_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<(), CalendarError> {
        let url = self.events_url(calendar_id, Some(event_id))?;
        let res = self.client.delete(url).bearer_auth(access_token).send().await?;

        // Already gone on Google's side
        if res.status().is_success() || res.status() == StatusCode::GONE {
            return Ok(());
        }
        Err(api_error("DELETE", res).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn data() -> CalendarEventData {
        let start = Utc.with_ymd_and_hms(2025, 9, 20, 0, 0, 0).unwrap();
        CalendarEventData {
            title: "Soirée du rire".into(),
            description: "Événement au Le Bordel".into(),
            location: "Le Bordel, Montréal".into(),
            start,
            end: start + chrono::Duration::hours(2),
        }
    }

    #[tokio::test]
    async fn creates_event_in_primary_calendar() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calendars/primary/events"))
            .and(header("authorization", "Bearer ya29.token"))
            .and(body_partial_json(serde_json::json!({
                "summary": "Soirée du rire",
                "start": { "dateTime": "2025-09-20T00:00:00+00:00", "timeZone": "UTC" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "g-evt-1" })))
            .expect(1)
            .mount(&server)
            .await;

        let api = GoogleCalendarApi::new(Client::new(), server.uri());
        let id = api.create_event("ya29.token", "primary", &data()).await.unwrap();
        assert_eq!(id, "g-evt-1");
    }

    #[tokio::test]
    async fn calendar_ids_are_path_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/calendars/fr.canadian%23holiday@group.v.calendar.google.com/events/g-evt-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "g-evt-1" })))
            .expect(1)
            .mount(&server)
            .await;

        let api = GoogleCalendarApi::new(Client::new(), server.uri());
        api.update_event("t", "fr.canadian#holiday@group.v.calendar.google.com", "g-evt-1", &data()).await.unwrap();
    }

    #[tokio::test]
    async fn unauthorized_is_an_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let api = GoogleCalendarApi::new(Client::new(), server.uri());
        let err = api.create_event("expired", "primary", &data()).await.unwrap_err();
        assert!(matches!(err, CalendarError::Api { status: 401, .. }));
    }

    #[tokio::test]
    async fn deleting_a_gone_event_is_fine() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let api = GoogleCalendarApi::new(Client::new(), server.uri());
        api.delete_event("t", "primary", "g-evt-1").await.unwrap();
    }
}
