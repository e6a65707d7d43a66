//! Outlook calendars through Microsoft Graph.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::error;

use super::{CalendarError, CalendarEventData, RemoteCalendar};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphDateTime {
    date_time: String,
    time_zone: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphBody<'a> {
    content_type: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphLocation<'a> {
    display_name: &'a str,
}

#[derive(Debug, Serialize)]
struct GraphEvent<'a> {
    subject: &'a str,
    body: GraphBody<'a>,
    start: GraphDateTime,
    end: GraphDateTime,
    location: GraphLocation<'a>,
}

impl<'a> From<&'a CalendarEventData> for GraphEvent<'a> {
    fn from(data: &'a CalendarEventData) -> Self {
        // Graph wants a zone-less local time next to the zone name
        let fmt = "%Y-%m-%dT%H:%M:%S";
        Self {
            subject: &data.title,
            body: GraphBody { content_type: "text", content: &data.description },
            start: GraphDateTime { date_time: data.start.format(fmt).to_string(), time_zone: "UTC" },
            end: GraphDateTime { date_time: data.end.format(fmt).to_string(), time_zone: "UTC" },
            location: GraphLocation { display_name: &data.location },
        }
    }
}

#[derive(Debug, Deserialize)]
struct GraphEventResponse {
    id: String,
}

pub struct MicrosoftCalendarApi {
    client: Client,
    base_url: String,
}

impl MicrosoftCalendarApi {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn create_url(&self, calendar_id: &str) -> String {
        if calendar_id.is_empty() || calendar_id == "primary" {
            format!("{}/me/events", self.base_url)
        } else {
            format!("{}/me/calendars/{}/events", self.base_url, calendar_id)
        }
    }

    fn event_url(&self, event_id: &str) -> String {
        format!("{}/me/events/{}", self.base_url, event_id)
    }
}

async fn graph_error(op: &str, res: reqwest::Response) -> CalendarError {
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    error!("Microsoft Graph {} failed. Status: {}, body: {}", op, status, body);
    CalendarError::Api { status: status.as_u16(), body }
}

#[async_trait]
impl RemoteCalendar for MicrosoftCalendarApi {
    async fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        data: &CalendarEventData,
    ) -> Result<String, CalendarError> {
        let res = self
            .client
            .post(self.create_url(calendar_id))
            .bearer_auth(access_token)
            .json(&GraphEvent::from(data))
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(graph_error("POST", res).await);
        }
        Ok(res.json::<GraphEventResponse>().await?.id)
    }

    async fn update_event(
        &self,
        access_token: &str,
        _calendar_id: &str,
        event_id: &str,
        data: &CalendarEventData,
    ) -> Result<(), CalendarError> {
        let res = self
            .client
            .patch(self.event_url(event_id))
            .bearer_auth(access_token)
            .json(&GraphEvent::from(data))
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(graph_error("PATCH", res).await);
        }
        Ok(())
    }

    async fn delete_event(
        &self,
        access_token: &str,
        _calendar_id: &str,
        event_id: &str,
    ) -> Result<(), CalendarError> {
        let res = self
            .client
            .delete(self.event_url(event_id))
            .bearer_auth(access_token)
            .send()
            .await?;

        if res.status().is_success() || res.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(graph_error("DELETE", res).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn data() -> CalendarEventData {
        let start = Utc.with_ymd_and_hms(2025, 10, 3, 0, 0, 0).unwrap();
        CalendarEventData {
            title: "Spectacle".into(),
            description: String::new(),
            location: "Chambly".into(),
            start,
            end: start + chrono::Duration::hours(2),
        }
    }

    #[tokio::test]
    async fn posts_to_default_calendar() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/me/events"))
            .and(body_partial_json(serde_json::json!({
                "subject": "Spectacle",
                "start": { "dateTime": "2025-10-03T00:00:00", "timeZone": "UTC" },
                "location": { "displayName": "Chambly" }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({ "id": "AAMk-1" })))
            .expect(1)
            .mount(&server)
            .await;

        let api = MicrosoftCalendarApi::new(Client::new(), server.uri());
        assert_eq!(api.create_event("t", "primary", &data()).await.unwrap(), "AAMk-1");
    }

    #[tokio::test]
    async fn posts_to_named_calendar_and_patches_updates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/me/calendars/cal-7/events"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({ "id": "AAMk-2" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/me/events/AAMk-2"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let api = MicrosoftCalendarApi::new(Client::new(), server.uri());
        let id = api.create_event("t", "cal-7", &data()).await.unwrap();
        api.update_event("t", "cal-7", &id, &data()).await.unwrap();
    }
}
