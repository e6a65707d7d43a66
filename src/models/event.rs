use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use crate::models::CalendarProvider;
use crate::utils;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Draft,
    Pending,
    Published,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Draft => "draft",
            EventStatus::Pending => "pending",
            EventStatus::Published => "published",
        }
    }

    /// Status implied by the website publication flag.
    pub fn from_publish_flag(publish_to_website: bool) -> Self {
        if publish_to_website {
            EventStatus::Published
        } else {
            EventStatus::Draft
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown event status `{0}`")]
pub struct UnknownStatus(String);

impl TryFrom<String> for EventStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "draft" => Ok(EventStatus::Draft),
            "pending" => Ok(EventStatus::Pending),
            "published" => Ok(EventStatus::Published),
            _ => Err(UnknownStatus(value)),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub venue_name: String,
    pub description: Option<String>,
    pub date: NaiveDate,
    pub venue: String,
    pub city: String,
    pub tickets_url: Option<String>,
    pub add_to_calendar: bool,
    pub publish_to_website: bool,
    pub send_notification: bool,
    #[sqlx(try_from = "String")]
    pub status: EventStatus,
    pub calendar_event_id: Option<String>,
    pub microsoft_event_id: Option<String>,
    pub apple_event_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn external_ids(&self) -> ExternalIds {
        ExternalIds {
            google: self.calendar_event_id.clone(),
            microsoft: self.microsoft_event_id.clone(),
            apple: self.apple_event_id.clone(),
        }
    }
}

/// Ids of the copies of an event held by external calendars.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalIds {
    pub google: Option<String>,
    pub microsoft: Option<String>,
    pub apple: Option<String>,
}

impl ExternalIds {
    pub fn is_empty(&self) -> bool {
        self.google.is_none() && self.microsoft.is_none() && self.apple.is_none()
    }

    pub fn get(&self, provider: CalendarProvider) -> Option<&str> {
        match provider {
            CalendarProvider::Google => self.google.as_deref(),
            CalendarProvider::Microsoft => self.microsoft.as_deref(),
            CalendarProvider::Apple => self.apple.as_deref(),
        }
    }
}

/// Event as listed to its owner, with French display dates.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventListItem {
    #[serde(flatten)]
    pub event: Event,
    pub display_date: String,
    pub display_created_at: String,
    pub display_updated_at: String,
}

impl From<Event> for EventListItem {
    fn from(event: Event) -> Self {
        EventListItem {
            display_date: utils::format_french_date(event.date),
            display_created_at: utils::format_french_date(event.created_at.date_naive()),
            display_updated_at: utils::format_french_date(event.updated_at.date_naive()),
            event,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    #[validate(length(min = 1, message = "Le titre est requis"))]
    pub title: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Le nom du lieu est requis"))]
    pub venue_name: String,
    pub description: Option<String>,
    #[serde(deserialize_with = "deserialize_event_date")]
    pub date: NaiveDate,
    #[validate(length(min = 1, message = "L'adresse est requise"))]
    pub venue: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "La ville est requise"))]
    pub city: String,
    #[validate(url(message = "Lien de billetterie invalide"))]
    pub tickets_url: Option<String>,
    #[serde(default)]
    pub add_to_calendar: bool,
    #[serde(default)]
    pub publish_to_website: bool,
    #[serde(default)]
    pub send_notification: bool,
}

impl CreateEventRequest {
    /// Fills venue name and city from the full address when the form left them blank.
    pub fn fill_from_address(&mut self) {
        if self.venue_name.trim().is_empty() {
            self.venue_name = utils::extract_venue_name_from_address(&self.venue);
        }
        if self.city.trim().is_empty() {
            self.city = utils::extract_city_from_address(&self.venue);
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEventRequest {
    #[validate(length(min = 1, message = "Le titre est requis"))]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "Le nom du lieu est requis"))]
    pub venue_name: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_event_date")]
    pub date: Option<NaiveDate>,
    #[validate(length(min = 1, message = "L'adresse est requise"))]
    pub venue: Option<String>,
    #[validate(length(min = 1, message = "La ville est requise"))]
    pub city: Option<String>,
    #[validate(url(message = "Lien de billetterie invalide"))]
    pub tickets_url: Option<String>,
    pub add_to_calendar: Option<bool>,
    pub publish_to_website: Option<bool>,
    pub send_notification: Option<bool>,
    pub status: Option<EventStatus>,
}

/// Partial update applied by storage; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct EventChanges {
    pub title: Option<String>,
    pub venue_name: Option<String>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub venue: Option<String>,
    pub city: Option<String>,
    pub tickets_url: Option<String>,
    pub add_to_calendar: Option<bool>,
    pub publish_to_website: Option<bool>,
    pub send_notification: Option<bool>,
    pub status: Option<EventStatus>,
}

impl From<UpdateEventRequest> for EventChanges {
    fn from(req: UpdateEventRequest) -> Self {
        // A change of the publication flag always wins over an explicit status
        let status = req
            .publish_to_website
            .map(EventStatus::from_publish_flag)
            .or(req.status);

        EventChanges {
            title: req.title,
            venue_name: req.venue_name,
            description: req.description,
            date: req.date,
            venue: req.venue,
            city: req.city,
            tickets_url: req.tickets_url,
            add_to_calendar: req.add_to_calendar,
            publish_to_website: req.publish_to_website,
            send_notification: req.send_notification,
            status,
        }
    }
}

impl EventChanges {
    pub fn apply(self, event: &mut Event) {
        if let Some(v) = self.title {
            event.title = v;
        }
        if let Some(v) = self.venue_name {
            event.venue_name = v;
        }
        if let Some(v) = self.description {
            event.description = Some(v);
        }
        if let Some(v) = self.date {
            event.date = v;
        }
        if let Some(v) = self.venue {
            event.venue = v;
        }
        if let Some(v) = self.city {
            event.city = v;
        }
        if let Some(v) = self.tickets_url {
            event.tickets_url = Some(v);
        }
        if let Some(v) = self.add_to_calendar {
            event.add_to_calendar = v;
        }
        if let Some(v) = self.publish_to_website {
            event.publish_to_website = v;
        }
        if let Some(v) = self.send_notification {
            event.send_notification = v;
        }
        if let Some(v) = self.status {
            event.status = v;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EventStats {
    pub monthly_events: i64,
    pub published_events: i64,
    pub pending_events: i64,
}

// Accepts `2025-09-20` as well as full RFC 3339 timestamps from older clients
fn parse_event_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

fn deserialize_event_date<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<NaiveDate, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_event_date(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("date invalide: {}", raw)))
}

fn deserialize_optional_event_date<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<NaiveDate>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_event_date(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("date invalide: {}", raw))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_follows_publication_flag() {
        assert_eq!(EventStatus::from_publish_flag(true), EventStatus::Published);
        assert_eq!(EventStatus::from_publish_flag(false), EventStatus::Draft);
        assert!(EventStatus::try_from("archived".to_string()).is_err());
    }

    #[test]
    fn publish_flag_overrides_explicit_status() {
        let req = UpdateEventRequest {
            publish_to_website: Some(false),
            status: Some(EventStatus::Pending),
            ..Default::default()
        };
        assert_eq!(EventChanges::from(req).status, Some(EventStatus::Draft));

        let req = UpdateEventRequest {
            status: Some(EventStatus::Pending),
            ..Default::default()
        };
        assert_eq!(EventChanges::from(req).status, Some(EventStatus::Pending));
    }

    #[test]
    fn create_request_accepts_both_date_shapes() {
        let body = json!({
            "title": "Soirée du rire",
            "venueName": "Le Bordel",
            "date": "2025-09-20",
            "venue": "Le Bordel, 312 Ontario E, Montréal, QC H2X 1H6",
            "city": "Montréal"
        });
        let req: CreateEventRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.date, NaiveDate::from_ymd_opt(2025, 9, 20).unwrap());
        assert!(!req.add_to_calendar);

        let body = json!({
            "title": "Soirée du rire",
            "date": "2025-09-20T00:00:00Z",
            "venue": "x"
        });
        let req: CreateEventRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.date, NaiveDate::from_ymd_opt(2025, 9, 20).unwrap());

        let body = json!({ "title": "t", "date": "demain", "venue": "x" });
        assert!(serde_json::from_value::<CreateEventRequest>(body).is_err());
    }

    #[test]
    fn blank_venue_name_and_city_come_from_address() {
        let mut req: CreateEventRequest = serde_json::from_value(json!({
            "title": "Spectacle",
            "date": "2025-10-01",
            "venue": "La Taverne de Chambly, 1737 Av. Bourgogne, Chambly, QC J3L 1Y8"
        }))
        .unwrap();
        assert!(req.validate().is_err());

        req.fill_from_address();
        assert_eq!(req.venue_name, "La Taverne de Chambly");
        assert_eq!(req.city, "Chambly");
        assert!(req.validate().is_ok());
    }
}
