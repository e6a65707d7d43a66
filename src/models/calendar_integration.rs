use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarProvider {
    Google,
    Microsoft,
    Apple,
}

impl CalendarProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalendarProvider::Google => "google",
            CalendarProvider::Microsoft => "microsoft",
            CalendarProvider::Apple => "apple",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            CalendarProvider::Google => "Google Calendar",
            CalendarProvider::Microsoft => "Outlook",
            CalendarProvider::Apple => "Apple Calendar",
        }
    }
}

impl fmt::Display for CalendarProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown calendar provider `{0}`")]
pub struct UnknownProvider(String);

impl TryFrom<String> for CalendarProvider {
    type Error = UnknownProvider;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "google" => Ok(CalendarProvider::Google),
            "microsoft" => Ok(CalendarProvider::Microsoft),
            "apple" => Ok(CalendarProvider::Apple),
            _ => Err(UnknownProvider(value)),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalendarIntegration {
    pub id: Uuid,
    pub user_id: Uuid,
    #[sqlx(try_from = "String")]
    pub provider: CalendarProvider,
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub calendar_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CalendarIntegration {
    /// True when the access token is gone or about to be within `margin_seconds`.
    pub fn token_expires_within(&self, now: DateTime<Utc>, margin_seconds: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= now + chrono::Duration::seconds(margin_seconds),
            None => false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewCalendarIntegration {
    pub provider: CalendarProvider,
    #[serde(default)]
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    #[validate(length(min = 1))]
    pub calendar_id: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationChanges {
    #[validate(length(min = 1))]
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub calendar_id: Option<String>,
    pub is_active: Option<bool>,
}

impl IntegrationChanges {
    pub fn apply(self, integration: &mut CalendarIntegration) {
        if let Some(v) = self.access_token {
            integration.access_token = v;
        }
        if let Some(v) = self.refresh_token {
            integration.refresh_token = Some(v);
        }
        if let Some(v) = self.expires_at {
            integration.expires_at = Some(v);
        }
        if let Some(v) = self.calendar_id {
            integration.calendar_id = Some(v);
        }
        if let Some(v) = self.is_active {
            integration.is_active = v;
        }
    }
}
