//! Persistence behind one trait so the HTTP layer never sees SQL.
//!
//! Every event, integration and venue query takes the owning user id; there
//! is no method that reads across users.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    CalendarIntegration, CalendarProvider, Event, EventChanges, EventStats, ExternalIds,
    IntegrationChanges, NewCalendarIntegration, NewUser, SaveVenueRequest, SavedVenue, Session,
    User,
};
use crate::models::event::CreateEventRequest;

pub use memory::MemoryStorage;
pub use postgres::PgStorage;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait Storage: Send + Sync {
    // --- users ---
    async fn get_user(&self, id: Uuid) -> StorageResult<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> StorageResult<Option<User>>;
    /// Fails with `Conflict` when the email is already registered.
    async fn create_user(&self, user: NewUser) -> StorageResult<User>;
    async fn update_profile_image(&self, id: Uuid, url: &str) -> StorageResult<Option<User>>;

    // --- sessions ---
    async fn create_session(&self, session: Session) -> StorageResult<()>;
    /// Looks up a session that is still valid at `now`.
    async fn active_session(
        &self,
        sid_hash: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<Session>>;
    async fn delete_session(&self, sid_hash: &str) -> StorageResult<()>;
    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> StorageResult<u64>;

    // --- events ---
    async fn list_events(&self, user_id: Uuid) -> StorageResult<Vec<Event>>;
    async fn get_event(&self, id: Uuid, user_id: Uuid) -> StorageResult<Option<Event>>;
    async fn create_event(&self, user_id: Uuid, event: CreateEventRequest) -> StorageResult<Event>;
    async fn update_event(
        &self,
        id: Uuid,
        user_id: Uuid,
        changes: EventChanges,
    ) -> StorageResult<Option<Event>>;
    /// Overwrites only the ids that are `Some`.
    async fn set_external_ids(
        &self,
        id: Uuid,
        user_id: Uuid,
        ids: ExternalIds,
    ) -> StorageResult<Option<Event>>;
    async fn delete_event(&self, id: Uuid, user_id: Uuid) -> StorageResult<bool>;
    async fn event_stats(
        &self,
        user_id: Uuid,
        month_start: NaiveDate,
        month_end: NaiveDate,
    ) -> StorageResult<EventStats>;

    // --- calendar integrations ---
    async fn list_integrations(&self, user_id: Uuid) -> StorageResult<Vec<CalendarIntegration>>;
    async fn get_integration(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> StorageResult<Option<CalendarIntegration>>;
    async fn get_active_integration(
        &self,
        user_id: Uuid,
        provider: CalendarProvider,
    ) -> StorageResult<Option<CalendarIntegration>>;
    async fn create_integration(
        &self,
        user_id: Uuid,
        integration: NewCalendarIntegration,
    ) -> StorageResult<CalendarIntegration>;
    async fn update_integration(
        &self,
        id: Uuid,
        user_id: Uuid,
        changes: IntegrationChanges,
    ) -> StorageResult<Option<CalendarIntegration>>;
    async fn delete_integration(&self, id: Uuid, user_id: Uuid) -> StorageResult<bool>;

    // --- saved venues ---
    async fn list_saved_venues(&self, user_id: Uuid) -> StorageResult<Vec<SavedVenue>>;
    /// Upserts on the Facebook id; returns the row and whether it was new.
    async fn save_venue(
        &self,
        user_id: Uuid,
        venue: SaveVenueRequest,
    ) -> StorageResult<(SavedVenue, bool)>;
}

/// First and last day of the month containing `today`.
pub fn month_bounds(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    use chrono::Datelike;

    let start = today.with_day(1).unwrap_or(today);
    let next_month = if start.month() == 12 {
        NaiveDate::from_ymd_opt(start.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(start.year(), start.month() + 1, 1)
    };
    let end = next_month.and_then(|d| d.pred_opt()).unwrap_or(start);
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_bounds_cover_whole_month() {
        let (start, end) = month_bounds(NaiveDate::from_ymd_opt(2024, 2, 17).unwrap());
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

        let (start, end) = month_bounds(NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
        assert_eq!(start, NaiveDate::from_ymd_opt(2025, 12, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
    }
}
