use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

use super::{Storage, StorageError, StorageResult};
use crate::models::event::CreateEventRequest;
use crate::models::{
    CalendarIntegration, CalendarProvider, Event, EventChanges, EventStats, EventStatus,
    ExternalIds, IntegrationChanges, NewCalendarIntegration, NewUser, SaveVenueRequest,
    SavedVenue, Session, User,
};

const EVENT_COLUMNS: &str = "id, user_id, title, venue_name, description, date, venue, city, \
    tickets_url, add_to_calendar, publish_to_website, send_notification, status, \
    calendar_event_id, microsoft_event_id, apple_event_id, created_at, updated_at";

const INTEGRATION_COLUMNS: &str = "id, user_id, provider, access_token, refresh_token, \
    expires_at, calendar_id, is_active, created_at, updated_at";

#[derive(Clone)]
pub struct PgStorage {
    pub pool: PgPool,
}

impl PgStorage {
    pub async fn connect(database_url: &str, pool_size: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        Ok(PgStorage { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("./src/migrations").run(&self.pool).await?;
        info!("Migrations completed");
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl Storage for PgStorage {
    async fn get_user(&self, id: Uuid) -> StorageResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE lower(email) = lower($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn create_user(&self, user: NewUser) -> StorageResult<User> {
        let res = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, password_hash, first_name, last_name, profile_image_url)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.profile_image_url)
        .fetch_one(&self.pool)
        .await;

        match res {
            Ok(created) => Ok(created),
            Err(e) if is_unique_violation(&e) => Err(StorageError::Conflict(user.email)),
            Err(e) => {
                error!("create_user sql error: {:?}", e);
                Err(e.into())
            }
        }
    }

    async fn update_profile_image(&self, id: Uuid, url: &str) -> StorageResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET profile_image_url = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_session(&self, session: Session) -> StorageResult<()> {
        sqlx::query("INSERT INTO sessions (sid_hash, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(&session.sid_hash)
            .bind(session.user_id)
            .bind(session.expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn active_session(
        &self,
        sid_hash: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT sid_hash, user_id, expires_at FROM sessions WHERE sid_hash = $1 AND expires_at > $2",
        )
        .bind(sid_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn delete_session(&self, sid_hash: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM sessions WHERE sid_hash = $1")
            .bind(sid_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        let res = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    async fn list_events(&self, user_id: Uuid) -> StorageResult<Vec<Event>> {
        let events = sqlx::query_as::<_, Event>(&format!(
            "SELECT {} FROM events WHERE user_id = $1 ORDER BY created_at DESC",
            EVENT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    async fn get_event(&self, id: Uuid, user_id: Uuid) -> StorageResult<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "SELECT {} FROM events WHERE id = $1 AND user_id = $2",
            EVENT_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(event)
    }

    async fn create_event(&self, user_id: Uuid, event: CreateEventRequest) -> StorageResult<Event> {
        let status = EventStatus::from_publish_flag(event.publish_to_website);

        let created = sqlx::query_as::<_, Event>(&format!(
            r#"
            INSERT INTO events (
                id, user_id, title, venue_name, description, date, venue, city, tickets_url,
                add_to_calendar, publish_to_website, send_notification, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {}
            "#,
            EVENT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&event.title)
        .bind(&event.venue_name)
        .bind(&event.description)
        .bind(event.date)
        .bind(&event.venue)
        .bind(&event.city)
        .bind(&event.tickets_url)
        .bind(event.add_to_calendar)
        .bind(event.publish_to_website)
        .bind(event.send_notification)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn update_event(
        &self,
        id: Uuid,
        user_id: Uuid,
        changes: EventChanges,
    ) -> StorageResult<Option<Event>> {
        let updated = sqlx::query_as::<_, Event>(&format!(
            r#"
            UPDATE events SET
                title = COALESCE($3, title),
                venue_name = COALESCE($4, venue_name),
                description = COALESCE($5, description),
                date = COALESCE($6, date),
                venue = COALESCE($7, venue),
                city = COALESCE($8, city),
                tickets_url = COALESCE($9, tickets_url),
                add_to_calendar = COALESCE($10, add_to_calendar),
                publish_to_website = COALESCE($11, publish_to_website),
                send_notification = COALESCE($12, send_notification),
                status = COALESCE($13, status),
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING {}
            "#,
            EVENT_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .bind(changes.title)
        .bind(changes.venue_name)
        .bind(changes.description)
        .bind(changes.date)
        .bind(changes.venue)
        .bind(changes.city)
        .bind(changes.tickets_url)
        .bind(changes.add_to_calendar)
        .bind(changes.publish_to_website)
        .bind(changes.send_notification)
        .bind(changes.status.map(|s| s.as_str()))
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn set_external_ids(
        &self,
        id: Uuid,
        user_id: Uuid,
        ids: ExternalIds,
    ) -> StorageResult<Option<Event>> {
        let updated = sqlx::query_as::<_, Event>(&format!(
            r#"
            UPDATE events SET
                calendar_event_id = COALESCE($3, calendar_event_id),
                microsoft_event_id = COALESCE($4, microsoft_event_id),
                apple_event_id = COALESCE($5, apple_event_id),
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING {}
            "#,
            EVENT_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .bind(ids.google)
        .bind(ids.microsoft)
        .bind(ids.apple)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn delete_event(&self, id: Uuid, user_id: Uuid) -> StorageResult<bool> {
        let res = sqlx::query("DELETE FROM events WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn event_stats(
        &self,
        user_id: Uuid,
        month_start: NaiveDate,
        month_end: NaiveDate,
    ) -> StorageResult<EventStats> {
        let stats = sqlx::query_as::<_, EventStats>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE date >= $2 AND date <= $3)::bigint AS monthly_events,
                COUNT(*) FILTER (WHERE status = 'published')::bigint AS published_events,
                COUNT(*) FILTER (WHERE status = 'pending')::bigint AS pending_events
            FROM events
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(month_start)
        .bind(month_end)
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }

    async fn list_integrations(&self, user_id: Uuid) -> StorageResult<Vec<CalendarIntegration>> {
        let rows = sqlx::query_as::<_, CalendarIntegration>(&format!(
            "SELECT {} FROM calendar_integrations WHERE user_id = $1 ORDER BY created_at DESC",
            INTEGRATION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_integration(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> StorageResult<Option<CalendarIntegration>> {
        let row = sqlx::query_as::<_, CalendarIntegration>(&format!(
            "SELECT {} FROM calendar_integrations WHERE id = $1 AND user_id = $2",
            INTEGRATION_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_active_integration(
        &self,
        user_id: Uuid,
        provider: CalendarProvider,
    ) -> StorageResult<Option<CalendarIntegration>> {
        let row = sqlx::query_as::<_, CalendarIntegration>(&format!(
            r#"
            SELECT {} FROM calendar_integrations
            WHERE user_id = $1 AND provider = $2 AND is_active = TRUE
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            INTEGRATION_COLUMNS
        ))
        .bind(user_id)
        .bind(provider.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn create_integration(
        &self,
        user_id: Uuid,
        integration: NewCalendarIntegration,
    ) -> StorageResult<CalendarIntegration> {
        let row = sqlx::query_as::<_, CalendarIntegration>(&format!(
            r#"
            INSERT INTO calendar_integrations (
                id, user_id, provider, access_token, refresh_token, expires_at, calendar_id, is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            INTEGRATION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(integration.provider.as_str())
        .bind(&integration.access_token)
        .bind(&integration.refresh_token)
        .bind(integration.expires_at)
        .bind(&integration.calendar_id)
        .bind(integration.is_active)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_integration(
        &self,
        id: Uuid,
        user_id: Uuid,
        changes: IntegrationChanges,
    ) -> StorageResult<Option<CalendarIntegration>> {
        let row = sqlx::query_as::<_, CalendarIntegration>(&format!(
            r#"
            UPDATE calendar_integrations SET
                access_token = COALESCE($3, access_token),
                refresh_token = COALESCE($4, refresh_token),
                expires_at = COALESCE($5, expires_at),
                calendar_id = COALESCE($6, calendar_id),
                is_active = COALESCE($7, is_active),
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING {}
            "#,
            INTEGRATION_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .bind(changes.access_token)
        .bind(changes.refresh_token)
        .bind(changes.expires_at)
        .bind(changes.calendar_id)
        .bind(changes.is_active)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_integration(&self, id: Uuid, user_id: Uuid) -> StorageResult<bool> {
        let res = sqlx::query("DELETE FROM calendar_integrations WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_saved_venues(&self, user_id: Uuid) -> StorageResult<Vec<SavedVenue>> {
        let rows = sqlx::query_as::<_, SavedVenue>(
            "SELECT * FROM saved_venues WHERE user_id = $1 ORDER BY last_used DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn save_venue(
        &self,
        user_id: Uuid,
        venue: SaveVenueRequest,
    ) -> StorageResult<(SavedVenue, bool)> {
        let mut tx = self.pool.begin().await?;

        // Venues without a Facebook id are never merged
        let existing = match venue.facebook_id.as_deref().filter(|id| !id.is_empty()) {
            Some(facebook_id) => {
                sqlx::query_scalar::<_, Uuid>(
                    "SELECT id FROM saved_venues WHERE user_id = $1 AND facebook_id = $2 LIMIT 1 FOR UPDATE",
                )
                .bind(user_id)
                .bind(facebook_id)
                .fetch_optional(&mut *tx)
                .await?
            }
            None => None,
        };

        let result = match existing {
            Some(id) => {
                let row = sqlx::query_as::<_, SavedVenue>(
                    r#"
                    UPDATE saved_venues SET
                        use_count = use_count + 1,
                        last_used = NOW(),
                        venue_name = $2,
                        venue_address = $3,
                        facebook_url = $4,
                        profile_picture_url = $5,
                        website_url = $6,
                        google_maps_url = $7,
                        updated_at = NOW()
                    WHERE id = $1
                    RETURNING *
                    "#,
                )
                .bind(id)
                .bind(&venue.venue_name)
                .bind(&venue.venue_address)
                .bind(&venue.facebook_url)
                .bind(&venue.profile_picture_url)
                .bind(&venue.website_url)
                .bind(&venue.google_maps_url)
                .fetch_one(&mut *tx)
                .await?;
                (row, false)
            }
            None => {
                let row = sqlx::query_as::<_, SavedVenue>(
                    r#"
                    INSERT INTO saved_venues (
                        id, user_id, venue_name, venue_address, facebook_id, facebook_url,
                        profile_picture_url, website_url, google_maps_url
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    RETURNING *
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(user_id)
                .bind(&venue.venue_name)
                .bind(&venue.venue_address)
                .bind(&venue.facebook_id)
                .bind(&venue.facebook_url)
                .bind(&venue.profile_picture_url)
                .bind(&venue.website_url)
                .bind(&venue.google_maps_url)
                .fetch_one(&mut *tx)
                .await?;
                (row, true)
            }
        };

        tx.commit().await?;
        Ok(result)
    }
}
