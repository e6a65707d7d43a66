use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Storage, StorageError, StorageResult};
use crate::models::event::CreateEventRequest;
use crate::models::{
    CalendarIntegration, CalendarProvider, Event, EventChanges, EventStats, EventStatus,
    ExternalIds, IntegrationChanges, NewCalendarIntegration, NewUser, SaveVenueRequest,
    SavedVenue, Session, User,
};

/// In-process store for local runs (`DATABASE_URL=memory://`) and tests.
#[derive(Default)]
pub struct MemoryStorage {
    users: RwLock<HashMap<Uuid, User>>,
    sessions: RwLock<HashMap<String, Session>>,
    events: RwLock<HashMap<Uuid, Event>>,
    integrations: RwLock<HashMap<Uuid, CalendarIntegration>>,
    venues: RwLock<HashMap<Uuid, SavedVenue>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_user(&self, id: Uuid) -> StorageResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn create_user(&self, user: NewUser) -> StorageResult<User> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(StorageError::Conflict(user.email));
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            password_hash: user.password_hash,
            first_name: user.first_name,
            last_name: user.last_name,
            profile_image_url: user.profile_image_url,
            created_at: now,
            updated_at: now,
        };
        users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_profile_image(&self, id: Uuid, url: &str) -> StorageResult<Option<User>> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&id).map(|user| {
            user.profile_image_url = Some(url.to_string());
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn create_session(&self, session: Session) -> StorageResult<()> {
        self.sessions
            .write()
            .await
            .insert(session.sid_hash.clone(), session);
        Ok(())
    }

    async fn active_session(
        &self,
        sid_hash: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<Session>> {
        Ok(self
            .sessions
            .read()
            .await
            .get(sid_hash)
            .filter(|s| !s.is_expired(now))
            .cloned())
    }

    async fn delete_session(&self, sid_hash: &str) -> StorageResult<()> {
        self.sessions.write().await.remove(sid_hash);
        Ok(())
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now));
        Ok((before - sessions.len()) as u64)
    }

    async fn list_events(&self, user_id: Uuid) -> StorageResult<Vec<Event>> {
        let mut events: Vec<Event> = self
            .events
            .read()
            .await
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(events)
    }

    async fn get_event(&self, id: Uuid, user_id: Uuid) -> StorageResult<Option<Event>> {
        Ok(self
            .events
            .read()
            .await
            .get(&id)
            .filter(|e| e.user_id == user_id)
            .cloned())
    }

    async fn create_event(&self, user_id: Uuid, event: CreateEventRequest) -> StorageResult<Event> {
        let now = Utc::now();
        let created = Event {
            id: Uuid::new_v4(),
            user_id,
            title: event.title,
            venue_name: event.venue_name,
            description: event.description,
            date: event.date,
            venue: event.venue,
            city: event.city,
            tickets_url: event.tickets_url,
            add_to_calendar: event.add_to_calendar,
            publish_to_website: event.publish_to_website,
            send_notification: event.send_notification,
            status: EventStatus::from_publish_flag(event.publish_to_website),
            calendar_event_id: None,
            microsoft_event_id: None,
            apple_event_id: None,
            created_at: now,
            updated_at: now,
        };
        self.events.write().await.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_event(
        &self,
        id: Uuid,
        user_id: Uuid,
        changes: EventChanges,
    ) -> StorageResult<Option<Event>> {
        let mut events = self.events.write().await;
        Ok(events
            .get_mut(&id)
            .filter(|e| e.user_id == user_id)
            .map(|event| {
                changes.apply(event);
                event.updated_at = Utc::now();
                event.clone()
            }))
    }

    async fn set_external_ids(
        &self,
        id: Uuid,
        user_id: Uuid,
        ids: ExternalIds,
    ) -> StorageResult<Option<Event>> {
        let mut events = self.events.write().await;
        Ok(events
            .get_mut(&id)
            .filter(|e| e.user_id == user_id)
            .map(|event| {
                if ids.google.is_some() {
                    event.calendar_event_id = ids.google;
                }
                if ids.microsoft.is_some() {
                    event.microsoft_event_id = ids.microsoft;
                }
                if ids.apple.is_some() {
                    event.apple_event_id = ids.apple;
                }
                event.updated_at = Utc::now();
                event.clone()
            }))
    }

    async fn delete_event(&self, id: Uuid, user_id: Uuid) -> StorageResult<bool> {
        let mut events = self.events.write().await;
        match events.get(&id) {
            Some(e) if e.user_id == user_id => {
                events.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn event_stats(
        &self,
        user_id: Uuid,
        month_start: NaiveDate,
        month_end: NaiveDate,
    ) -> StorageResult<EventStats> {
        let events = self.events.read().await;
        let mut stats = EventStats::default();
        for event in events.values().filter(|e| e.user_id == user_id) {
            if event.date >= month_start && event.date <= month_end {
                stats.monthly_events += 1;
            }
            match event.status {
                EventStatus::Published => stats.published_events += 1,
                EventStatus::Pending => stats.pending_events += 1,
                EventStatus::Draft => {}
            }
        }
        Ok(stats)
    }

    async fn list_integrations(&self, user_id: Uuid) -> StorageResult<Vec<CalendarIntegration>> {
        let mut rows: Vec<CalendarIntegration> = self
            .integrations
            .read()
            .await
            .values()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn get_integration(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> StorageResult<Option<CalendarIntegration>> {
        Ok(self
            .integrations
            .read()
            .await
            .get(&id)
            .filter(|i| i.user_id == user_id)
            .cloned())
    }

    async fn get_active_integration(
        &self,
        user_id: Uuid,
        provider: CalendarProvider,
    ) -> StorageResult<Option<CalendarIntegration>> {
        Ok(self
            .list_integrations(user_id)
            .await?
            .into_iter()
            .find(|i| i.provider == provider && i.is_active))
    }

    async fn create_integration(
        &self,
        user_id: Uuid,
        integration: NewCalendarIntegration,
    ) -> StorageResult<CalendarIntegration> {
        let now = Utc::now();
        let row = CalendarIntegration {
            id: Uuid::new_v4(),
            user_id,
            provider: integration.provider,
            access_token: integration.access_token,
            refresh_token: integration.refresh_token,
            expires_at: integration.expires_at,
            calendar_id: integration.calendar_id,
            is_active: integration.is_active,
            created_at: now,
            updated_at: now,
        };
        self.integrations.write().await.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_integration(
        &self,
        id: Uuid,
        user_id: Uuid,
        changes: IntegrationChanges,
    ) -> StorageResult<Option<CalendarIntegration>> {
        let mut rows = self.integrations.write().await;
        Ok(rows
            .get_mut(&id)
            .filter(|i| i.user_id == user_id)
            .map(|integration| {
                changes.apply(integration);
                integration.updated_at = Utc::now();
                integration.clone()
            }))
    }

    async fn delete_integration(&self, id: Uuid, user_id: Uuid) -> StorageResult<bool> {
        let mut rows = self.integrations.write().await;
        match rows.get(&id) {
            Some(i) if i.user_id == user_id => {
                rows.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_saved_venues(&self, user_id: Uuid) -> StorageResult<Vec<SavedVenue>> {
        let mut rows: Vec<SavedVenue> = self
            .venues
            .read()
            .await
            .values()
            .filter(|v| v.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.last_used.cmp(&a.last_used));
        Ok(rows)
    }

    async fn save_venue(
        &self,
        user_id: Uuid,
        venue: SaveVenueRequest,
    ) -> StorageResult<(SavedVenue, bool)> {
        let mut rows = self.venues.write().await;
        let now = Utc::now();
        let facebook_id = venue.facebook_id.clone().filter(|id| !id.is_empty());

        let existing = match facebook_id.as_deref() {
            Some(fb) => rows
                .values_mut()
                .find(|v| v.user_id == user_id && v.facebook_id.as_deref() == Some(fb)),
            None => None,
        };

        if let Some(row) = existing {
            row.use_count += 1;
            row.last_used = now;
            row.venue_name = venue.venue_name;
            row.venue_address = venue.venue_address;
            row.facebook_url = venue.facebook_url;
            row.profile_picture_url = venue.profile_picture_url;
            row.website_url = venue.website_url;
            row.google_maps_url = venue.google_maps_url;
            row.updated_at = now;
            return Ok((row.clone(), false));
        }

        let row = SavedVenue {
            id: Uuid::new_v4(),
            user_id,
            venue_name: venue.venue_name,
            venue_address: venue.venue_address,
            facebook_id: venue.facebook_id,
            facebook_url: venue.facebook_url,
            profile_picture_url: venue.profile_picture_url,
            website_url: venue.website_url,
            google_maps_url: venue.google_maps_url,
            use_count: 1,
            last_used: now,
            created_at: now,
            updated_at: now,
        };
        rows.insert(row.id, row.clone());
        Ok((row, true))
    }
}
