use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Server-side session row. Only the digest of the cookie value is stored.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub sid_hash: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
