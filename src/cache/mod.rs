//! Redis cache in front of the session table.
//!
//! Entries map the session digest to the serialized profile of its user. A
//! miss is never an error: callers fall back to storage.

use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::models::UserProfile;
use crate::redis_client::RedisClient;

#[derive(Clone)]
pub struct CacheService {
    redis: RedisClient,
    ttl_seconds: u64,
}

fn session_key(sid_hash: &str) -> String {
    format!("session:{}", sid_hash)
}

impl CacheService {
    pub fn new(redis: RedisClient, ttl_seconds: u64) -> Self {
        Self { redis, ttl_seconds }
    }

    /// Caches the user behind a session, never longer than the session itself.
    pub async fn cache_session(
        &self,
        sid_hash: &str,
        user: &UserProfile,
        session_ttl_seconds: u64,
    ) {
        let payload = match serde_json::to_string(user) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize session user: {}", e);
                return;
            }
        };
        let ttl = self.ttl_seconds.min(session_ttl_seconds).max(1);

        let mut conn = self.redis.conn.clone();
        let res: Result<(), redis::RedisError> = conn.set_ex(session_key(sid_hash), payload, ttl).await;
        if let Err(e) = res {
            warn!("Failed to cache session: {}", e);
        }
    }

    pub async fn get_cached_session(&self, sid_hash: &str) -> Option<UserProfile> {
        let mut conn = self.redis.conn.clone();
        let cached: Option<String> = match conn.get(session_key(sid_hash)).await {
            Ok(v) => v,
            Err(e) => {
                warn!("Session cache read failed: {}", e);
                return None;
            }
        };

        let user = cached.and_then(|json| serde_json::from_str(&json).ok());
        if user.is_some() {
            debug!("Session cache hit");
        }
        user
    }

    pub async fn invalidate_session(&self, sid_hash: &str) {
        let mut conn = self.redis.conn.clone();
        let res: Result<(), redis::RedisError> = conn.del(session_key(sid_hash)).await;
        if let Err(e) = res {
            warn!("Failed to invalidate cached session: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(session_key("abc"), "session:abc");
    }
}
