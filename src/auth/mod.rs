//! Passwords, server-side sessions and the `sid` cookie.

pub mod oauth_state;
pub mod oidc;

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::ApiError;
use crate::models::{Session, User};
use crate::AppState;

pub use oidc::{IdTokenClaims, IdTokenVerifier};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("signing keys unavailable: {0}")]
    Keys(String),
    #[error("identity provider is not configured")]
    NotConfigured,
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AuthError::InvalidToken(err.to_string())
    }
}

pub fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    Ok(bcrypt::hash(password, cost)?)
}

/// False for malformed hashes as well as wrong passwords.
pub fn verify_password(password: &str, hash: &str) -> bool {
    if hash.is_empty() {
        return false;
    }
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// 256 bits of randomness, URL-safe.
pub fn new_session_id() -> String {
    let mut raw = [0u8; 32];
    raw[..16].copy_from_slice(Uuid::new_v4().as_bytes());
    raw[16..].copy_from_slice(Uuid::new_v4().as_bytes());
    URL_SAFE_NO_PAD.encode(raw)
}

/// Storage key for a session id; the raw id only lives in the cookie.
pub fn hash_session_id(sid: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(sid.as_bytes()))
}

pub fn session_cookie(config: &SessionConfig, sid: &str) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        config.cookie_name, sid, config.ttl_seconds
    );
    if config.secure_cookie {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn clear_session_cookie(config: &SessionConfig) -> String {
    let mut cookie = format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", config.cookie_name);
    if config.secure_cookie {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Seconds left before `expires_at`, zero once it has passed.
pub fn remaining_ttl(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (expires_at - now).num_seconds().max(0) as u64
}

/// Opens a session for `user` and returns the `Set-Cookie` value.
pub async fn open_session(state: &AppState, user: &User) -> Result<String, ApiError> {
    let session_config = &state.config.session;
    let sid = new_session_id();
    let sid_hash = hash_session_id(&sid);
    let now = Utc::now();
    let expires_at = now + Duration::seconds(session_config.ttl_seconds);

    state
        .storage
        .create_session(Session {
            sid_hash: sid_hash.clone(),
            user_id: user.id,
            expires_at,
        })
        .await?;

    if let Some(cache) = &state.cache {
        cache
            .cache_session(&sid_hash, &user.profile(), remaining_ttl(expires_at, now))
            .await;
    }

    info!(user_id = %user.id, "Session opened");
    Ok(session_cookie(session_config, &sid))
}

/// Drops the session named by the request cookie, if any, and returns the clearing cookie.
pub async fn close_session(state: &AppState, headers: &HeaderMap) -> Result<String, ApiError> {
    let session_config = &state.config.session;
    if let Some(sid) = read_cookie(headers, &session_config.cookie_name) {
        let sid_hash = hash_session_id(&sid);
        if let Some(cache) = &state.cache {
            cache.invalidate_session(&sid_hash).await;
        }
        state.storage.delete_session(&sid_hash).await?;
    }
    Ok(clear_session_cookie(session_config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn passwords_round_trip_through_bcrypt() {
        let hash = hash_password("secret1", 4).unwrap();
        assert!(verify_password("secret1", &hash));
        assert!(!verify_password("secret2", &hash));
        assert!(!verify_password("secret1", ""));
        assert!(!verify_password("secret1", "not-a-hash"));
    }

    #[test]
    fn session_ids_are_unique_and_hashed() {
        let a = new_session_id();
        let b = new_session_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert_eq!(hash_session_id(&a), hash_session_id(&a));
        assert_ne!(hash_session_id(&a), a);
    }

    #[test]
    fn cookie_attributes() {
        let mut config = crate::config::Config::default().session;
        let cookie = session_cookie(&config, "abc");
        assert!(cookie.starts_with("sid=abc;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=604800"));
        assert!(!cookie.contains("Secure"));

        config.secure_cookie = true;
        assert!(session_cookie(&config, "abc").ends_with("; Secure"));
        assert!(clear_session_cookie(&config).contains("Max-Age=0"));
    }

    #[test]
    fn reads_named_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; sid=xyz; lang=fr"));
        assert_eq!(read_cookie(&headers, "sid").as_deref(), Some("xyz"));
        assert_eq!(read_cookie(&headers, "missing"), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer tok"));
        assert_eq!(bearer_token(&headers), Some("tok"));
    }

    #[test]
    fn remaining_ttl_counts_down_to_zero() {
        let now = Utc::now();
        assert_eq!(remaining_ttl(now + Duration::seconds(5), now), 5);
        assert_eq!(remaining_ttl(now + Duration::days(7), now), 604_800);
        assert_eq!(remaining_ttl(now - Duration::seconds(30), now), 0);
    }
}
