use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::auth::{self, hash_session_id, read_cookie, remaining_ttl};
use crate::error::ApiError;
use crate::models::UserProfile;
use crate::AppState;

/// The signed-in user, resolved from the session cookie or a bearer id token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub profile: UserProfile,
}

impl From<UserProfile> for AuthUser {
    fn from(profile: UserProfile) -> Self {
        AuthUser { user_id: profile.id, profile }
    }
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(sid) = read_cookie(&parts.headers, &state.config.session.cookie_name) {
            if let Some(user) = user_from_session(state, &sid).await? {
                return Ok(user);
            }
        }

        // Clients holding only an id token
        if let Some(token) = auth::bearer_token(&parts.headers) {
            if let Some(user) = user_from_id_token(state, token).await? {
                return Ok(user);
            }
        }

        Err(ApiError::unauthorized())
    }
}

async fn user_from_session(state: &AppState, sid: &str) -> Result<Option<AuthUser>, ApiError> {
    let sid_hash = hash_session_id(sid);

    if let Some(cache) = &state.cache {
        if let Some(profile) = cache.get_cached_session(&sid_hash).await {
            return Ok(Some(profile.into()));
        }
    }

    let now = Utc::now();
    let Some(session) = state.storage.active_session(&sid_hash, now).await? else {
        debug!("Unknown or expired session");
        return Ok(None);
    };
    let Some(user) = state.storage.get_user(session.user_id).await? else {
        return Ok(None);
    };

    let profile = user.profile();
    if let Some(cache) = &state.cache {
        cache
            .cache_session(&sid_hash, &profile, remaining_ttl(session.expires_at, now))
            .await;
    }
    Ok(Some(profile.into()))
}

async fn user_from_id_token(state: &AppState, token: &str) -> Result<Option<AuthUser>, ApiError> {
    if !state.id_tokens.is_configured() {
        return Ok(None);
    }
    let claims = match state.id_tokens.verify(token).await {
        Ok(claims) => claims,
        Err(e) => {
            debug!("Bearer id token rejected: {}", e);
            return Ok(None);
        }
    };
    let Some(email) = claims.email else {
        return Ok(None);
    };
    Ok(state
        .storage
        .get_user_by_email(&email)
        .await?
        .map(|user| user.profile().into()))
}
