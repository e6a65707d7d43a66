use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::task;
use tracing::{info, warn};

use crate::auth::{self, oauth_state};
use crate::error::{ApiError, ValidatedJson};
use crate::middleware::AuthUser;
use crate::models::user::{GoogleSignInRequest, LoginRequest, RegisterRequest};
use crate::models::{CalendarProvider, IntegrationChanges, NewCalendarIntegration, NewUser, User};
use crate::AppState;

const INTEGRATIONS_PAGE: &str = "/calendar-integrations";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/user", get(current_user))
        .route("/auth/google", post(google_sign_in).get(google_connect))
        .route("/auth/google/callback", get(google_callback))
        .route("/logout", get(logout_redirect))
}

async fn hash_blocking(password: String, cost: u32) -> Result<String, ApiError> {
    task::spawn_blocking(move || auth::hash_password(&password, cost))
        .await
        .map_err(|e| ApiError::internal("Password hashing task failed", e))?
        .map_err(|e| ApiError::internal("Password hashing failed", e))
}

fn signed_in(cookie: String, body: serde_json::Value) -> impl IntoResponse {
    ([(header::SET_COOKIE, cookie)], Json(body))
}

/// POST /api/auth/register
async fn register(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if state.storage.get_user_by_email(&req.email).await?.is_some() {
        return Err(ApiError::bad_request("User already exists"));
    }

    let password_hash = hash_blocking(req.password, state.config.session.bcrypt_cost).await?;
    let user = state
        .storage
        .create_user(NewUser {
            email: req.email.trim().to_string(),
            password_hash,
            first_name: req.first_name,
            last_name: req.last_name,
            profile_image_url: req.profile_image_url,
        })
        .await?;

    info!(user_id = %user.id, "User registered");
    let cookie = auth::open_session(&state, &user).await?;
    Ok(signed_in(cookie, json!(user.profile())))
}

/// POST /api/auth/login
async fn login(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let invalid = || ApiError::Unauthorized("Invalid email or password".into());

    let user = state
        .storage
        .get_user_by_email(&req.email)
        .await?
        .filter(User::has_password)
        .ok_or_else(invalid)?;

    let hash = user.password_hash.clone();
    let valid = task::spawn_blocking(move || auth::verify_password(&req.password, &hash))
        .await
        .map_err(|e| ApiError::internal("Password check task failed", e))?;
    if !valid {
        warn!(user_id = %user.id, "Failed login attempt");
        return Err(invalid());
    }

    let cookie = auth::open_session(&state, &user).await?;
    Ok(signed_in(cookie, json!(user.profile())))
}

/// POST /api/auth/logout
async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let cookie = auth::close_session(&state, &headers).await?;
    Ok(([(header::SET_COOKIE, cookie)], Json(json!({ "message": "Déconnexion réussie" }))))
}

/// GET /api/logout
async fn logout_redirect(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let cookie = auth::close_session(&state, &headers).await?;
    Ok(([(header::SET_COOKIE, cookie)], Redirect::to("/")))
}

/// GET /api/auth/user
async fn current_user(user: AuthUser) -> impl IntoResponse {
    Json(user.profile)
}

/// POST /api/auth/google
///
/// Signs in with a Firebase id token, creating the account on first use.
/// An accompanying Google access token becomes the user's calendar integration.
async fn google_sign_in(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<GoogleSignInRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = state.id_tokens.verify(&req.id_token).await.map_err(|e| {
        warn!("Google id token rejected: {}", e);
        ApiError::Unauthorized("Token Google invalide".into())
    })?;
    let email = claims
        .email
        .clone()
        .ok_or_else(|| ApiError::bad_request("Email requis depuis Google"))?;

    let user = match state.storage.get_user_by_email(&email).await? {
        Some(user) => match claims.picture.as_deref() {
            Some(picture) if user.profile_image_url.as_deref() != Some(picture) => state
                .storage
                .update_profile_image(user.id, picture)
                .await?
                .unwrap_or(user),
            _ => user,
        },
        None => {
            let (first_name, last_name) = claims.names();
            let first_name = first_name.or_else(|| email.split('@').next().map(str::to_string));
            state
                .storage
                .create_user(NewUser {
                    email: email.clone(),
                    password_hash: String::new(),
                    first_name,
                    last_name,
                    profile_image_url: claims.picture.clone(),
                })
                .await?
        }
    };

    let with_calendar = match req.access_token.as_deref().filter(|t| !t.is_empty()) {
        Some(access_token) => connect_google_calendar(&state, &user, access_token).await,
        None => false,
    };

    let cookie = auth::open_session(&state, &user).await?;
    let mut body = json!(user.profile());
    body["calendarIntegration"] = json!(with_calendar);
    Ok(signed_in(cookie, body))
}

// Failures here never block the sign-in itself
async fn connect_google_calendar(state: &AppState, user: &User, access_token: &str) -> bool {
    let expires_at = Some(Utc::now() + Duration::hours(1));
    let result = match state
        .storage
        .get_active_integration(user.id, CalendarProvider::Google)
        .await
    {
        Ok(Some(existing)) => state
            .storage
            .update_integration(
                existing.id,
                user.id,
                IntegrationChanges {
                    access_token: Some(access_token.to_string()),
                    expires_at,
                    is_active: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map(|_| ()),
        Ok(None) => state
            .storage
            .create_integration(
                user.id,
                NewCalendarIntegration {
                    provider: CalendarProvider::Google,
                    access_token: access_token.to_string(),
                    refresh_token: None,
                    expires_at,
                    calendar_id: Some("primary".into()),
                    is_active: true,
                },
            )
            .await
            .map(|_| ()),
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {
            info!(user_id = %user.id, "Google calendar integration stored");
            true
        }
        Err(e) => {
            warn!(user_id = %user.id, "Could not store Google calendar integration: {}", e);
            false
        }
    }
}

/// GET /api/auth/google
async fn google_connect(State(state): State<Arc<AppState>>, user: AuthUser) -> Redirect {
    let oauth = state.calendars.oauth();
    let url = oauth_state::sign_state(&state.config.session.secret, user.user_id, Utc::now())
        .map_err(|e| e.to_string())
        .and_then(|s| oauth.authorize_url(&s).map_err(|e| e.to_string()));

    match url {
        Ok(url) => {
            info!(user_id = %user.user_id, "Redirecting to Google consent screen");
            Redirect::to(&url)
        }
        Err(e) => {
            warn!("Could not start Google OAuth: {}", e);
            Redirect::to(&format!("{}?error=oauth-init-failed", INTEGRATIONS_PAGE))
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// GET /api/auth/google/callback
async fn google_callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    let back = |outcome: &str| Redirect::to(&format!("{}?{}", INTEGRATIONS_PAGE, outcome));

    if let Some(error) = query.error {
        warn!("Google OAuth error: {}", error);
        return back("error=oauth-denied");
    }
    let Some(code) = query.code else {
        return back("error=no-code");
    };
    let Some(user_id) = query
        .state
        .as_deref()
        .and_then(|s| oauth_state::verify_state(&state.config.session.secret, s).ok())
    else {
        return back("error=no-user-id");
    };

    let grant = match state.calendars.oauth().exchange_code(&code).await {
        Ok(grant) => grant,
        Err(e) => {
            warn!("Google code exchange failed: {}", e);
            return back("error=oauth-failed");
        }
    };

    let created = state
        .storage
        .create_integration(
            user_id,
            NewCalendarIntegration {
                provider: CalendarProvider::Google,
                access_token: grant.access_token.clone(),
                refresh_token: grant.refresh_token.clone(),
                expires_at: grant.expires_at(Utc::now()),
                calendar_id: Some("primary".into()),
                is_active: true,
            },
        )
        .await;

    match created {
        Ok(integration) => {
            info!(integration_id = %integration.id, "Google calendar connected");
            back("success=google-connected")
        }
        Err(e) => {
            warn!("Could not store Google integration: {}", e);
            back("error=oauth-failed")
        }
    }
}
