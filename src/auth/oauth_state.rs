//! Signed `state` parameter for the Google calendar consent round trip.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AuthError;

const STATE_TTL_MINUTES: i64 = 10;

#[derive(Debug, Serialize, Deserialize)]
struct StateClaims {
    sub: Uuid,
    exp: i64,
    iat: i64,
}

pub fn sign_state(secret: &str, user_id: Uuid, now: DateTime<Utc>) -> Result<String, AuthError> {
    let claims = StateClaims {
        sub: user_id,
        iat: now.timestamp(),
        exp: (now + Duration::minutes(STATE_TTL_MINUTES)).timestamp(),
    };
    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

/// Returns the user who started the flow.
pub fn verify_state(secret: &str, state: &str) -> Result<Uuid, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    let data = decode::<StateClaims>(state, &DecodingKey::from_secret(secret.as_bytes()), &validation)?;
    Ok(data.claims.sub)
}
