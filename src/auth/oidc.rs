//! Verification of Firebase / Google id tokens against the published JWKS.

use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::AuthError;

const KEYS_MAX_AGE: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Deserialize)]
pub struct IdTokenClaims {
    pub sub: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
}

impl IdTokenClaims {
    /// Splits the display name into first and last name.
    pub fn names(&self) -> (Option<String>, Option<String>) {
        match self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => match name.split_once(' ') {
                Some((first, last)) => (Some(first.to_string()), Some(last.trim().to_string())),
                None => (Some(name.to_string()), None),
            },
            None => (None, None),
        }
    }
}

struct CachedKeys {
    set: JwkSet,
    fetched_at: Instant,
}

pub struct IdTokenVerifier {
    http: reqwest::Client,
    jwks_url: String,
    project_id: Option<String>,
    keys: RwLock<Option<CachedKeys>>,
}

impl IdTokenVerifier {
    pub fn new(
        http: reqwest::Client,
        jwks_url: impl Into<String>,
        project_id: Option<String>,
    ) -> Self {
        Self {
            http,
            jwks_url: jwks_url.into(),
            project_id,
            keys: RwLock::new(None),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.project_id.is_some()
    }

    pub async fn verify(&self, token: &str) -> Result<IdTokenClaims, AuthError> {
        let project_id = self.project_id.as_deref().ok_or(AuthError::NotConfigured)?;

        let header = decode_header(token)?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::InvalidToken(format!("unexpected algorithm {:?}", header.alg)));
        }
        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("missing key id".into()))?;

        let key = self.decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[project_id]);
        validation.set_issuer(&[format!("https://securetoken.google.com/{}", project_id)]);

        let data = decode::<IdTokenClaims>(token, &key, &validation)?;
        Ok(data.claims)
    }

    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        {
            let cached = self.keys.read().await;
            if let Some(keys) = cached.as_ref() {
                if keys.fetched_at.elapsed() < KEYS_MAX_AGE {
                    if let Some(jwk) = keys.set.find(kid) {
                        return Ok(DecodingKey::from_jwk(jwk)?);
                    }
                }
            }
        }

        // Stale cache or rotated keys
        let set = self.fetch_keys().await?;
        let key = set
            .find(kid)
            .map(DecodingKey::from_jwk)
            .transpose()?
            .ok_or_else(|| AuthError::InvalidToken(format!("unknown key id {}", kid)));

        *self.keys.write().await = Some(CachedKeys { set, fetched_at: Instant::now() });
        key
    }

    async fn fetch_keys(&self) -> Result<JwkSet, AuthError> {
        debug!("Fetching id token signing keys from {}", self.jwks_url);
        let response = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| AuthError::Keys(e.to_string()))?;

        if !response.status().is_success() {
            warn!("JWKS endpoint answered {}", response.status());
            return Err(AuthError::Keys(format!("status {}", response.status())));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| AuthError::Keys(e.to_string()))
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn jwks_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(TEST_JWKS, "application/json"))
            .expect(1)
            .mount(&server)
            .await;
        server
    }

    fn in_one_hour() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[tokio::test]
    async fn accepts_token_for_configured_project() {
        let server = jwks_server().await;
        let verifier = IdTokenVerifier::new(reqwest::Client::new(), server.uri(), Some("sam-events".into()));

        let token = sign_id_token("sam-events", "sam@example.com", in_one_hour());
        let claims = verifier.verify(&token).await.unwrap();
        assert_eq!(claims.email.as_deref(), Some("sam@example.com"));
        assert_eq!(claims.names(), (Some("Sam".into()), Some("Hébert".into())));

        // Second verification is served from the key cache
        verifier.verify(&token).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_wrong_audience_and_expired_tokens() {
        let server = jwks_server().await;
        let verifier = IdTokenVerifier::new(reqwest::Client::new(), server.uri(), Some("sam-events".into()));

        let other = sign_id_token("someone-else", "sam@example.com", in_one_hour());
        assert!(verifier.verify(&other).await.is_err());

        let expired = sign_id_token("sam-events", "sam@example.com", chrono::Utc::now().timestamp() - 600);
        assert!(verifier.verify(&expired).await.is_err());
    }

    #[tokio::test]
    async fn unconfigured_verifier_refuses() {
        let verifier = IdTokenVerifier::new(reqwest::Client::new(), "http://127.0.0.1:9", None);
        assert!(matches!(verifier.verify("a.b.c").await, Err(AuthError::NotConfigured)));
    }
}
