//! Google OAuth 2.0 web-server flow: consent URL, code exchange, token refresh.

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use super::CalendarError;
use crate::config::GoogleConfig;

pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenGrant {
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in.map(|secs| now + Duration::seconds(secs))
    }
}

#[derive(Clone)]
pub struct GoogleOAuthClient {
    http: Client,
    client_id: Option<String>,
    client_secret: Option<String>,
    auth_url: String,
    token_url: String,
    redirect_url: String,
}

impl GoogleOAuthClient {
    pub fn new(http: Client, config: &GoogleConfig) -> Self {
        Self {
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
            redirect_url: config.redirect_url.clone(),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }

    fn credentials(&self) -> Result<(&str, &str), CalendarError> {
        match (self.client_id.as_deref(), self.client_secret.as_deref()) {
            (Some(id), Some(secret)) => Ok((id, secret)),
            _ => Err(CalendarError::MissingCredentials("GOOGLE_CLIENT_ID / GOOGLE_CLIENT_SECRET")),
        }
    }

    /// Consent screen URL; `prompt=consent` so Google hands out a refresh token.
    pub fn authorize_url(&self, state: &str) -> Result<String, CalendarError> {
        let (client_id, _) = self.credentials()?;
        let query = serde_urlencoded::to_string([
            ("client_id", client_id),
            ("redirect_uri", self.redirect_url.as_str()),
            ("response_type", "code"),
            ("scope", CALENDAR_SCOPE),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("include_granted_scopes", "true"),
            ("state", state),
        ])
        .map_err(|e| CalendarError::Config(e.to_string()))?;
        Ok(format!("{}?{}", self.auth_url, query))
    }

    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant, CalendarError> {
        let (client_id, client_secret) = self.credentials()?;
        let params = [
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("redirect_uri", self.redirect_url.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
        ];
        let grant = self.token_request(&params).await?;
        info!("Google authorization code exchanged");
        Ok(grant)
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, CalendarError> {
        let (client_id, client_secret) = self.credentials()?;
        let params = [
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        self.token_request(&params).await
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenGrant, CalendarError> {
        let res = self.http.post(&self.token_url).form(params).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!("Google token endpoint answered {}: {}", status, body);
            return Err(CalendarError::Api { status: status.as_u16(), body });
        }
        Ok(res.json::<TokenGrant>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(token_url: String) -> GoogleOAuthClient {
        let mut google = Config::default().google;
        google.client_id = Some("client-123".into());
        google.client_secret = Some("shh".into());
        google.token_url = token_url;
        GoogleOAuthClient::new(Client::new(), &google)
    }

    #[test]
    fn consent_url_requests_offline_calendar_access() {
        let url = client("http://unused".into()).authorize_url("signed-state").unwrap();
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=client-123"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains("state=signed-state"));
        assert!(url.contains("scope=https%3A%2F%2Fwww.googleapis.com%2Fauth%2Fcalendar"));
    }

    #[test]
    fn missing_credentials_are_reported() {
        let oauth = GoogleOAuthClient::new(Client::new(), &Config::default().google);
        assert!(!oauth.has_credentials());
        assert!(matches!(
            oauth.authorize_url("s"),
            Err(CalendarError::MissingCredentials(_))
        ));
    }

    #[tokio::test]
    async fn refresh_posts_a_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=1%2F%2Frefresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.new",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let oauth = client(format!("{}/token", server.uri()));
        let grant = oauth.refresh("1//refresh").await.unwrap();
        assert_eq!(grant.access_token, "ya29.new");
        let now = Utc::now();
        assert_eq!(grant.expires_at(now), Some(now + Duration::seconds(3599)));
    }
}
