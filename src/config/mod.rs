use serde::Deserialize;
use std::env;
use std::str::FromStr;
use thiserror::Error;

// Top-level configuration, one section per concern
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: Option<RedisConfig>,
    pub session: SessionConfig,
    pub google: GoogleConfig,
    pub microsoft: MicrosoftConfig,
    pub venues: VenueSearchConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
    pub log_format: String,
    /// Public origin used to build OAuth redirect URLs.
    pub public_base_url: String,
    pub http_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `postgres://...` or `memory://` for the in-process store.
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub session_cache_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub secret: String,
    pub cookie_name: String,
    pub ttl_seconds: i64,
    pub secure_cookie: bool,
    pub bcrypt_cost: u32,
}

// Google OAuth / Calendar / Firebase id tokens
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_url: String,
    pub auth_url: String,
    pub token_url: String,
    pub calendar_api_url: String,
    pub firebase_project_id: Option<String>,
    pub jwks_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MicrosoftConfig {
    pub graph_api_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VenueSearchConfig {
    pub facebook_access_token: Option<String>,
    pub facebook_graph_url: String,
    pub places_api_key: Option<String>,
    pub places_api_url: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value `{value}`")]
    Invalid { name: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let public_base_url = var_or("PUBLIC_BASE_URL", &defaults.app.public_base_url);
        let environment = var_or("ENVIRONMENT", &defaults.app.environment);
        let redirect_url = env::var("GOOGLE_REDIRECT_URL")
            .unwrap_or_else(|_| format!("{}/api/auth/google/callback", public_base_url));

        Ok(Config {
            app: AppConfig {
                host: var_or("HOST", &defaults.app.host),
                port: parse_or("PORT", defaults.app.port)?,
                environment: environment.clone(),
                rust_log: var_or("RUST_LOG", &defaults.app.rust_log),
                log_format: var_or("LOG_FORMAT", &defaults.app.log_format),
                public_base_url,
                http_timeout_seconds: parse_or(
                    "HTTP_TIMEOUT_SECONDS",
                    defaults.app.http_timeout_seconds,
                )?,
            },
            database: DatabaseConfig {
                url: var_or("DATABASE_URL", &defaults.database.url),
                pool_size: parse_or("DB_POOL_SIZE", defaults.database.pool_size)?,
            },
            redis: match env::var("REDIS_URL") {
                Ok(url) if !url.is_empty() => Some(RedisConfig {
                    url,
                    session_cache_seconds: parse_or("SESSION_CACHE_SECONDS", 900)?,
                }),
                _ => None,
            },
            session: SessionConfig {
                secret: var_or("SESSION_SECRET", &defaults.session.secret),
                cookie_name: var_or("SESSION_COOKIE_NAME", &defaults.session.cookie_name),
                ttl_seconds: parse_or("SESSION_TTL_SECONDS", defaults.session.ttl_seconds)?,
                secure_cookie: parse_or("SESSION_SECURE_COOKIE", environment == "production")?,
                bcrypt_cost: parse_or("BCRYPT_COST", defaults.session.bcrypt_cost)?,
            },
            google: GoogleConfig {
                client_id: optional("GOOGLE_CLIENT_ID"),
                client_secret: optional("GOOGLE_CLIENT_SECRET"),
                redirect_url,
                auth_url: var_or("GOOGLE_AUTH_URL", &defaults.google.auth_url),
                token_url: var_or("GOOGLE_TOKEN_URL", &defaults.google.token_url),
                calendar_api_url: var_or("GOOGLE_CALENDAR_API_URL", &defaults.google.calendar_api_url),
                firebase_project_id: optional("FIREBASE_PROJECT_ID"),
                jwks_url: var_or("GOOGLE_JWKS_URL", &defaults.google.jwks_url),
            },
            microsoft: MicrosoftConfig {
                graph_api_url: var_or("MICROSOFT_GRAPH_API_URL", &defaults.microsoft.graph_api_url),
            },
            venues: VenueSearchConfig {
                facebook_access_token: optional("FACEBOOK_ACCESS_TOKEN"),
                facebook_graph_url: var_or("FACEBOOK_GRAPH_URL", &defaults.venues.facebook_graph_url),
                places_api_key: optional("GOOGLE_PLACES_API_KEY_SERVER"),
                places_api_url: var_or("GOOGLE_PLACES_API_URL", &defaults.venues.places_api_url),
            },
        })
    }

    pub fn is_production(&self) -> bool {
        self.app.environment == "production"
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            app: AppConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
                environment: "development".to_string(),
                rust_log: "sam_events=debug,tower_http=debug".to_string(),
                log_format: "pretty".to_string(),
                public_base_url: "http://localhost:5000".to_string(),
                http_timeout_seconds: 15,
            },
            database: DatabaseConfig {
                url: "memory://".to_string(),
                pool_size: 10,
            },
            redis: None,
            session: SessionConfig {
                secret: "fallback-secret-for-dev".to_string(),
                cookie_name: "sid".to_string(),
                ttl_seconds: 7 * 24 * 60 * 60,
                secure_cookie: false,
                bcrypt_cost: bcrypt::DEFAULT_COST,
            },
            google: GoogleConfig {
                client_id: None,
                client_secret: None,
                redirect_url: "http://localhost:5000/api/auth/google/callback".to_string(),
                auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
                token_url: "https://oauth2.googleapis.com/token".to_string(),
                calendar_api_url: "https://www.googleapis.com/calendar/v3".to_string(),
                firebase_project_id: None,
                jwks_url: "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com".to_string(),
            },
            microsoft: MicrosoftConfig {
                graph_api_url: "https://graph.microsoft.com/v1.0".to_string(),
            },
            venues: VenueSearchConfig {
                facebook_access_token: None,
                facebook_graph_url: "https://graph.facebook.com/v18.0".to_string(),
                places_api_key: None,
                places_api_url: "https://maps.googleapis.com/maps/api/place".to_string(),
            },
        }
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_one_week_sessions() {
        let config = Config::default();
        assert_eq!(config.session.ttl_seconds, 604_800);
        assert_eq!(config.session.cookie_name, "sid");
        assert!(config.redis.is_none());
        assert!(!config.is_production());
    }

    #[test]
    fn malformed_numbers_are_reported() {
        env::set_var("SAM_EVENTS_TEST_PORT", "not-a-port");
        let err = parse_or::<u16>("SAM_EVENTS_TEST_PORT", 80).unwrap_err();
        assert!(err.to_string().contains("SAM_EVENTS_TEST_PORT"));
        env::remove_var("SAM_EVENTS_TEST_PORT");

        assert_eq!(parse_or::<u16>("SAM_EVENTS_TEST_UNSET", 80).unwrap(), 80);
    }
}
