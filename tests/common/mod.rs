#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use fake::{faker::internet::en::SafeEmail, Fake};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use sam_events::{app, config::Config, storage::MemoryStorage, AppState};

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub storage: Arc<MemoryStorage>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
    pub text: String,
}

/// App over in-memory storage; Google calendar calls go to `google_api` when given.
pub fn spawn_app(google_api: Option<&str>) -> TestApp {
    let mut config = Config::default();
    config.session.bcrypt_cost = 4;
    if let Some(url) = google_api {
        config.google.calendar_api_url = url.to_string();
        config.google.token_url = format!("{}/token", url);
    }

    let storage = Arc::new(MemoryStorage::new());
    let state = AppState::new(config, storage.clone(), None).expect("app state");
    TestApp {
        router: app(state.clone()),
        state,
        storage,
    }
}

pub fn random_email() -> String {
    SafeEmail().fake()
}

impl TestApp {
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let text = String::from_utf8_lossy(&bytes).to_string();
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);

        TestResponse { status, headers, body, text }
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, cookie, None).await
    }

    pub async fn post(&self, uri: &str, cookie: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::POST, uri, cookie, Some(body)).await
    }

    /// Registers a fresh account and returns its `sid=...` cookie pair.
    pub async fn register(&self, email: &str) -> String {
        let res = self
            .post(
                "/api/auth/register",
                None,
                json!({ "email": email, "password": "secret123", "firstName": "Sam" }),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK, "register failed: {}", res.text);
        session_cookie(&res.headers).expect("session cookie")
    }

    pub async fn create_event(
        &self,
        cookie: &str,
        title: &str,
        date: &str,
        extra: Value,
    ) -> TestResponse {
        let mut body = json!({
            "title": title,
            "date": date,
            "venue": "La Taverne de Chambly, 1737 Av. Bourgogne, Chambly, QC J3L 1Y8",
        });
        if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
            body.extend(extra.clone());
        }
        self.post("/api/events", Some(cookie), body).await
    }

    pub async fn connect_google(&self, cookie: &str, access_token: &str) -> Value {
        let res = self
            .post(
                "/api/calendar-integrations",
                Some(cookie),
                json!({ "provider": "google", "accessToken": access_token, "calendarId": "primary" }),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK, "integration failed: {}", res.text);
        res.body["integration"].clone()
    }
}

pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}
