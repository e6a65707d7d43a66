use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use tracing::error;
use validator::{Validate, ValidationErrors};

use crate::storage::StorageError;

/// Errors a handler can return; rendered as `{"message": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError::NotFound(msg.into())
    }

    pub fn unauthorized() -> Self {
        ApiError::Unauthorized("Unauthorized".into())
    }

    pub fn internal(context: &str, err: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, err);
        ApiError::Internal(context.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "message": self.to_string() }))).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict(_) => ApiError::BadRequest("User already exists".into()),
            StorageError::Database(e) => ApiError::internal("Database error", e),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::BadRequest(first_validation_message(&errors))
    }
}

// The first human-readable message, falling back to the field name
fn first_validation_message(errors: &ValidationErrors) -> String {
    let field_errors = errors.field_errors();
    let mut fields: Vec<_> = field_errors.iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));

    for (field, errs) in fields {
        if let Some(err) = errs.first() {
            return match &err.message {
                Some(msg) => msg.to_string(),
                None => format!("Invalid field `{}`", field),
            };
        }
    }
    "Invalid request".to_string()
}

/// JSON body that has also passed `validator` checks.
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use validator::Validate;

    #[derive(Validate)]
    struct Form {
        #[validate(length(min = 1, message = "Le titre est requis"))]
        title: String,
    }

    #[tokio::test]
    async fn errors_render_a_message_body() {
        let response = ApiError::not_found("Event not found").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["message"], "Event not found");
    }

    #[test]
    fn validation_errors_use_field_message() {
        let err = Form { title: String::new() }.validate().unwrap_err();
        let api: ApiError = err.into();
        assert_eq!(api.status(), StatusCode::BAD_REQUEST);
        assert_eq!(api.to_string(), "Le titre est requis");
    }

    #[test]
    fn conflicts_become_bad_requests() {
        let api: ApiError = StorageError::Conflict("a@b.c".into()).into();
        assert_eq!(api.status(), StatusCode::BAD_REQUEST);
    }
}
