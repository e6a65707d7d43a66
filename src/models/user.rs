use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    // Accounts created through Google sign-in have no usable password
    pub fn has_password(&self) -> bool {
        !self.password_hash.is_empty()
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            profile_image_url: self.profile_image_url.clone(),
        }
    }
}

/// What the API exposes about a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image_url: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "passwords_match"))]
pub struct RegisterRequest {
    #[validate(email(message = "Adresse courriel invalide"))]
    pub email: String,
    #[validate(length(min = 6, message = "Le mot de passe doit contenir au moins 6 caractères"))]
    pub password: String,
    pub confirm_password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[validate(url)]
    pub profile_image_url: Option<String>,
}

fn passwords_match(req: &RegisterRequest) -> Result<(), ValidationError> {
    match &req.confirm_password {
        Some(confirm) if confirm != &req.password => {
            let mut err = ValidationError::new("confirm_password");
            err.message = Some("Les mots de passe ne correspondent pas".into());
            Err(err)
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(length(min = 1))]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GoogleSignInRequest {
    #[validate(length(min = 1, message = "Token ID requis"))]
    pub id_token: String,
    pub access_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(password: &str, confirm: Option<&str>) -> RegisterRequest {
        RegisterRequest {
            email: "sam@example.com".into(),
            password: password.into(),
            confirm_password: confirm.map(Into::into),
            first_name: Some("Sam".into()),
            last_name: Some("Hébert".into()),
            profile_image_url: None,
        }
    }

    #[test]
    fn confirmation_must_match_when_present() {
        assert!(register("secret1", Some("secret1")).validate().is_ok());
        assert!(register("secret1", None).validate().is_ok());
        assert!(register("secret1", Some("secret2")).validate().is_err());
    }

    #[test]
    fn rejects_malformed_email() {
        let mut req = register("secret1", None);
        req.email = "not-an-email".into();
        assert!(req.validate().is_err());
    }
}
