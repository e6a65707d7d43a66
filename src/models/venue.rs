use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, FromRow, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SavedVenue {
    pub id: Uuid,
    pub user_id: Uuid,
    pub venue_name: String,
    pub venue_address: Option<String>,
    pub facebook_id: Option<String>,
    pub facebook_url: Option<String>,
    pub profile_picture_url: Option<String>,
    pub website_url: Option<String>,
    pub google_maps_url: Option<String>,
    pub use_count: i32,
    pub last_used: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SaveVenueRequest {
    #[validate(length(min = 1, message = "Le nom du lieu est requis"))]
    pub venue_name: String,
    pub venue_address: Option<String>,
    pub facebook_id: Option<String>,
    pub facebook_url: Option<String>,
    pub profile_picture_url: Option<String>,
    pub website_url: Option<String>,
    pub google_maps_url: Option<String>,
}
