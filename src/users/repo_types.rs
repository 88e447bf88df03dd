use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,                             // unique user ID
    pub username: String,                     // lower-cased
    pub email: String,                        // lower-cased, unique
    #[serde(skip_serializing)]
    pub password_hash: String,                // Argon2 hash, not exposed in JSON
    pub inactive: bool,                       // true until the account is activated
    #[serde(skip_serializing)]
    pub activation_token: Option<String>,     // cleared by activation
    pub created_at: OffsetDateTime,           // creation timestamp
}

/// Values needed to insert a user. New users are always written as inactive.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub activation_token: String,
}
