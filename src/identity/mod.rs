/// End-user identity provider
///
/// The provider's user record is the single authoritative source of ban
/// state. Everything else (the status mirror, pushed signals) is derived
/// from it and never consulted for enforcement.

pub mod local;

pub use local::{LocalIdentityProvider, SessionClaims};

use crate::{
    error::{AppError, AppResult},
    pagination::Page,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account status held in provider metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Banned,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Banned => "banned",
        }
    }

    pub fn from_str(s: &str) -> AppResult<Self> {
        match s {
            "active" => Ok(UserStatus::Active),
            "banned" => Ok(UserStatus::Banned),
            _ => Err(AppError::Internal(format!("Unknown user status: {}", s))),
        }
    }
}

/// User record as held by the identity provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub image_url: Option<String>,
    pub banned: bool,
    pub status: UserStatus,
    pub status_reason: Option<String>,
    pub status_changed_at: Option<DateTime<Utc>>,
    pub status_changed_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_sign_in_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    /// Banned through either the provider flag or the status metadata
    pub fn is_banned(&self) -> bool {
        self.banned || self.status == UserStatus::Banned
    }
}

/// Change to a user's moderation metadata
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: UserStatus,
    pub reason: Option<String>,
    pub changed_by: String,
    /// Stamp `approved_at` along with the change
    pub approve: bool,
}

/// Identity provider operations the service depends on
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify an end-user session token and return the caller's record
    async fn authenticate(&self, session_token: &str) -> AppResult<UserRecord>;

    /// Look up a user; deleted users are absent
    async fn get_user(&self, user_id: &str) -> AppResult<Option<UserRecord>>;

    /// Page through users, newest first. Returns the page and the total.
    async fn list_users(&self, page: Page) -> AppResult<(Vec<UserRecord>, i64)>;

    async fn count_users(&self) -> AppResult<i64>;

    /// Update moderation metadata, returning the updated record
    async fn update_status(&self, user_id: &str, update: StatusUpdate) -> AppResult<UserRecord>;

    async fn delete_user(&self, user_id: &str) -> AppResult<()>;
}
