/// Ban propagation
///
/// Bans are written to the identity provider first; that record is what
/// request middleware enforces. Afterwards a [`BanSignal`] is fanned out to
/// the status mirror and the in-process hub so open client sessions can
/// react early. Fan-out failures are logged and otherwise ignored.

pub mod hub;
pub mod mirror;
pub mod service;

pub use hub::SignalHub;
pub use mirror::{SqliteStatusMirror, StatusMirror};
pub use service::BanService;

use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where ban signals originate
pub const ADMIN_PANEL_SOURCE: &str = "admin_panel";

/// Status carried by a ban signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStatus {
    Banned,
    Active,
    Deleted,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::Banned => "banned",
            SignalStatus::Active => "active",
            SignalStatus::Deleted => "deleted",
        }
    }

    pub fn from_str(s: &str) -> AppResult<Self> {
        match s {
            "banned" => Ok(SignalStatus::Banned),
            "active" => Ok(SignalStatus::Active),
            "deleted" => Ok(SignalStatus::Deleted),
            _ => Err(AppError::Internal(format!("Unknown signal status: {}", s))),
        }
    }
}

/// A derived notification that a user's status changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanSignal {
    pub user_id: String,
    pub status: SignalStatus,
    pub reason: Option<String>,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

impl BanSignal {
    pub fn new(user_id: &str, status: SignalStatus, reason: Option<String>) -> Self {
        Self {
            user_id: user_id.to_string(),
            status,
            reason,
            source: ADMIN_PANEL_SOURCE.to_string(),
            created_at: Utc::now(),
        }
    }
}
