/// Admin accounts and access control
///
/// Holds the admin credential store, the role hierarchy and the
/// permission vocabulary checked by admin endpoints.

pub mod accounts;
pub mod roles;

pub use accounts::{AdminAccount, AdminAccountStore, FailedLogin, LockoutPolicy, NewAdminAccount};
pub use roles::{Permission, Role};

use serde::{Deserialize, Serialize};

/// Admin action audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: i64,
    pub admin_id: String,
    pub action: String,
    pub subject: Option<String>,
    pub details: Option<serde_json::Value>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
