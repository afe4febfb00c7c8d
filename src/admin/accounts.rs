/// Admin credential store
///
/// Owns admin account records, the failed-login counter, and the set of
/// outstanding refresh tokens. Refresh tokens are stored as SHA-256 digests.
use crate::{
    admin::{
        roles::{Permission, Role},
        AuditLogEntry,
    },
    db::{decode_opt_ts, decode_ts, encode_ts},
    error::{AppError, AppResult},
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

lazy_static! {
    /// Hash checked when no account matches, so unknown emails cost the same
    /// argon2 work as wrong passwords
    static ref DUMMY_PASSWORD_HASH: String =
        AdminAccountStore::hash_password("converso-dummy-password").unwrap_or_default();
}

/// Admin account record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminAccount {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub permissions: Vec<Permission>,
    pub is_active: bool,
    pub login_attempts: u32,
    pub lock_until: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AdminAccount {
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.lock_until.map(|until| until > now).unwrap_or(false)
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}

/// Input for creating an admin account
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAdminAccount {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    /// Overrides the role's default permission set
    #[serde(default)]
    pub permissions: Option<Vec<Permission>>,
    #[serde(skip)]
    pub created_by: Option<String>,
}

/// Failed-login lockout policy
#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    /// 0 disables lockout
    pub max_attempts: u32,
    pub lock_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lock_duration: Duration::hours(2),
        }
    }
}

/// Outcome of recording a failed login
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedLogin {
    Counted { attempts: u32 },
    Locked { until: DateTime<Utc> },
}

const ACCOUNT_COLUMNS: &str = "id, email, password_hash, first_name, last_name, role, permissions, \
     is_active, login_attempts, lock_until, last_login, created_by, created_at, updated_at";

/// SQLite-backed admin account store
#[derive(Clone)]
pub struct AdminAccountStore {
    db: SqlitePool,
    lockout: LockoutPolicy,
}

impl AdminAccountStore {
    pub fn new(db: SqlitePool, lockout: LockoutPolicy) -> Self {
        Self { db, lockout }
    }

    /// Hash a password using Argon2id.
    pub fn hash_password(password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
    }

    /// Verify a password against a stored hash.
    pub fn verify_password(password: &str, hash: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(h) => h,
            Err(_) => return false,
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    }

    /// Verify a login attempt. Without an account the password is still
    /// checked against a dummy hash and the attempt fails.
    pub fn verify_login(password: &str, hash: Option<&str>) -> bool {
        match hash {
            Some(hash) => Self::verify_password(password, hash),
            None => {
                Self::verify_password(password, &DUMMY_PASSWORD_HASH);
                false
            }
        }
    }

    /// Digest under which a refresh token is stored
    pub fn token_digest(token: &str) -> String {
        hex::encode(Sha256::digest(token.as_bytes()))
    }

    /// Create a new admin account
    pub async fn create(&self, new: NewAdminAccount) -> AppResult<AdminAccount> {
        let email = new.email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(AppError::Validation("A valid email is required".to_string()));
        }
        if new.password.len() < 8 {
            return Err(AppError::Validation(
                "Password must be at least 8 characters".to_string(),
            ));
        }
        if new.first_name.trim().is_empty() || new.last_name.trim().is_empty() {
            return Err(AppError::Validation("First and last name are required".to_string()));
        }

        if self.find_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict(format!("Admin {} already exists", email)));
        }

        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let password_hash = Self::hash_password(&new.password)?;
        let permissions = new
            .permissions
            .unwrap_or_else(|| new.role.default_permissions());
        let permissions_json = serde_json::to_string(&permissions)
            .map_err(|e| AppError::Internal(format!("Failed to encode permissions: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO admin_accounts
                (id, email, password_hash, first_name, last_name, role, permissions,
                 is_active, login_attempts, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 1, 0, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&email)
        .bind(&password_hash)
        .bind(new.first_name.trim())
        .bind(new.last_name.trim())
        .bind(new.role.as_str())
        .bind(&permissions_json)
        .bind(&new.created_by)
        .bind(encode_ts(now))
        .bind(encode_ts(now))
        .execute(&self.db)
        .await?;

        tracing::info!(admin_id = %id, role = new.role.as_str(), "created admin account");

        self.get(&id)
            .await?
            .ok_or_else(|| AppError::Internal("Admin account vanished after insert".to_string()))
    }

    /// Get an admin account by id
    pub async fn get(&self, id: &str) -> AppResult<Option<AdminAccount>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM admin_accounts WHERE id = ?",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        row.map(|r| Self::row_to_account(&r)).transpose()
    }

    /// Find any account by email, active or not
    pub async fn find_by_email(&self, email: &str) -> AppResult<Option<AdminAccount>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM admin_accounts WHERE email = ?",
            ACCOUNT_COLUMNS
        ))
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.db)
        .await?;

        row.map(|r| Self::row_to_account(&r)).transpose()
    }

    /// Find an active account by email (lookup is case-insensitive)
    pub async fn find_active_by_email(&self, email: &str) -> AppResult<Option<AdminAccount>> {
        Ok(self
            .find_by_email(email)
            .await?
            .filter(|account| account.is_active))
    }

    /// List all admin accounts, newest first
    pub async fn list(&self) -> AppResult<Vec<AdminAccount>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM admin_accounts ORDER BY created_at DESC",
            ACCOUNT_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(Self::row_to_account).collect()
    }

    pub async fn count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM admin_accounts")
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }

    /// Activate or deactivate an account. Deactivation revokes all refresh tokens.
    pub async fn set_active(&self, id: &str, active: bool) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE admin_accounts SET is_active = ?, updated_at = ? WHERE id = ?",
        )
        .bind(active)
        .bind(encode_ts(Utc::now()))
        .bind(id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Admin {} not found", id)));
        }

        if !active {
            self.revoke_all_refresh_tokens(id).await?;
        }

        Ok(())
    }

    /// Increment the failed-login counter, locking the account at the threshold
    pub async fn record_failed_login(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<FailedLogin> {
        let attempts: i64 = sqlx::query_scalar(
            r#"
            UPDATE admin_accounts
            SET login_attempts = login_attempts + 1, updated_at = ?
            WHERE id = ?
            RETURNING login_attempts
            "#,
        )
        .bind(encode_ts(now))
        .bind(id)
        .fetch_one(&self.db)
        .await?;

        let attempts = attempts.max(0) as u32;
        if self.lockout.max_attempts > 0 && attempts >= self.lockout.max_attempts {
            let until = now + self.lockout.lock_duration;
            sqlx::query(
                "UPDATE admin_accounts SET login_attempts = 0, lock_until = ? WHERE id = ?",
            )
            .bind(encode_ts(until))
            .bind(id)
            .execute(&self.db)
            .await?;

            tracing::warn!(admin_id = %id, attempts, "admin account locked after failed logins");
            return Ok(FailedLogin::Locked { until });
        }

        Ok(FailedLogin::Counted { attempts })
    }

    /// Reset the counter and stamp the last login
    pub async fn record_successful_login(&self, id: &str, now: DateTime<Utc>) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE admin_accounts
            SET login_attempts = 0, lock_until = NULL, last_login = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(encode_ts(now))
        .bind(encode_ts(now))
        .bind(id)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Store a newly issued refresh token, pruning the account's expired ones
    pub async fn store_refresh_token(
        &self,
        admin_id: &str,
        token: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM admin_refresh_tokens WHERE admin_id = ? AND expires_at <= ?")
            .bind(admin_id)
            .bind(encode_ts(now))
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO admin_refresh_tokens (admin_id, token_hash, issued_at, expires_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(admin_id)
        .bind(Self::token_digest(token))
        .bind(encode_ts(now))
        .bind(encode_ts(expires_at))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Whether the token is outstanding and its stored expiry is in the future
    pub async fn is_refresh_token_outstanding(
        &self,
        admin_id: &str,
        token: &str,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM admin_refresh_tokens
            WHERE admin_id = ? AND token_hash = ? AND expires_at > ?
            "#,
        )
        .bind(admin_id)
        .bind(Self::token_digest(token))
        .bind(encode_ts(now))
        .fetch_optional(&self.db)
        .await?;

        Ok(found.is_some())
    }

    /// Swap `presented` for `replacement` in one transaction.
    ///
    /// The delete only matches while the presented token is still outstanding
    /// and unexpired, so of several concurrent rotations of the same token
    /// at most one observes a deleted row. Returns `false` when the presented
    /// token was not outstanding; nothing is inserted in that case.
    pub async fn rotate_refresh_token(
        &self,
        admin_id: &str,
        presented: &str,
        replacement: &str,
        replacement_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut tx = self.db.begin().await?;

        let removed = sqlx::query(
            r#"
            DELETE FROM admin_refresh_tokens
            WHERE admin_id = ? AND token_hash = ? AND expires_at > ?
            "#,
        )
        .bind(admin_id)
        .bind(Self::token_digest(presented))
        .bind(encode_ts(now))
        .execute(&mut *tx)
        .await?;

        if removed.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO admin_refresh_tokens (admin_id, token_hash, issued_at, expires_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(admin_id)
        .bind(Self::token_digest(replacement))
        .bind(encode_ts(now))
        .bind(encode_ts(replacement_expires_at))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Remove exactly one refresh token
    pub async fn revoke_refresh_token(&self, admin_id: &str, token: &str) -> AppResult<bool> {
        let result =
            sqlx::query("DELETE FROM admin_refresh_tokens WHERE admin_id = ? AND token_hash = ?")
                .bind(admin_id)
                .bind(Self::token_digest(token))
                .execute(&self.db)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn revoke_all_refresh_tokens(&self, admin_id: &str) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM admin_refresh_tokens WHERE admin_id = ?")
            .bind(admin_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    /// Number of unexpired outstanding refresh tokens for an account
    pub async fn outstanding_refresh_tokens(
        &self,
        admin_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM admin_refresh_tokens WHERE admin_id = ? AND expires_at > ?",
        )
        .bind(admin_id)
        .bind(encode_ts(now))
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }

    /// Delete every expired refresh token
    pub async fn prune_expired_refresh_tokens(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM admin_refresh_tokens WHERE expires_at <= ?")
            .bind(encode_ts(now))
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    /// Log admin action to audit log
    pub async fn log_action(
        &self,
        admin_id: &str,
        action: &str,
        subject: Option<&str>,
        details: Option<serde_json::Value>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO admin_audit_log (admin_id, action, subject, details, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(admin_id)
        .bind(action)
        .bind(subject)
        .bind(details.map(|d| d.to_string()))
        .bind(encode_ts(Utc::now()))
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Most recent audit log entries
    pub async fn audit_log(&self, limit: i64) -> AppResult<Vec<AuditLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, admin_id, action, subject, details, created_at
            FROM admin_audit_log
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit.clamp(1, 500))
        .fetch_all(&self.db)
        .await?;

        rows.iter()
            .map(|row| {
                let details: Option<String> = row.get("details");
                let created_at: String = row.get("created_at");
                Ok(AuditLogEntry {
                    id: row.get("id"),
                    admin_id: row.get("admin_id"),
                    action: row.get("action"),
                    subject: row.get("subject"),
                    details: details.and_then(|d| serde_json::from_str(&d).ok()),
                    created_at: decode_ts(&created_at)?,
                })
            })
            .collect()
    }

    fn row_to_account(row: &SqliteRow) -> AppResult<AdminAccount> {
        let role: String = row.get("role");
        let permissions: String = row.get("permissions");
        let permissions: Vec<Permission> = serde_json::from_str(&permissions)
            .map_err(|e| AppError::Internal(format!("Invalid permissions column: {}", e)))?;
        let login_attempts: i64 = row.get("login_attempts");
        let created_at: String = row.get("created_at");
        let updated_at: String = row.get("updated_at");

        Ok(AdminAccount {
            id: row.get("id"),
            email: row.get("email"),
            password_hash: row.get("password_hash"),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
            role: Role::from_str(&role)?,
            permissions,
            is_active: row.get("is_active"),
            login_attempts: login_attempts.max(0) as u32,
            lock_until: decode_opt_ts(row.get("lock_until"))?,
            last_login: decode_opt_ts(row.get("last_login"))?,
            created_by: row.get("created_by"),
            created_at: decode_ts(&created_at)?,
            updated_at: decode_ts(&updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn new_admin(email: &str) -> NewAdminAccount {
        NewAdminAccount {
            email: email.to_string(),
            password: "correct horse battery".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Admin".to_string(),
            role: Role::Admin,
            permissions: None,
            created_by: None,
        }
    }

    async fn store() -> AdminAccountStore {
        AdminAccountStore::new(test_pool().await, LockoutPolicy::default())
    }

    #[test]
    fn test_password_hash_and_verify() {
        let hash = AdminAccountStore::hash_password("hunter22").unwrap();
        assert!(AdminAccountStore::verify_password("hunter22", &hash));
        assert!(!AdminAccountStore::verify_password("hunter23", &hash));
        assert!(!AdminAccountStore::verify_password("hunter22", "not-a-hash"));
    }

    #[test]
    fn test_verify_login_without_account_checks_dummy_hash() {
        assert!(PasswordHash::new(&DUMMY_PASSWORD_HASH).is_ok());
        assert!(!AdminAccountStore::verify_login("hunter22", None));
        assert!(!AdminAccountStore::verify_login("converso-dummy-password", None));

        let hash = AdminAccountStore::hash_password("hunter22").unwrap();
        assert!(AdminAccountStore::verify_login("hunter22", Some(&hash)));
        assert!(!AdminAccountStore::verify_login("hunter23", Some(&hash)));
    }

    #[tokio::test]
    async fn test_create_lowercases_email_and_rejects_duplicates() {
        let store = store().await;

        let account = store.create(new_admin("Admin@Converso.com")).await.unwrap();
        assert_eq!(account.email, "admin@converso.com");
        assert_eq!(account.role, Role::Admin);
        assert!(account.has_permission(Permission::BanUsers));

        let found = store
            .find_active_by_email("ADMIN@converso.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, account.id);

        let dup = store.create(new_admin("admin@converso.com")).await;
        assert!(matches!(dup, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_inactive_accounts_are_not_found_for_login() {
        let store = store().await;
        let account = store.create(new_admin("a@converso.com")).await.unwrap();

        store.set_active(&account.id, false).await.unwrap();
        assert!(store
            .find_active_by_email("a@converso.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_failed_logins_lock_account() {
        let store = AdminAccountStore::new(
            test_pool().await,
            LockoutPolicy {
                max_attempts: 3,
                lock_duration: Duration::minutes(30),
            },
        );
        let account = store.create(new_admin("a@converso.com")).await.unwrap();
        let now = Utc::now();

        assert_eq!(
            store.record_failed_login(&account.id, now).await.unwrap(),
            FailedLogin::Counted { attempts: 1 }
        );
        store.record_failed_login(&account.id, now).await.unwrap();
        let third = store.record_failed_login(&account.id, now).await.unwrap();
        assert!(matches!(third, FailedLogin::Locked { .. }));

        let locked = store.get(&account.id).await.unwrap().unwrap();
        assert!(locked.is_locked(now));
        assert!(!locked.is_locked(now + Duration::minutes(31)));

        store.record_successful_login(&account.id, now).await.unwrap();
        let reset = store.get(&account.id).await.unwrap().unwrap();
        assert_eq!(reset.login_attempts, 0);
        assert!(reset.lock_until.is_none());
        assert!(reset.last_login.is_some());
    }

    #[tokio::test]
    async fn test_rotation_is_single_use() {
        let store = store().await;
        let account = store.create(new_admin("a@converso.com")).await.unwrap();
        let now = Utc::now();
        let expires = now + Duration::days(7);

        store
            .store_refresh_token(&account.id, "token-a", expires, now)
            .await
            .unwrap();

        assert!(store
            .rotate_refresh_token(&account.id, "token-a", "token-b", expires, now)
            .await
            .unwrap());
        assert!(!store
            .rotate_refresh_token(&account.id, "token-a", "token-c", expires, now)
            .await
            .unwrap());

        assert!(!store
            .is_refresh_token_outstanding(&account.id, "token-a", now)
            .await
            .unwrap());
        assert!(store
            .is_refresh_token_outstanding(&account.id, "token-b", now)
            .await
            .unwrap());
        assert!(!store
            .is_refresh_token_outstanding(&account.id, "token-c", now)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_stored_expiry_is_enforced() {
        let store = store().await;
        let account = store.create(new_admin("a@converso.com")).await.unwrap();
        let now = Utc::now();

        store
            .store_refresh_token(&account.id, "short", now + Duration::seconds(10), now)
            .await
            .unwrap();

        let later = now + Duration::seconds(11);
        assert!(!store
            .is_refresh_token_outstanding(&account.id, "short", later)
            .await
            .unwrap());
        assert!(!store
            .rotate_refresh_token(&account.id, "short", "next", later + Duration::days(7), later)
            .await
            .unwrap());

        assert_eq!(store.prune_expired_refresh_tokens(later).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_revoke_removes_only_the_presented_token() {
        let store = store().await;
        let account = store.create(new_admin("a@converso.com")).await.unwrap();
        let now = Utc::now();
        let expires = now + Duration::days(7);

        store.store_refresh_token(&account.id, "one", expires, now).await.unwrap();
        store.store_refresh_token(&account.id, "two", expires, now).await.unwrap();

        assert!(store.revoke_refresh_token(&account.id, "one").await.unwrap());
        assert!(!store.revoke_refresh_token(&account.id, "one").await.unwrap());
        assert_eq!(store.outstanding_refresh_tokens(&account.id, now).await.unwrap(), 1);
        assert!(store
            .is_refresh_token_outstanding(&account.id, "two", now)
            .await
            .unwrap());
    }
}
