/// SQLite-backed identity provider
///
/// Keeps the user directory and its moderation metadata locally. Session
/// tokens are HS256 JWTs minted by the sign-in front end with a shared
/// secret; the first verified token for a subject creates its record.
use super::{IdentityProvider, StatusUpdate, UserRecord, UserStatus};
use crate::{
    config::IdentityConfig,
    db::{decode_opt_ts, decode_ts, encode_ts},
    error::{AppError, AppResult},
    pagination::Page,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

/// Claims carried by end-user session tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    pub fn new(sub: &str, email: &str, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: sub.to_string(),
            email: email.to_string(),
            given_name: None,
            family_name: None,
            picture: None,
            iss: None,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }
}

const USER_COLUMNS: &str = "id, email, first_name, last_name, image_url, banned, status, \
     status_reason, status_changed_at, status_changed_by, approved_at, created_at, last_sign_in_at";

pub struct LocalIdentityProvider {
    db: SqlitePool,
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: Option<String>,
}

impl LocalIdentityProvider {
    pub fn new(db: SqlitePool, config: &IdentityConfig) -> Self {
        Self {
            db,
            encoding: EncodingKey::from_secret(config.session_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.session_secret.as_bytes()),
            issuer: config.session_issuer.clone(),
        }
    }

    /// Mint a session token the way the sign-in front end does
    pub fn issue_session_token(&self, claims: &SessionClaims) -> AppResult<String> {
        let mut claims = claims.clone();
        if claims.iss.is_none() {
            claims.iss = self.issuer.clone();
        }
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("Failed to sign session token: {}", e)))
    }

    fn verify_session_token(&self, token: &str) -> AppResult<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer.as_str()]);
        }

        decode::<SessionClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "session token rejected");
                AppError::Authentication("Unauthorized".to_string())
            })
    }

    /// Create the user for these claims if it has never been seen, otherwise
    /// record the sign-in.
    ///
    /// Deleted users keep a tombstone and are not recreated.
    pub async fn ensure_user(&self, claims: &SessionClaims) -> AppResult<UserRecord> {
        let now = encode_ts(Utc::now());

        sqlx::query(
            r#"
            INSERT INTO users (id, email, first_name, last_name, image_url, banned, status, created_at, last_sign_in_at)
            VALUES (?, ?, ?, ?, ?, 0, 'active', ?, ?)
            ON CONFLICT(id) DO UPDATE SET last_sign_in_at = excluded.last_sign_in_at
            WHERE users.deleted_at IS NULL
            "#,
        )
        .bind(&claims.sub)
        .bind(claims.email.trim().to_lowercase())
        .bind(&claims.given_name)
        .bind(&claims.family_name)
        .bind(&claims.picture)
        .bind(&now)
        .bind(&now)
        .execute(&self.db)
        .await?;

        self.get_user(&claims.sub)
            .await?
            .ok_or_else(|| AppError::Authentication("User no longer exists".to_string()))
    }

    fn row_to_user(row: &SqliteRow) -> AppResult<UserRecord> {
        let status: String = row.get("status");
        let created_at: String = row.get("created_at");

        Ok(UserRecord {
            id: row.get("id"),
            email: row.get("email"),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
            image_url: row.get("image_url"),
            banned: row.get("banned"),
            status: UserStatus::from_str(&status)?,
            status_reason: row.get("status_reason"),
            status_changed_at: decode_opt_ts(row.get("status_changed_at"))?,
            status_changed_by: row.get("status_changed_by"),
            approved_at: decode_opt_ts(row.get("approved_at"))?,
            created_at: decode_ts(&created_at)?,
            last_sign_in_at: decode_opt_ts(row.get("last_sign_in_at"))?,
        })
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn authenticate(&self, session_token: &str) -> AppResult<UserRecord> {
        let claims = self.verify_session_token(session_token)?;
        self.ensure_user(&claims).await
    }

    async fn get_user(&self, user_id: &str) -> AppResult<Option<UserRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM users WHERE id = ? AND deleted_at IS NULL",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        row.map(|r| Self::row_to_user(&r)).transpose()
    }

    async fn list_users(&self, page: Page) -> AppResult<(Vec<UserRecord>, i64)> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM users WHERE deleted_at IS NULL ORDER BY created_at DESC LIMIT ? OFFSET ?",
            USER_COLUMNS
        ))
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(&self.db)
        .await?;

        let users = rows
            .iter()
            .map(Self::row_to_user)
            .collect::<AppResult<Vec<_>>>()?;

        Ok((users, self.count_users().await?))
    }

    async fn count_users(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE deleted_at IS NULL")
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }

    async fn update_status(&self, user_id: &str, update: StatusUpdate) -> AppResult<UserRecord> {
        let now = encode_ts(Utc::now());

        let result = sqlx::query(
            r#"
            UPDATE users
            SET banned = ?, status = ?, status_reason = ?, status_changed_at = ?,
                status_changed_by = ?,
                approved_at = CASE WHEN ? THEN ? ELSE approved_at END
            WHERE id = ? AND deleted_at IS NULL
            "#,
        )
        .bind(update.status == UserStatus::Banned)
        .bind(update.status.as_str())
        .bind(&update.reason)
        .bind(&now)
        .bind(&update.changed_by)
        .bind(update.approve)
        .bind(&now)
        .bind(user_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", user_id)));
        }

        self.get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
    }

    async fn delete_user(&self, user_id: &str) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE users SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(encode_ts(Utc::now()))
        .bind(user_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", user_id)));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ServerConfig, db::test_pool};

    async fn provider() -> LocalIdentityProvider {
        LocalIdentityProvider::new(test_pool().await, &ServerConfig::for_tests().identity)
    }

    fn ban(reason: &str) -> StatusUpdate {
        StatusUpdate {
            status: UserStatus::Banned,
            reason: Some(reason.to_string()),
            changed_by: "admin-1".to_string(),
            approve: false,
        }
    }

    #[tokio::test]
    async fn test_authenticate_creates_user_once() {
        let provider = provider().await;
        let token = provider
            .issue_session_token(&SessionClaims::new("user_1", "Learner@Example.com", Duration::hours(1)))
            .unwrap();

        let first = provider.authenticate(&token).await.unwrap();
        assert_eq!(first.id, "user_1");
        assert_eq!(first.email, "learner@example.com");
        assert!(!first.is_banned());

        provider.authenticate(&token).await.unwrap();
        assert_eq!(provider.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_authenticate_records_each_sign_in() {
        let db = test_pool().await;
        let provider = LocalIdentityProvider::new(db.clone(), &ServerConfig::for_tests().identity);
        let token = provider
            .issue_session_token(&SessionClaims::new("user_1", "a@b.c", Duration::hours(1)))
            .unwrap();

        let first = provider.authenticate(&token).await.unwrap();
        let long_ago = encode_ts(Utc::now() - Duration::days(3));
        sqlx::query("UPDATE users SET created_at = ?1, last_sign_in_at = ?1 WHERE id = 'user_1'")
            .bind(&long_ago)
            .execute(&db)
            .await
            .unwrap();

        let second = provider.authenticate(&token).await.unwrap();
        let signed_in = second.last_sign_in_at.unwrap();
        assert!(signed_in >= first.last_sign_in_at.unwrap());
        assert!(signed_in > Utc::now() - Duration::minutes(1));
        assert_eq!(encode_ts(second.created_at), long_ago);
    }

    #[tokio::test]
    async fn test_rejects_expired_and_forged_tokens() {
        let provider = provider().await;

        let mut claims = SessionClaims::new("user_1", "a@b.c", Duration::hours(1));
        claims.exp = (Utc::now() - Duration::hours(1)).timestamp();
        let expired = provider.issue_session_token(&claims).unwrap();
        assert!(matches!(
            provider.authenticate(&expired).await,
            Err(AppError::Authentication(_))
        ));

        let mut config = ServerConfig::for_tests().identity;
        config.session_secret = "some-other-secret-0123456789abcdefgh".to_string();
        let forger = LocalIdentityProvider::new(test_pool().await, &config);
        let forged = forger
            .issue_session_token(&SessionClaims::new("user_1", "a@b.c", Duration::hours(1)))
            .unwrap();
        assert!(provider.authenticate(&forged).await.is_err());
    }

    #[tokio::test]
    async fn test_ban_and_approve_update_metadata() {
        let provider = provider().await;
        provider
            .ensure_user(&SessionClaims::new("user_1", "a@b.c", Duration::hours(1)))
            .await
            .unwrap();

        let banned = provider.update_status("user_1", ban("spam")).await.unwrap();
        assert!(banned.is_banned());
        assert_eq!(banned.status_reason.as_deref(), Some("spam"));
        assert_eq!(banned.status_changed_by.as_deref(), Some("admin-1"));

        let approved = provider
            .update_status(
                "user_1",
                StatusUpdate {
                    status: UserStatus::Active,
                    reason: None,
                    changed_by: "admin-1".to_string(),
                    approve: true,
                },
            )
            .await
            .unwrap();
        assert!(!approved.is_banned());
        assert!(approved.approved_at.is_some());

        assert!(matches!(
            provider.update_status("missing", ban("x")).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_deleted_users_stay_deleted() {
        let provider = provider().await;
        let claims = SessionClaims::new("user_1", "a@b.c", Duration::hours(1));
        let token = provider.issue_session_token(&claims).unwrap();
        provider.authenticate(&token).await.unwrap();

        provider.delete_user("user_1").await.unwrap();
        assert!(provider.get_user("user_1").await.unwrap().is_none());
        assert!(provider.authenticate(&token).await.is_err());
        assert!(matches!(
            provider.delete_user("user_1").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_users_pages() {
        let provider = provider().await;
        for i in 0..5 {
            provider
                .ensure_user(&SessionClaims::new(&format!("user_{}", i), "a@b.c", Duration::hours(1)))
                .await
                .unwrap();
        }

        let (users, total) = provider.list_users(Page { page: 2, limit: 2 }).await.unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(total, 5);
    }
}
