/// Admin login, refresh and logout
use crate::{
    admin::{AdminAccount, AdminAccountStore, FailedLogin},
    auth::tokens::{TokenIssuer, TokenPair},
    error::{AppError, AppResult},
    metrics,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of a successful login or refresh
#[derive(Debug, Clone)]
pub struct AuthenticatedAdmin {
    pub account: AdminAccount,
    pub tokens: TokenPair,
}

/// Composes the credential store and the token issuer
#[derive(Clone)]
pub struct AdminAuthService {
    accounts: Arc<AdminAccountStore>,
    tokens: Arc<TokenIssuer>,
}

impl AdminAuthService {
    pub fn new(accounts: Arc<AdminAccountStore>, tokens: Arc<TokenIssuer>) -> Self {
        Self { accounts, tokens }
    }

    /// Exchange email and password for a token pair
    pub async fn login(&self, email: &str, password: &str) -> AppResult<AuthenticatedAdmin> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AppError::Validation(
                "Email and password are required".to_string(),
            ));
        }

        let now = Utc::now();

        let mut account = match self.accounts.find_active_by_email(email).await? {
            Some(account) => account,
            None => {
                AdminAccountStore::verify_login(password, None);
                metrics::record_admin_login("unknown_account");
                return Err(invalid_credentials());
            }
        };

        if account.is_locked(now) {
            metrics::record_admin_login("locked");
            return Err(AppError::Locked(
                "Account is temporarily locked due to too many failed login attempts".to_string(),
            ));
        }

        if !AdminAccountStore::verify_login(password, Some(&account.password_hash)) {
            match self.accounts.record_failed_login(&account.id, now).await? {
                FailedLogin::Locked { until } => {
                    warn!(admin_id = %account.id, %until, "admin login locked out");
                }
                FailedLogin::Counted { attempts } => {
                    info!(admin_id = %account.id, attempts, "admin login rejected");
                }
            }
            metrics::record_admin_login("bad_password");
            return Err(invalid_credentials());
        }

        self.accounts.record_successful_login(&account.id, now).await?;
        account.login_attempts = 0;
        account.lock_until = None;
        account.last_login = Some(now);

        let tokens = self.tokens.issue_pair_at(&account, now)?;
        self.accounts
            .store_refresh_token(&account.id, &tokens.refresh_token, tokens.refresh_expires_at, now)
            .await?;

        metrics::record_admin_login("success");
        info!(admin_id = %account.id, "admin logged in");

        Ok(AuthenticatedAdmin { account, tokens })
    }

    /// Rotate a refresh token into a new pair.
    ///
    /// The presented token must verify, belong to an active account, and
    /// still be outstanding. Every failure is the same 401.
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<AuthenticatedAdmin> {
        if refresh_token.is_empty() {
            return Err(AppError::Validation("Refresh token required".to_string()));
        }

        let claims = self.tokens.verify_refresh(refresh_token).map_err(|_| {
            metrics::record_token_refresh("invalid");
            invalid_refresh_token()
        })?;

        let account = match self.accounts.get(&claims.admin_id).await? {
            Some(account) if account.is_active => account,
            _ => {
                metrics::record_token_refresh("inactive_account");
                return Err(invalid_refresh_token());
            }
        };

        let now = Utc::now();
        let tokens = self.tokens.issue_pair_at(&account, now)?;

        let rotated = self
            .accounts
            .rotate_refresh_token(
                &account.id,
                refresh_token,
                &tokens.refresh_token,
                tokens.refresh_expires_at,
                now,
            )
            .await?;

        if !rotated {
            metrics::record_token_refresh("not_outstanding");
            warn!(admin_id = %account.id, "refresh token reuse or expiry rejected");
            return Err(invalid_refresh_token());
        }

        metrics::record_token_refresh("success");
        Ok(AuthenticatedAdmin { account, tokens })
    }

    /// Remove the presented refresh token, if it identifies an account.
    /// Returns whether a stored token was removed.
    pub async fn logout(&self, refresh_token: Option<&str>) -> AppResult<bool> {
        let Some(token) = refresh_token.filter(|t| !t.is_empty()) else {
            return Ok(false);
        };

        let Ok(claims) = self.tokens.verify_refresh(token) else {
            return Ok(false);
        };

        let removed = self
            .accounts
            .revoke_refresh_token(&claims.admin_id, token)
            .await?;

        if removed {
            info!(admin_id = %claims.admin_id, "admin logged out");
        }

        Ok(removed)
    }
}

fn invalid_credentials() -> AppError {
    AppError::Authentication("Invalid credentials".to_string())
}

fn invalid_refresh_token() -> AppError {
    AppError::Authentication("Invalid refresh token".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        admin::{LockoutPolicy, NewAdminAccount, Role},
        config::ServerConfig,
        db::test_pool,
    };
    use chrono::Duration;

    const PASSWORD: &str = "correct horse battery";

    async fn service(lockout: LockoutPolicy) -> (AdminAuthService, Arc<AdminAccountStore>) {
        let accounts = Arc::new(AdminAccountStore::new(test_pool().await, lockout));
        accounts
            .create(NewAdminAccount {
                email: "admin@converso.com".to_string(),
                password: PASSWORD.to_string(),
                first_name: "Ada".to_string(),
                last_name: "Admin".to_string(),
                role: Role::SuperAdmin,
                permissions: None,
                created_by: None,
            })
            .await
            .unwrap();
        let tokens = Arc::new(TokenIssuer::new(&ServerConfig::for_tests().authentication));
        (AdminAuthService::new(accounts.clone(), tokens), accounts)
    }

    #[tokio::test]
    async fn test_login_requires_both_fields() {
        let (service, _) = service(LockoutPolicy::default()).await;
        assert!(matches!(
            service.login("", PASSWORD).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            service.login("admin@converso.com", "").await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_login_rejects_unknown_and_wrong_password_alike() {
        let (service, _) = service(LockoutPolicy::default()).await;

        let unknown = service.login("nobody@converso.com", PASSWORD).await.unwrap_err();
        let wrong = service.login("admin@converso.com", "nope").await.unwrap_err();
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn test_login_stores_refresh_token() {
        let (service, accounts) = service(LockoutPolicy::default()).await;

        let session = service.login("ADMIN@converso.com", PASSWORD).await.unwrap();
        assert!(session.account.last_login.is_some());
        assert!(accounts
            .is_refresh_token_outstanding(&session.account.id, &session.tokens.refresh_token, Utc::now())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_refresh_is_single_use() {
        let (service, _) = service(LockoutPolicy::default()).await;
        let session = service.login("admin@converso.com", PASSWORD).await.unwrap();

        let rotated = service.refresh(&session.tokens.refresh_token).await.unwrap();
        assert_ne!(rotated.tokens.refresh_token, session.tokens.refresh_token);

        assert!(matches!(
            service.refresh(&session.tokens.refresh_token).await,
            Err(AppError::Authentication(_))
        ));
        assert!(service.refresh(&rotated.tokens.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_refresh_has_at_most_one_winner() {
        let (service, _) = service(LockoutPolicy::default()).await;
        let session = service.login("admin@converso.com", PASSWORD).await.unwrap();
        let token = session.tokens.refresh_token.clone();

        let attempts = (0..8).map(|_| {
            let service = service.clone();
            let token = token.clone();
            tokio::spawn(async move { service.refresh(&token).await.is_ok() })
        });

        let mut winners = 0;
        for attempt in attempts {
            if attempt.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_logout_revokes_only_presented_token() {
        let (service, accounts) = service(LockoutPolicy::default()).await;
        let first = service.login("admin@converso.com", PASSWORD).await.unwrap();
        let second = service.login("admin@converso.com", PASSWORD).await.unwrap();

        assert!(service.logout(Some(&first.tokens.refresh_token)).await.unwrap());
        assert!(service.refresh(&first.tokens.refresh_token).await.is_err());
        assert!(accounts
            .is_refresh_token_outstanding(&second.account.id, &second.tokens.refresh_token, Utc::now())
            .await
            .unwrap());

        assert!(!service.logout(None).await.unwrap());
        assert!(!service.logout(Some("garbage")).await.unwrap());
    }

    #[tokio::test]
    async fn test_lockout_after_repeated_failures() {
        let (service, _) = service(LockoutPolicy {
            max_attempts: 2,
            lock_duration: Duration::hours(2),
        })
        .await;

        for _ in 0..2 {
            assert!(matches!(
                service.login("admin@converso.com", "wrong").await,
                Err(AppError::Authentication(_))
            ));
        }

        assert!(matches!(
            service.login("admin@converso.com", PASSWORD).await,
            Err(AppError::Locked(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_fails_for_deactivated_account() {
        let (service, accounts) = service(LockoutPolicy::default()).await;
        let session = service.login("admin@converso.com", PASSWORD).await.unwrap();

        accounts.set_active(&session.account.id, false).await.unwrap();
        assert!(service.refresh(&session.tokens.refresh_token).await.is_err());
    }
}
