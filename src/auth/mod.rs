/// Authentication extractors and utilities
///
/// Admin requests carry an access token either as a bearer header or in the
/// `admin_token` cookie. End-user requests carry a session token minted by
/// the identity provider's sign-in front end.

pub mod cookies;
pub mod flow;
pub mod tokens;

pub use flow::{AdminAuthService, AuthenticatedAdmin};
pub use tokens::{AdminClaims, TokenIssuer, TokenPair, TokenType};

use crate::{
    admin::{AdminAccount, Permission, Role},
    context::AppContext,
    error::AppError,
    identity::UserRecord,
};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use axum_extra::extract::cookie::CookieJar;

/// Cookie the hosted sign-in front end stores the user session token in
pub const USER_SESSION_COOKIE: &str = "__session";

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Bearer token, falling back to the named cookie
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    extract_bearer_token(headers).or_else(|| {
        CookieJar::from_headers(headers)
            .get(cookie_name)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
    })
}

/// Admin authentication context - requires a valid access token for an
/// active admin account
#[derive(Debug, Clone)]
pub struct AdminAuthContext {
    pub admin_id: String,
    pub email: String,
    pub role: Role,
    pub account: AdminAccount,
}

impl AdminAuthContext {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.account.has_permission(permission)
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for AdminAuthContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers, cookies::ACCESS_COOKIE)
            .ok_or_else(|| AppError::Authentication("Access token required".to_string()))?;

        let claims = state.token_issuer.verify_access(&token)?;

        // Permissions and the active flag come from the stored account, so a
        // deactivation takes effect before the access token expires.
        let account = state
            .admin_accounts
            .get(&claims.admin_id)
            .await?
            .filter(|account| account.is_active)
            .ok_or_else(|| {
                tracing::warn!(admin_id = %claims.admin_id, "access token for missing or inactive admin");
                AppError::Authentication("Admin not found or inactive".to_string())
            })?;

        Ok(AdminAuthContext {
            admin_id: account.id.clone(),
            email: account.email.clone(),
            role: account.role,
            account,
        })
    }
}

/// End-user authentication context
#[derive(Debug, Clone)]
pub struct UserAuthContext {
    pub user_id: String,
    pub user: UserRecord,
}

#[async_trait]
impl FromRequestParts<AppContext> for UserAuthContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        // Already resolved by the ban middleware on this request
        if let Some(user) = parts.extensions.get::<UserRecord>() {
            return Ok(UserAuthContext {
                user_id: user.id.clone(),
                user: user.clone(),
            });
        }

        let token = extract_token(&parts.headers, USER_SESSION_COOKIE)
            .ok_or_else(|| AppError::Authentication("Unauthorized".to_string()))?;

        let user = state.identity.authenticate(&token).await?;

        Ok(UserAuthContext {
            user_id: user.id.clone(),
            user,
        })
    }
}

/// Macro to require a specific admin permission
/// Usage: require_permission!(auth, Permission::BanUsers);
#[macro_export]
macro_rules! require_permission {
    ($auth:expr, $permission:expr) => {
        if !$auth.has_permission($permission) {
            return Err($crate::error::AppError::Authorization(format!(
                "Missing permission: {}",
                $permission.as_str()
            )));
        }
    };
}

/// Macro to require specific admin role
/// Usage: require_admin_role!(auth, Role::SuperAdmin);
#[macro_export]
macro_rules! require_admin_role {
    ($auth:expr, $required:expr) => {
        if !$auth.role.can_act_as($required) {
            return Err($crate::error::AppError::Authorization(format!(
                "Requires {} role or higher",
                $required.as_str()
            )));
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc123token"));
        assert_eq!(extract_bearer_token(&headers), Some("abc123token".to_string()));

        headers.insert("authorization", HeaderValue::from_static("abc123token"));
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn test_cookie_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "cookie",
            HeaderValue::from_static("theme=dark; admin_token=from-cookie"),
        );
        assert_eq!(
            extract_token(&headers, cookies::ACCESS_COOKIE),
            Some("from-cookie".to_string())
        );

        headers.insert("authorization", HeaderValue::from_static("Bearer from-header"));
        assert_eq!(
            extract_token(&headers, cookies::ACCESS_COOKIE),
            Some("from-header".to_string())
        );

        assert_eq!(extract_token(&HeaderMap::new(), cookies::ACCESS_COOKIE), None);
    }
}
