/// Admin authentication endpoints
///
/// Login and refresh return the token pair both as `HttpOnly` cookies and in
/// the body; logout removes the presented refresh token and clears the
/// cookies.
use super::Ack;
use crate::{
    admin::{AdminAccount, Permission, Role},
    auth::{
        cookies::{self, REFRESH_COOKIE},
        AdminAuthContext, AuthenticatedAdmin,
    },
    context::AppContext,
    error::{AppError, AppResult},
};
use axum::{extract::State, routing::{get, post}, Json, Router};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/admin/auth/login", post(login))
        .route("/api/admin/auth/refresh", post(refresh))
        .route("/api/admin/auth/logout", post(logout))
        .route("/api/admin/auth/me", get(me))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest {
    refresh_token: Option<String>,
}

/// Admin profile as returned to the panel
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminView {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub permissions: Vec<Permission>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<&AdminAccount> for AdminView {
    fn from(account: &AdminAccount) -> Self {
        Self {
            id: account.id.clone(),
            email: account.email.clone(),
            first_name: account.first_name.clone(),
            last_name: account.last_name.clone(),
            role: account.role,
            permissions: account.permissions.clone(),
            last_login: account.last_login,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenView {
    access_token: String,
    /// Seconds until the access token expires
    expires_in: i64,
}

#[derive(Debug, Serialize)]
struct AuthResponse {
    success: bool,
    admin: AdminView,
    tokens: TokenView,
}

#[derive(Debug, Serialize)]
struct MeResponse {
    admin: AdminView,
}

fn session_response(
    ctx: &AppContext,
    jar: CookieJar,
    session: AuthenticatedAdmin,
) -> (CookieJar, Json<AuthResponse>) {
    let jar = cookies::set_session_cookies(
        jar,
        &session.tokens,
        ctx.token_issuer.access_ttl(),
        ctx.token_issuer.refresh_ttl(),
        ctx.secure_cookies(),
    );

    let body = AuthResponse {
        success: true,
        admin: AdminView::from(&session.account),
        tokens: TokenView {
            expires_in: session.tokens.expires_in(Utc::now()),
            access_token: session.tokens.access_token,
        },
    };

    (jar, Json(body))
}

/// Exchange email and password for a session
async fn login(
    State(ctx): State<AppContext>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<AuthResponse>)> {
    let session = ctx.admin_auth.login(&req.email, &req.password).await?;

    if let Err(e) = ctx
        .admin_accounts
        .log_action(&session.account.id, "auth.login", None, None)
        .await
    {
        tracing::warn!(error = %e, "failed to write audit entry");
    }

    Ok(session_response(&ctx, jar, session))
}

/// Rotate the refresh token from the cookie or the JSON body
async fn refresh(
    State(ctx): State<AppContext>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> AppResult<(CookieJar, Json<AuthResponse>)> {
    let token = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| body.and_then(|Json(b)| b.refresh_token))
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation("Refresh token required".to_string()))?;

    let session = ctx.admin_auth.refresh(&token).await?;
    Ok(session_response(&ctx, jar, session))
}

/// Remove the presented refresh token and clear both cookies
async fn logout(
    State(ctx): State<AppContext>,
    jar: CookieJar,
) -> (CookieJar, Json<Ack>) {
    let token = jar.get(REFRESH_COOKIE).map(|c| c.value().to_string());
    if let Err(e) = ctx.admin_auth.logout(token.as_deref()).await {
        tracing::error!(error = %e, "failed to revoke refresh token on logout");
    }

    let jar = cookies::clear_session_cookies(jar, ctx.secure_cookies());
    (jar, Json(Ack::new("Logged out successfully")))
}

async fn me(auth: AdminAuthContext) -> Json<MeResponse> {
    Json(MeResponse {
        admin: AdminView::from(&auth.account),
    })
}
