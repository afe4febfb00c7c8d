//! Shared helpers for router-level tests
#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, Response},
    Router,
};
use axum_extra::extract::cookie::Cookie;
use chrono::Duration;
use converso::{
    admin::{AdminAccount, NewAdminAccount, Role},
    config::ServerConfig,
    db,
    identity::SessionClaims,
    server::build_router,
    AppContext,
};
use tower::ServiceExt;

pub const ADMIN_EMAIL: &str = "admin@converso.com";
pub const ADMIN_PASSWORD: &str = "correct horse battery";

pub async fn context() -> AppContext {
    context_with(ServerConfig::for_tests()).await
}

pub async fn context_with(config: ServerConfig) -> AppContext {
    let pool = db::create_memory_pool().await.unwrap();
    AppContext::from_pool(config, pool).await.unwrap()
}

pub async fn create_admin(ctx: &AppContext, email: &str, role: Role) -> AdminAccount {
    ctx.admin_accounts
        .create(NewAdminAccount {
            email: email.to_string(),
            password: ADMIN_PASSWORD.to_string(),
            first_name: "Test".to_string(),
            last_name: "Admin".to_string(),
            role,
            permissions: None,
            created_by: None,
        })
        .await
        .unwrap()
}

/// Session token for an end user, as the sign-in front end would mint it
pub fn user_token(ctx: &AppContext, user_id: &str) -> String {
    ctx.local_identity
        .issue_session_token(&SessionClaims::new(
            user_id,
            &format!("{}@example.com", user_id),
            Duration::hours(1),
        ))
        .unwrap()
}

pub fn router(ctx: &AppContext) -> Router {
    build_router(ctx.clone())
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub fn get(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn json_request(
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    body: serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Cookies set by a response, by name
pub fn set_cookies(response: &Response<Body>) -> Vec<Cookie<'static>> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| Cookie::parse(v.to_string()).ok())
        .collect()
}

pub fn cookie_value(response: &Response<Body>, name: &str) -> Option<String> {
    set_cookies(response)
        .into_iter()
        .find(|c| c.name() == name)
        .map(|c| c.value().to_string())
}
