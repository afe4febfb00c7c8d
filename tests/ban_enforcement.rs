//! Ban propagation from the admin panel to user sessions
mod common;

use async_trait::async_trait;
use axum::http::{header, StatusCode};
use chrono::{DateTime, Utc};
use common::*;
use converso::{
    admin::{NewAdminAccount, Permission, Role},
    error::{AppError, AppResult},
    moderation::{BanService, BanSignal, SignalStatus, StatusMirror},
    monitor::{
        BanMonitor, HttpIdentitySource, IdentityCheck, IdentitySource, MonitorOptions,
        MonitorOutcome, SessionControl,
    },
    server::build_router,
    AppContext,
};
use serde_json::json;
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::time::timeout;

async fn admin_token(ctx: &AppContext) -> String {
    let admin = create_admin(ctx, ADMIN_EMAIL, Role::SuperAdmin).await;
    ctx.token_issuer.issue_pair(&admin).unwrap().access_token
}

fn location(response: &axum::http::Response<axum::body::Body>) -> Option<String> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[tokio::test]
async fn test_ban_redirects_every_path_until_unban() {
    let ctx = context().await;
    let admin = admin_token(&ctx).await;
    let user = user_token(&ctx, "user_1");
    let app = router(&ctx);

    let response = send(&app, get("/api/me", Some(&user))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], "user_1");
    assert_eq!(body["status"], "active");

    let response = send(
        &app,
        json_request(
            "POST",
            "/api/admin/ban",
            Some(&admin),
            json!({ "userId": "user_1", "reason": "spam" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["status"], "banned");
    assert_eq!(body["user"]["statusReason"], "spam");

    for path in ["/api/companions", "/api/me", "/some/unknown/page"] {
        let response = send(&app, get(path, Some(&user))).await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT, "{}", path);
        assert_eq!(location(&response).as_deref(), Some("/banned"));
    }

    let response = send(&app, get("/banned", Some(&user))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["banned"], true);
    assert_eq!(body["reason"], "spam");

    // The mirror saw the signal
    let response = send(&app, get("/api/admin/user-status?userId=user_1", Some(&admin))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, {
        let mut req = get("/api/admin/ban?userId=user_1", Some(&admin));
        *req.method_mut() = axum::http::Method::DELETE;
        req
    })
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, get("/api/companions", Some(&user))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_requests_without_session_pass_through() {
    let ctx = context().await;
    let app = router(&ctx);

    let response = send(&app, get("/banned", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["reason"].is_null());

    let response = send(&app, get("/api/me", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(&app, get("/api/me", Some("not-a-session-token"))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signed_in_user_leaves_sign_in_pages() {
    let ctx = context().await;
    let user = user_token(&ctx, "user_1");
    let app = router(&ctx);

    let response = send(&app, get("/sign-in", Some(&user))).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response).as_deref(), Some("/app"));

    let response = send(&app, get("/sign-in", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_session_cookie_is_checked_too() {
    let ctx = context().await;
    let user = user_token(&ctx, "user_1");
    ctx.local_identity
        .ensure_user(&converso::identity::SessionClaims::new(
            "user_1",
            "user_1@example.com",
            chrono::Duration::hours(1),
        ))
        .await
        .unwrap();
    ctx.ban_service.ban("user_1", None, "admin_1").await.unwrap();

    let app = router(&ctx);
    let response = send(
        &app,
        axum::http::Request::builder()
            .uri("/api/learning-logs")
            .header(header::COOKIE, format!("__session={}", user))
            .body(axum::body::Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
}

#[tokio::test]
async fn test_deleted_user_is_unauthorized() {
    let ctx = context().await;
    let admin = admin_token(&ctx).await;
    let user = user_token(&ctx, "user_1");
    let app = router(&ctx);

    send(&app, get("/api/me", Some(&user))).await;

    let response = send(&app, {
        let mut req = get("/api/admin/users/user_1", Some(&admin));
        *req.method_mut() = axum::http::Method::DELETE;
        req
    })
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, get("/api/me", Some(&user))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

struct BrokenMirror;

#[async_trait]
impl StatusMirror for BrokenMirror {
    async fn record(&self, _signal: &BanSignal) -> AppResult<()> {
        Err(AppError::Internal("mirror offline".to_string()))
    }

    async fn recent(&self, _user_id: Option<&str>, _limit: i64) -> AppResult<Vec<BanSignal>> {
        Err(AppError::Internal("mirror offline".to_string()))
    }

    async fn prune_older_than(&self, _cutoff: DateTime<Utc>) -> AppResult<u64> {
        Ok(0)
    }
}

#[tokio::test]
async fn test_ban_survives_mirror_failure() {
    let mut ctx = context().await;
    let broken: Arc<dyn StatusMirror> = Arc::new(BrokenMirror);
    ctx.status_mirror = broken.clone();
    ctx.ban_service = Arc::new(BanService::new(
        ctx.identity.clone(),
        broken,
        ctx.signal_hub.clone(),
    ));

    let admin = admin_token(&ctx).await;
    let user = user_token(&ctx, "user_1");
    let app = router(&ctx);
    send(&app, get("/api/me", Some(&user))).await;

    let mut signals = ctx.signal_hub.subscribe();

    let response = send(
        &app,
        json_request("POST", "/api/admin/ban", Some(&admin), json!({ "userId": "user_1" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["user"]["statusReason"], "Policy violation");

    // The hub still fans out
    let signal = signals.try_recv().unwrap();
    assert_eq!(signal.user_id, "user_1");
    assert_eq!(signal.status, SignalStatus::Banned);

    let response = send(&app, get("/api/me", Some(&user))).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
}

#[tokio::test]
async fn test_ban_of_unknown_user_is_404() {
    let ctx = context().await;
    let admin = admin_token(&ctx).await;
    let app = router(&ctx);

    let response = send(
        &app,
        json_request("POST", "/api/admin/ban", Some(&admin), json!({ "userId": "ghost" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(
        &app,
        json_request("POST", "/api/admin/ban", Some(&admin), json!({ "userId": " " })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_approve_cannot_lift_a_ban_without_ban_permission() {
    let ctx = context().await;
    let editor = ctx
        .admin_accounts
        .create(NewAdminAccount {
            email: "editor@converso.com".to_string(),
            password: ADMIN_PASSWORD.to_string(),
            first_name: "Edit".to_string(),
            last_name: "Only".to_string(),
            role: Role::Admin,
            permissions: Some(vec![Permission::ViewUsers, Permission::EditUsers]),
            created_by: None,
        })
        .await
        .unwrap();
    let editor = ctx.token_issuer.issue_pair(&editor).unwrap().access_token;
    let app = router(&ctx);

    for id in ["user_1", "user_2"] {
        send(&app, get("/api/me", Some(&user_token(&ctx, id)))).await;
    }
    ctx.ban_service.ban("user_1", Some("spam"), "admin_1").await.unwrap();

    let approve = json!({ "action": "approve" });
    let response = send(
        &app,
        json_request("PATCH", "/api/admin/users/user_1", Some(&editor), approve.clone()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(ctx.identity.get_user("user_1").await.unwrap().unwrap().is_banned());

    // Approving someone who is not banned only needs edit_users
    let response = send(
        &app,
        json_request("PATCH", "/api/admin/users/user_2", Some(&editor), approve.clone()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["user"]["approvedAt"].is_string());

    let response = send(
        &app,
        json_request("PATCH", "/api/admin/users/ghost", Some(&editor), approve),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_command_queue_over_http() {
    let ctx = context().await;
    let admin = admin_token(&ctx).await;
    let user = user_token(&ctx, "user_1");
    let app = router(&ctx);

    let response = send(
        &app,
        json_request(
            "POST",
            "/api/admin/commands",
            Some(&admin),
            json!({ "command": "refresh", "data": { "reason": "deploy" } }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["message"], "Command queued successfully");
    let command_id = body["commandId"].as_str().unwrap().to_string();

    let response = send(&app, get("/api/commands", Some(&user))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let pending = body.as_array().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["id"], command_id.as_str());
    assert_eq!(pending[0]["command"], "refresh");

    let response = send(
        &app,
        json_request("POST", "/api/commands/ack", Some(&user), json!({ "ids": [command_id] })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["acknowledged"], 1);

    let response = send(&app, get("/api/commands", Some(&user))).await;
    assert!(body_json(response).await.as_array().unwrap().is_empty());

    // Another consumer still sees the broadcast
    let other = user_token(&ctx, "user_2");
    let response = send(&app, get("/api/commands", Some(&other))).await;
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);
}

#[derive(Default)]
struct RecordingSession {
    actions: Mutex<Vec<String>>,
}

#[async_trait]
impl SessionControl for RecordingSession {
    async fn clear_local_state(&self) {
        self.actions.lock().unwrap().push("clear".to_string());
    }

    async fn sign_out(&self) -> AppResult<()> {
        self.actions.lock().unwrap().push("sign_out".to_string());
        Ok(())
    }

    async fn navigate(&self, path: &str) {
        self.actions.lock().unwrap().push(format!("navigate:{}", path));
    }
}

async fn spawn_server(ctx: &AppContext) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(ctx.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_monitor_against_live_server() {
    let ctx = context().await;
    let base_url = spawn_server(&ctx).await;
    let token = user_token(&ctx, "user_1");

    let source = HttpIdentitySource::new(&base_url, &token).unwrap();
    assert_eq!(source.check().await.unwrap(), IdentityCheck::Clear);

    // Pushed signals reach the client over the event stream
    let mut pushed = source.subscribe_events(8, Duration::from_millis(50));
    timeout(Duration::from_secs(5), async {
        while ctx.signal_hub.subscriber_count() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    ctx.ban_service.ban("user_1", Some("abuse"), "admin_1").await.unwrap();

    let signal = timeout(Duration::from_secs(5), pushed.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(signal.user_id, "user_1");
    assert_eq!(signal.status, SignalStatus::Banned);

    assert!(matches!(
        source.check().await.unwrap(),
        IdentityCheck::Banned { .. }
    ));

    let session = Arc::new(RecordingSession::default());
    let monitor = BanMonitor::new(
        Arc::new(source),
        session.clone(),
        MonitorOptions {
            interval: Duration::from_millis(50),
            max_consecutive_failures: 3,
        },
    );

    let outcome = timeout(Duration::from_secs(5), monitor.run()).await.unwrap();
    assert_eq!(outcome, MonitorOutcome::Banned);
    assert_eq!(
        *session.actions.lock().unwrap(),
        vec!["clear", "sign_out", "navigate:/banned"]
    );
}

#[tokio::test]
async fn test_monitor_sees_deleted_user_as_gone() {
    let ctx = context().await;
    let base_url = spawn_server(&ctx).await;
    let token = user_token(&ctx, "user_1");

    let source = HttpIdentitySource::new(&base_url, &token).unwrap();
    assert_eq!(source.check().await.unwrap(), IdentityCheck::Clear);

    ctx.ban_service.delete("user_1", "admin_1").await.unwrap();
    assert_eq!(source.check().await.unwrap(), IdentityCheck::Gone);
}
