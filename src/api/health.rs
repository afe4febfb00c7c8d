/// Health, readiness, metrics and the banned landing endpoint
///
/// `/health` is a plain liveness answer; `/health/ready` checks the
/// database and reports component status the way load balancers expect.
use crate::{
    auth::UserAuthContext,
    context::AppContext,
    db, metrics,
};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Health status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// "healthy" or "unhealthy"
    pub status: String,
    pub version: String,
    pub checks: Vec<ComponentHealth>,
}

/// Health status of individual component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health_basic))
        .route("/health/ready", get(readiness_check))
        .route("/metrics", get(metrics_endpoint))
        .route("/banned", get(banned_page))
}

/// Basic health check
pub async fn health_basic() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Readiness check: 503 unless the database answers
pub async fn readiness_check(State(ctx): State<AppContext>) -> (StatusCode, Json<HealthStatus>) {
    let checks = vec![check_database(&ctx).await, check_event_hub(&ctx)];

    let healthy = checks.iter().all(|c| c.status == "healthy");
    let status = if healthy { "healthy" } else { "unhealthy" };

    if !healthy {
        tracing::warn!("readiness check failed");
    }

    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(HealthStatus {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            checks,
        }),
    )
}

async fn check_database(ctx: &AppContext) -> ComponentHealth {
    let start = Instant::now();

    match db::test_connection(&ctx.db).await {
        Ok(()) => ComponentHealth {
            name: "database".to_string(),
            status: "healthy".to_string(),
            response_time_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
            details: Some(serde_json::json!({
                "type": "sqlite",
                "pool_size": ctx.db.size(),
            })),
        },
        Err(e) => ComponentHealth {
            name: "database".to_string(),
            status: "unhealthy".to_string(),
            response_time_ms: None,
            error: Some(e.to_string()),
            details: None,
        },
    }
}

fn check_event_hub(ctx: &AppContext) -> ComponentHealth {
    ComponentHealth {
        name: "event_hub".to_string(),
        status: "healthy".to_string(),
        response_time_ms: None,
        error: None,
        details: Some(serde_json::json!({
            "subscribers": ctx.signal_hub.subscriber_count(),
        })),
    }
}

/// Prometheus text exposition
pub async fn metrics_endpoint() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render_metrics(),
    )
}

/// Landing for banned sessions. Always reachable, signed in or not.
async fn banned_page(auth: Option<UserAuthContext>) -> Json<serde_json::Value> {
    let reason = auth
        .filter(|a| a.user.is_banned())
        .and_then(|a| a.user.status_reason);

    Json(serde_json::json!({
        "banned": true,
        "message": "Your account has been suspended. Contact support if you believe this is a mistake.",
        "reason": reason,
    }))
}
