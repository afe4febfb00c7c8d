/// Endpoints about the calling user: identity, pushed status changes and
/// queued admin commands
use crate::{
    auth::UserAuthContext,
    commands::AdminCommand,
    context::AppContext,
    error::AppResult,
    identity::UserRecord,
    realtime::{self, SignalFilter},
};
use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/me", get(me))
        .route("/api/me/events", get(my_events))
        .route("/api/commands", get(poll_commands))
        .route("/api/commands/ack", post(ack_commands))
}

/// The caller's identity record; the ban monitor polls this
async fn me(auth: UserAuthContext) -> Json<UserRecord> {
    Json(auth.user)
}

async fn my_events(State(ctx): State<AppContext>, auth: UserAuthContext) -> impl IntoResponse {
    let heartbeat = Duration::from_secs(ctx.config.realtime.heartbeat_secs);
    realtime::sse_response(realtime::frames(
        &ctx.signal_hub,
        heartbeat,
        SignalFilter::User(auth.user_id),
        "SSE connected",
    ))
}

#[derive(Debug, Deserialize)]
struct PollQuery {
    limit: Option<i64>,
}

/// Unacknowledged commands for the caller, oldest first
async fn poll_commands(
    State(ctx): State<AppContext>,
    auth: UserAuthContext,
    Query(query): Query<PollQuery>,
) -> AppResult<Json<Vec<AdminCommand>>> {
    let commands = ctx
        .command_queue
        .pending(&auth.user_id, query.limit.unwrap_or(50))
        .await?;
    Ok(Json(commands))
}

#[derive(Debug, Deserialize)]
struct AckRequest {
    #[serde(default)]
    ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct AckResponse {
    success: bool,
    acknowledged: u64,
}

async fn ack_commands(
    State(ctx): State<AppContext>,
    auth: UserAuthContext,
    Json(req): Json<AckRequest>,
) -> AppResult<Json<AckResponse>> {
    let acknowledged = ctx.command_queue.ack(&auth.user_id, &req.ids).await?;
    Ok(Json(AckResponse {
        success: true,
        acknowledged,
    }))
}
