/// Admin command queue and admin event stream
use crate::{
    auth::AdminAuthContext,
    context::AppContext,
    error::AppResult,
    realtime::{self, SignalFilter},
};
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/admin/commands", post(enqueue_command))
        .route("/api/admin/events", get(admin_events))
}

#[derive(Debug, Deserialize)]
struct CommandRequest {
    #[serde(default)]
    command: String,
    #[serde(default)]
    data: serde_json::Value,
    /// A user id, or omitted for every consumer
    #[serde(default)]
    recipient: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CommandQueued {
    success: bool,
    message: String,
    command_id: String,
}

async fn enqueue_command(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Json(req): Json<CommandRequest>,
) -> AppResult<Json<CommandQueued>> {
    let recipient = req.recipient.as_deref().unwrap_or_default();
    let command = ctx
        .command_queue
        .enqueue(recipient, &req.command, req.data, Some(&auth.admin_id))
        .await?;

    tracing::info!(
        command_id = %command.id,
        command = %command.command,
        recipient = %command.recipient,
        admin_id = %auth.admin_id,
        "admin command queued"
    );

    Ok(Json(CommandQueued {
        success: true,
        message: "Command queued successfully".to_string(),
        command_id: command.id,
    }))
}

/// Every ban signal plus heartbeats, until the client disconnects
async fn admin_events(State(ctx): State<AppContext>, auth: AdminAuthContext) -> impl IntoResponse {
    tracing::debug!(admin_id = %auth.admin_id, "admin event stream opened");

    let heartbeat = Duration::from_secs(ctx.config.realtime.heartbeat_secs);
    realtime::sse_response(realtime::frames(
        &ctx.signal_hub,
        heartbeat,
        SignalFilter::All,
        "Admin SSE connected",
    ))
}
