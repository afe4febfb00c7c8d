/// Session transcript and recap endpoints
use crate::{
    auth::UserAuthContext,
    context::AppContext,
    error::{AppError, AppResult},
    learning::{ChatMessage, NewRecap, SessionHistoryItem, SessionRecap, SessionTranscript},
    summarizer::RecapRequest,
};
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/sessions", post(save_session))
        .route("/api/sessions/history", get(session_history))
        .route("/api/sessions/last", get(last_session))
        .route("/api/sessions/recap", post(create_recap))
        .route("/api/sessions/recaps", get(list_recaps))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveSessionRequest {
    #[serde(default)]
    companion_id: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct SaveSessionResponse {
    success: bool,
    data: SessionTranscript,
}

async fn save_session(
    State(ctx): State<AppContext>,
    auth: UserAuthContext,
    Json(req): Json<SaveSessionRequest>,
) -> AppResult<Json<SaveSessionResponse>> {
    let data = ctx
        .sessions
        .save_transcript(&auth.user_id, &req.companion_id, req.messages)
        .await?;
    Ok(Json(SaveSessionResponse { success: true, data }))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<i64>,
}

async fn session_history(
    State(ctx): State<AppContext>,
    auth: UserAuthContext,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<SessionHistoryItem>>> {
    let limit = query.limit.unwrap_or(10).clamp(1, 100);
    Ok(Json(ctx.sessions.history(&auth.user_id, limit).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LastSessionQuery {
    companion_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct LastSessionResponse {
    messages: Vec<ChatMessage>,
}

/// Messages of the most recent session with a companion; empty if none
async fn last_session(
    State(ctx): State<AppContext>,
    auth: UserAuthContext,
    Query(query): Query<LastSessionQuery>,
) -> AppResult<Json<LastSessionResponse>> {
    let companion_id = query
        .companion_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Companion ID is required".to_string()))?;

    let messages = ctx
        .sessions
        .last_session(&auth.user_id, &companion_id)
        .await?
        .map(|t| t.messages)
        .unwrap_or_default();

    Ok(Json(LastSessionResponse { messages }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecapBody {
    #[serde(default)]
    messages: Vec<ChatMessage>,
    #[serde(default)]
    companion_name: String,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    topic: String,
}

/// Summarise a finished session and store the recap
async fn create_recap(
    State(ctx): State<AppContext>,
    auth: UserAuthContext,
    Json(req): Json<RecapBody>,
) -> AppResult<Json<SessionRecap>> {
    let content = ctx
        .recaps
        .generate(&RecapRequest {
            messages: &req.messages,
            companion_name: &req.companion_name,
            subject: &req.subject,
            topic: &req.topic,
        })
        .await?;

    let recap = ctx
        .sessions
        .save_recap(
            &auth.user_id,
            NewRecap {
                companion_name: req.companion_name,
                subject: req.subject,
                topic: req.topic,
                bullet_points: content.bullet_points,
                key_topics: content.key_topics,
                summary: content.summary,
                messages_count: req.messages.len() as i64,
            },
        )
        .await?;

    Ok(Json(recap))
}

async fn list_recaps(
    State(ctx): State<AppContext>,
    auth: UserAuthContext,
) -> AppResult<Json<Vec<SessionRecap>>> {
    Ok(Json(ctx.sessions.recaps(&auth.user_id).await?))
}
