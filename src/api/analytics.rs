/// Analytics event tracking
use crate::{
    auth::UserAuthContext,
    context::AppContext,
    error::AppResult,
    learning::{AnalyticsEvent, NewAnalyticsEvent},
};
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use axum_extra::{headers::UserAgent, TypedHeader};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

pub fn routes() -> Router<AppContext> {
    Router::new().route("/api/analytics", post(track_event).get(my_events))
}

/// Client address as reported by the fronting proxy
/// Client address as reported by the fronting proxy
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Serialize)]
struct Tracked {
    success: bool,
    event: AnalyticsEvent,
}

async fn track_event(
    State(ctx): State<AppContext>,
    auth: UserAuthContext,
    user_agent: Option<TypedHeader<UserAgent>>,
    headers: HeaderMap,
    Json(req): Json<NewAnalyticsEvent>,
) -> AppResult<(StatusCode, Json<Tracked>)> {
    let user_agent = user_agent.map(|TypedHeader(ua)| ua.as_str().to_string());
    let ip = client_ip(&headers);

    let event = ctx
        .analytics
        .track(&auth.user_id, req, user_agent.as_deref(), ip.as_deref())
        .await?;

    Ok((StatusCode::CREATED, Json(Tracked { success: true, event })))
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    /// Look-back window in days
    days: Option<i64>,
    limit: Option<i64>,
}

async fn my_events(
    State(ctx): State<AppContext>,
    auth: UserAuthContext,
    Query(query): Query<EventsQuery>,
) -> AppResult<Json<Vec<AnalyticsEvent>>> {
    let since = Utc::now() - Duration::days(query.days.unwrap_or(30).clamp(1, 365));
    let limit = query.limit.unwrap_or(100).clamp(1, 500);

    Ok(Json(
        ctx.analytics
            .events_for_user(&auth.user_id, since, limit)
            .await?,
    ))
}
