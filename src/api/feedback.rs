/// User feedback endpoints
use crate::{
    auth::UserAuthContext,
    context::AppContext,
    error::AppResult,
    learning::{Feedback, FeedbackFilter, NewFeedback},
    pagination::{PageInfo, PageQuery},
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Serialize;

pub fn routes() -> Router<AppContext> {
    Router::new().route("/api/feedback", post(submit_feedback).get(list_feedback))
}

#[derive(Debug, Serialize)]
struct FeedbackCreated {
    success: bool,
    feedback: Feedback,
}

async fn submit_feedback(
    State(ctx): State<AppContext>,
    auth: UserAuthContext,
    Json(req): Json<NewFeedback>,
) -> AppResult<(StatusCode, Json<FeedbackCreated>)> {
    let feedback = ctx.feedback.create(&auth.user_id, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(FeedbackCreated {
            success: true,
            feedback,
        }),
    ))
}

#[derive(Debug, Serialize)]
struct FeedbackList {
    feedback: Vec<Feedback>,
    pagination: PageInfo,
}

async fn list_feedback(
    State(ctx): State<AppContext>,
    auth: UserAuthContext,
    Query(filter): Query<FeedbackFilter>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<FeedbackList>> {
    let page = query.resolve(10, 50);
    let (feedback, total) = ctx
        .feedback
        .list(Some(&auth.user_id), &filter, page)
        .await?;

    Ok(Json(FeedbackList {
        feedback,
        pagination: page.info(total),
    }))
}
